//! Graph algorithms for program analysis.
//!
//! ## Traversal
//!
//! - [`dfs`] - Depth-first search traversal (pre-order)
//! - [`postorder`] - Postorder traversal
//! - [`reverse_postorder`] - Reverse postorder traversal (forward data flow order)
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Lengauer-Tarjan immediate dominators and semidominators
//! - [`compute_dominance_frontiers`] - Dominance frontiers for phi placement
//! - [`DominatorTree`] - Result of dominator computation
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | DFS / postorder | O(V + E) | Reachability, data flow ordering |
//! | Dominators | O(E log V) | SSA construction, loop analysis |
//! | Frontiers | O(V + E + Σ DF) | Phi placement |

mod dominators;
mod traversal;

pub use dominators::{compute_dominance_frontiers, compute_dominators, DominatorTree};
pub use traversal::{dfs, postorder, reverse_postorder};
