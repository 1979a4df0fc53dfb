//! Program analyses over the IR.
//!
//! Every analysis here produces a snapshot. Nothing is cached on the IR itself:
//! a pass that changes the CFG or the instruction stream must recompute what
//! it relies on afterwards.
//!
//! # Key Components
//!
//! - [`FunctionCfg`] - Graph-trait view of a function's blocks
//! - [`DominanceInfo`] - Immediate dominators, semidominators and dominance frontiers
//! - [`LoopForest`] - Natural loops, their nesting, exits and preheaders
//! - [`SideEffectChecker`] - Memory scopes and interprocedural side effects
//! - [`CallGraph`] - Call edges, call sites and recursion queries
//! - [`Andersen`] - Inclusion-based points-to sets for alias queries

mod andersen;
mod callgraph;
mod cfg;
mod dominance;
mod loops;
mod sideeffect;

pub use andersen::Andersen;
pub use callgraph::CallGraph;
pub use cfg::FunctionCfg;
pub use dominance::DominanceInfo;
pub use loops::{LoopExit, LoopForest, LoopId, LoopInfo};
pub use sideeffect::{Scope, SideEffectChecker, SideEffectInfo};
