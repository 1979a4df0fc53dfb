//! Directed graph infrastructure for program analysis.
//!
//! # Key Components
//!
//! - [`NodeId`] - Strongly-typed node identifier, convertible from block and function handles
//! - [`AdjacencyGraph`] - Owned adjacency-list graph
//! - [`algorithms`] - Traversals and the Lengauer-Tarjan dominator computation
//! - Traits: [`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`]
//!
//! Analyses implement the traits as zero-copy views over their own data (see
//! [`crate::analysis::FunctionCfg`]) instead of materialising a separate graph.

mod adjacency;
mod node;
mod traits;

pub mod algorithms;

pub use adjacency::AdjacencyGraph;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
