//! Node identifier shared by all graph views.
//!
//! Control flow graphs and the call graph are both indexed by dense arena handles
//! ([`BlockId`], [`FuncId`]). The graph algorithms work on [`NodeId`] and the
//! conversions below translate between the two without any lookup table.

use std::fmt;

use crate::ir::{BlockId, FuncId};

/// A strongly-typed identifier for nodes within a directed graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<BlockId> for NodeId {
    #[inline]
    fn from(block: BlockId) -> Self {
        NodeId(block.index())
    }
}

impl From<NodeId> for BlockId {
    #[inline]
    fn from(node: NodeId) -> Self {
        BlockId::new(node.0)
    }
}

impl From<FuncId> for NodeId {
    #[inline]
    fn from(func: FuncId) -> Self {
        NodeId(func.index())
    }
}

impl From<NodeId> for FuncId {
    #[inline]
    fn from(node: NodeId) -> Self {
        FuncId::new(node.0)
    }
}
