//! Trait definitions for graph abstractions.
//!
//! The graph algorithms are written against these traits rather than a concrete
//! graph type, so the same dominator and traversal code runs over a function's
//! control flow graph, the module call graph and the small adjacency graphs used
//! in tests.
//!
//! - [`GraphBase`] - Core properties: node count and node iteration
//! - [`Successors`] - Forward edge traversal (outgoing edges)
//! - [`Predecessors`] - Backward edge traversal (incoming edges)
//! - [`RootedGraph`] - Graphs with a designated entry node (for dominator computation)

use crate::utils::graph::NodeId;

/// Base trait providing core graph properties.
pub trait GraphBase {
    /// Returns the number of node slots in the graph.
    ///
    /// Node identifiers are dense in `0..node_count()`. Views over arenas with
    /// removed entries report the arena size; removed slots simply have no edges.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all live node identifiers in the graph.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Trait for graphs that support forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns an iterator over the successor nodes of the given node.
    ///
    /// For a directed edge `(u, v)`, node `v` is a successor of `u`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Trait for graphs that support backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Returns an iterator over the predecessor nodes of the given node.
    ///
    /// For a directed edge `(u, v)`, node `u` is a predecessor of `v`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Trait for graphs with a designated entry (root) node.
///
/// The entry is the starting point for forward traversals and the root of the
/// dominator tree. In a control flow graph, this is the function's entry block.
pub trait RootedGraph: Successors + Predecessors {
    /// Returns the entry (root) node of the graph.
    fn entry(&self) -> NodeId;
}

#[cfg(test)]
mod tests {
    use crate::utils::graph::{
        AdjacencyGraph, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    };

    #[test]
    fn test_adjacency_views_agree() {
        let graph = AdjacencyGraph::from_edges(4, 0, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.entry(), NodeId::new(0));

        let succ: Vec<NodeId> = graph.successors(NodeId::new(0)).collect();
        assert_eq!(succ, vec![NodeId::new(1), NodeId::new(2)]);

        let pred: Vec<NodeId> = graph.predecessors(NodeId::new(3)).collect();
        assert_eq!(pred, vec![NodeId::new(1), NodeId::new(2)]);
        assert!(graph.predecessors(NodeId::new(0)).next().is_none());
    }
}
