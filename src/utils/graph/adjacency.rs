//! A small owned adjacency-list graph.
//!
//! [`AdjacencyGraph`] stores successor and predecessor lists for a fixed number
//! of nodes. The call graph is built on it, and it is the reference graph for the
//! algorithm tests, where a handful of `(from, to)` pairs describe a whole CFG.

use crate::utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors};

/// Directed graph over `0..node_count` with ordered, duplicate-free adjacency.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyGraph {
    succs: Vec<Vec<NodeId>>,
    preds: Vec<Vec<NodeId>>,
    entry: NodeId,
}

impl AdjacencyGraph {
    /// Creates a graph with `node_count` isolated nodes rooted at `entry`.
    #[must_use]
    pub fn new(node_count: usize, entry: NodeId) -> Self {
        Self {
            succs: vec![Vec::new(); node_count],
            preds: vec![Vec::new(); node_count],
            entry,
        }
    }

    /// Builds a graph from an edge list of raw indices.
    #[must_use]
    pub fn from_edges(node_count: usize, entry: usize, edges: &[(usize, usize)]) -> Self {
        let mut graph = Self::new(node_count, NodeId::new(entry));
        for &(from, to) in edges {
            graph.add_edge(NodeId::new(from), NodeId::new(to));
        }
        graph
    }

    /// Adds the edge `from -> to`. Returns `false` if it already existed.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        let out = &mut self.succs[from.index()];
        if out.contains(&to) {
            return false;
        }
        out.push(to);
        self.preds[to.index()].push(from);
        true
    }

    /// Returns `true` if the edge `from -> to` exists.
    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.succs[from.index()].contains(&to)
    }
}

impl GraphBase for AdjacencyGraph {
    fn node_count(&self) -> usize {
        self.succs.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.succs.len()).map(NodeId::new)
    }
}

impl Successors for AdjacencyGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.succs[node.index()].iter().copied()
    }
}

impl Predecessors for AdjacencyGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.preds[node.index()].iter().copied()
    }
}

impl RootedGraph for AdjacencyGraph {
    fn entry(&self) -> NodeId {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut graph = AdjacencyGraph::new(2, NodeId::new(0));
        assert!(graph.add_edge(NodeId::new(0), NodeId::new(1)));
        assert!(!graph.add_edge(NodeId::new(0), NodeId::new(1)));
        assert!(graph.has_edge(NodeId::new(0), NodeId::new(1)));
        assert!(!graph.has_edge(NodeId::new(1), NodeId::new(0)));
        assert_eq!(graph.predecessors(NodeId::new(1)).count(), 1);
    }
}
