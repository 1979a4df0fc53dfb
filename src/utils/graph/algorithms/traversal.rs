//! Graph traversal algorithms.
//!
//! - [`dfs`] - Iterative depth-first search (pre-order)
//! - [`postorder`] - Depth-first search with post-order visitation
//! - [`reverse_postorder`] - Reverse post-order (useful for forward data flow)
//!
//! [`dfs`] returns an iterator for lazy evaluation; the post-order variants
//! return collected vectors since the order requires a full traversal anyway.
//! All traversals visit successors in the order the graph reports them, so
//! results are deterministic for a given graph.

use crate::utils::graph::{NodeId, Successors};

/// Depth-first search iterator over graph nodes.
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let node_count = graph.node_count();
        if start.index() >= node_count {
            return DfsIterator {
                graph,
                stack: Vec::new(),
                visited: Vec::new(),
            };
        }
        DfsIterator {
            graph,
            stack: vec![start],
            visited: vec![false; node_count],
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.stack.pop()?;
            if self.visited[node.index()] {
                continue;
            }
            self.visited[node.index()] = true;

            let successors: Vec<NodeId> = self.graph.successors(node).collect();
            for &succ in successors.iter().rev() {
                if !self.visited[succ.index()] {
                    self.stack.push(succ);
                }
            }
            return Some(node);
        }
    }
}

/// Returns a depth-first pre-order iterator starting from the given node.
///
/// Nodes not reachable from `start` are not visited.
pub fn dfs<G: Successors>(graph: &G, start: NodeId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Computes the postorder traversal of nodes reachable from `start`.
///
/// In postorder, a node is emitted after all of its DFS descendants.
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];
    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, State::Exit));

                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => result.push(node),
        }
    }

    result
}

/// Computes the reverse postorder traversal of nodes reachable from `start`.
///
/// Every node precedes its successors except along back edges, which makes
/// this the iteration order of choice for forward data flow problems.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}
