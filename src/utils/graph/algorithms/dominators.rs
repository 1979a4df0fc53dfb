//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! must pass through `d`. The **immediate dominator** of `n` (idom(n)) is the
//! unique node that strictly dominates `n` but does not strictly dominate any
//! other dominator of `n`.
//!
//! The **semidominator** of `n` is the DFS-earliest node `s` from which a path
//! reaches `n` whose interior nodes all have a larger DFS number than `n`.
//! Lengauer and Tarjan derive idom(n) from semi(n) in a single reverse-preorder
//! sweep; both results are kept since loop and frontier analyses query them.
//!
//! # Algorithm
//!
//! 1. **DFS numbering**: preorder numbers and the DFS spanning tree
//! 2. **Semidominators**: reverse preorder, using a link-eval forest with path
//!    compression to find the minimum semidominator along forest paths
//! 3. **Implicit idom**: bucket processing yields idom(v) or a node sharing it
//! 4. **Explicit idom**: a final preorder sweep resolves the deferred entries
//!
//! Nodes unreachable from the entry receive no DFS number and no dominator.

use std::collections::BTreeSet;

use crate::utils::graph::{NodeId, Predecessors, Successors};

/// Result of dominator tree computation.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    /// Immediate dominator per node; `None` for the entry and unreachable nodes.
    idom: Vec<Option<NodeId>>,
    /// Semidominator per node; `None` for the entry and unreachable nodes.
    semi: Vec<Option<NodeId>>,
    /// DFS preorder number, starting at 1. Zero marks unreachable nodes.
    dfnum: Vec<usize>,
    /// Reachable nodes in DFS preorder.
    preorder: Vec<NodeId>,
    /// Dominator tree children in DFS preorder.
    children: Vec<Vec<NodeId>>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns `true` if the node is reachable from the entry.
    #[inline]
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.dfnum.get(node.index()).is_some_and(|&n| n != 0)
    }

    /// Returns the immediate dominator of a node, or `None` for the entry node
    /// and unreachable nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns the semidominator of a node, or `None` for the entry node and
    /// unreachable nodes.
    #[inline]
    #[must_use]
    pub fn semidominator(&self, node: NodeId) -> Option<NodeId> {
        self.semi.get(node.index()).copied().flatten()
    }

    /// DFS preorder number (1 for the entry), or `None` if unreachable.
    #[must_use]
    pub fn dfs_number(&self, node: NodeId) -> Option<usize> {
        self.dfnum.get(node.index()).copied().filter(|&n| n != 0)
    }

    /// Reachable nodes in DFS preorder.
    #[must_use]
    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A reachable node dominates itself. Unreachable nodes dominate nothing and
    /// are dominated by nothing.
    ///
    /// # Complexity
    ///
    /// O(depth) where depth is the depth of `b` in the dominator tree.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut current = Some(b);
        while let Some(node) = current {
            if node == a {
                return true;
            }
            current = self.immediate_dominator(node);
        }
        false
    }

    /// Checks if node `a` strictly dominates node `b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns an iterator over all dominators of a node, from the node itself
    /// up to (and including) the entry node.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Returns the depth of a node in the dominator tree. The entry has depth 0.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        self.dominators(node).count().saturating_sub(1)
    }

    /// Children of a node in the dominator tree.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children
            .get(node.index())
            .map_or(&[][..], Vec::as_slice)
    }

    /// Returns the number of node slots covered by this tree.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }
}

/// Iterator over dominators of a node, from the node up to the entry.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

/// Computes immediate dominators and semidominators of every node reachable
/// from `entry`.
///
/// # Complexity
///
/// - Time: O(E log V) with the simple link-eval forest
/// - Space: O(V)
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    if node_count == 0 || entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom: Vec::new(),
            semi: Vec::new(),
            dfnum: Vec::new(),
            preorder: Vec::new(),
            children: Vec::new(),
        };
    }

    let mut lt = LengauerTarjan::new(node_count);
    lt.compute(graph, entry);

    let mut children = vec![Vec::new(); node_count];
    for &node in &lt.vertex {
        if let Some(parent) = lt.idom[node.index()] {
            children[parent.index()].push(node);
        }
    }

    DominatorTree {
        entry,
        idom: lt.idom,
        semi: lt.semi,
        dfnum: lt.dfnum,
        preorder: lt.vertex,
        children,
    }
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number minus one (inverse of dfnum)
    vertex: Vec<NodeId>,
    /// Parent in DFS tree
    parent: Vec<Option<NodeId>>,
    /// Semidominator
    semi: Vec<Option<NodeId>>,
    /// Immediate dominator (final result)
    idom: Vec<Option<NodeId>>,
    /// Node known to share the immediate dominator, resolved in the last phase
    samedom: Vec<Option<NodeId>>,
    /// Ancestor in the link-eval forest
    ancestor: Vec<Option<NodeId>>,
    /// Node with the lowest semidominator on the compressed forest path
    best: Vec<NodeId>,
    /// Nodes whose semidominator is this node
    bucket: Vec<Vec<NodeId>>,
}

impl LengauerTarjan {
    fn new(n: usize) -> Self {
        Self {
            dfnum: vec![0; n],
            vertex: Vec::with_capacity(n),
            parent: vec![None; n],
            semi: vec![None; n],
            idom: vec![None; n],
            samedom: vec![None; n],
            ancestor: vec![None; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
        }
    }

    fn compute<G: Successors + Predecessors>(&mut self, graph: &G, entry: NodeId) {
        self.dfs(graph, entry);

        for i in (1..self.vertex.len()).rev() {
            let n = self.vertex[i];
            let Some(p) = self.parent[n.index()] else {
                continue;
            };

            // semi(n) = min over preds v of: v itself when v precedes n in the
            // DFS, otherwise the lowest semidominator on v's forest path.
            let mut s = p;
            for v in graph.predecessors(n) {
                if self.dfnum[v.index()] == 0 {
                    continue;
                }
                let candidate = if self.dfnum[v.index()] <= self.dfnum[n.index()] {
                    v
                } else {
                    let lowest = self.eval(v);
                    self.semi[lowest.index()].unwrap_or(lowest)
                };
                if self.dfnum[candidate.index()] < self.dfnum[s.index()] {
                    s = candidate;
                }
            }
            self.semi[n.index()] = Some(s);
            self.bucket[s.index()].push(n);
            self.link(p, n);

            for v in std::mem::take(&mut self.bucket[p.index()]) {
                let y = self.eval(v);
                if self.semi[y.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = Some(p);
                } else {
                    self.samedom[v.index()] = Some(y);
                }
            }
        }

        for i in 1..self.vertex.len() {
            let n = self.vertex[i];
            if let Some(same) = self.samedom[n.index()] {
                self.idom[n.index()] = self.idom[same.index()];
            }
        }
    }

    /// Iterative preorder DFS recording the spanning tree.
    fn dfs<G: Successors>(&mut self, graph: &G, entry: NodeId) {
        let mut stack = vec![(entry, None)];
        while let Some((node, parent)) = stack.pop() {
            if self.dfnum[node.index()] != 0 {
                continue;
            }
            self.vertex.push(node);
            self.dfnum[node.index()] = self.vertex.len();
            self.parent[node.index()] = parent;

            let succs: Vec<NodeId> = graph.successors(node).collect();
            for &succ in succs.iter().rev() {
                if self.dfnum[succ.index()] == 0 {
                    stack.push((succ, Some(node)));
                }
            }
        }
    }

    fn link(&mut self, parent: NodeId, node: NodeId) {
        self.ancestor[node.index()] = Some(parent);
        self.best[node.index()] = node;
    }

    fn semi_number(&self, node: NodeId) -> usize {
        self.semi[node.index()].map_or(self.dfnum[node.index()], |s| self.dfnum[s.index()])
    }

    /// Node with the lowest semidominator on the forest path from `v` to its
    /// root, compressing the path on the way.
    fn eval(&mut self, v: NodeId) -> NodeId {
        let mut path = Vec::new();
        let mut x = v;
        while let Some(a) = self.ancestor[x.index()] {
            if self.ancestor[a.index()].is_none() {
                break;
            }
            path.push(x);
            x = a;
        }

        for &u in path.iter().rev() {
            let Some(a) = self.ancestor[u.index()] else {
                continue;
            };
            let b = self.best[a.index()];
            if self.semi_number(b) < self.semi_number(self.best[u.index()]) {
                self.best[u.index()] = b;
            }
            self.ancestor[u.index()] = self.ancestor[a.index()];
        }
        self.best[v.index()]
    }
}

/// Computes dominance frontiers for all nodes.
///
/// The dominance frontier of a node `n` is the set of all nodes `m` such that
/// `n` dominates a predecessor of `m` but does not strictly dominate `m`.
///
/// # Returns
///
/// A vector where `result[i]` contains the dominance frontier of node `i`.
///
/// # Complexity
///
/// - Time: O(V + E + Σ|DF|)
pub fn compute_dominance_frontiers<G>(graph: &G, dom_tree: &DominatorTree) -> Vec<BTreeSet<NodeId>>
where
    G: Predecessors,
{
    let n = graph.node_count();
    let mut frontiers: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); n];

    for &node in dom_tree.preorder() {
        let preds: Vec<NodeId> = graph
            .predecessors(node)
            .filter(|&p| dom_tree.is_reachable(p))
            .collect();
        if preds.len() < 2 {
            continue;
        }

        let idom = dom_tree.immediate_dominator(node);
        for pred in preds {
            let mut runner = pred;
            loop {
                if Some(runner) == idom {
                    break;
                }
                frontiers[runner.index()].insert(node);
                match dom_tree.immediate_dominator(runner) {
                    Some(up) => runner = up,
                    None => break,
                }
            }
        }
    }

    frontiers
}
