//! Dominator tree and dominance frontiers of a function.
//!
//! [`DominanceInfo`] runs the Lengauer-Tarjan computation over a
//! [`FunctionCfg`] and derives dominance frontiers from it. The result is a
//! snapshot: any pass that changes the CFG must recompute it.
//!
//! The computation requires every block in the layout to be reachable from the
//! entry. A CFG with unreachable blocks is a precondition violation and is
//! reported as [`crate::Error::InvariantViolation`]; CFG simplification prunes
//! such blocks before any dominance-based pass runs.

use std::collections::BTreeSet;

use crate::{
    analysis::FunctionCfg,
    ir::{BlockId, Function},
    utils::graph::{
        algorithms::{compute_dominance_frontiers, compute_dominators, DominatorTree},
        NodeId, RootedGraph,
    },
    Result,
};

/// Dominator tree plus dominance frontiers, keyed by block.
#[derive(Debug, Clone)]
pub struct DominanceInfo {
    tree: DominatorTree,
    frontiers: Vec<BTreeSet<NodeId>>,
}

impl DominanceInfo {
    /// Computes dominators and frontiers of `func`.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if a block of the layout is not
    /// reachable from the entry.
    pub fn compute(func: &Function) -> Result<Self> {
        let cfg = FunctionCfg::new(func);
        let tree = compute_dominators(&cfg, cfg.entry());

        for &block in func.blocks() {
            if !tree.is_reachable(NodeId::from(block)) {
                return Err(invariant_error!(
                    "dominators of '{}' requested with unreachable block '{}'",
                    func.name(),
                    func.block_name(block)
                ));
            }
        }

        let frontiers = compute_dominance_frontiers(&cfg, &tree);
        Ok(Self { tree, frontiers })
    }

    /// The underlying dominator tree.
    #[must_use]
    pub fn tree(&self) -> &DominatorTree {
        &self.tree
    }

    /// Immediate dominator of `block`; `None` for the entry.
    #[must_use]
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.tree
            .immediate_dominator(NodeId::from(block))
            .map(BlockId::from)
    }

    /// Semidominator of `block`; `None` for the entry.
    #[must_use]
    pub fn semidominator(&self, block: BlockId) -> Option<BlockId> {
        self.tree
            .semidominator(NodeId::from(block))
            .map(BlockId::from)
    }

    /// Returns `true` if `a` dominates `b` (every block dominates itself).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.tree.dominates(NodeId::from(a), NodeId::from(b))
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.tree.strictly_dominates(NodeId::from(a), NodeId::from(b))
    }

    /// All strict dominators of `block`, nearest first.
    #[must_use]
    pub fn strict_dominators(&self, block: BlockId) -> Vec<BlockId> {
        self.tree
            .dominators(NodeId::from(block))
            .skip(1)
            .map(BlockId::from)
            .collect()
    }

    /// Dominance frontier of `block` in ascending block order.
    #[must_use]
    pub fn frontier(&self, block: BlockId) -> Vec<BlockId> {
        self.frontiers
            .get(block.index())
            .map(|set| set.iter().copied().map(BlockId::from).collect())
            .unwrap_or_default()
    }

    /// Children of `block` in the dominator tree.
    #[must_use]
    pub fn children(&self, block: BlockId) -> Vec<BlockId> {
        self.tree
            .children(NodeId::from(block))
            .iter()
            .copied()
            .map(BlockId::from)
            .collect()
    }

    /// Depth of `block` in the dominator tree (the entry has depth 0).
    #[must_use]
    pub fn depth(&self, block: BlockId) -> usize {
        self.tree.depth(NodeId::from(block))
    }

    /// Blocks in dominator-tree preorder.
    ///
    /// Every block appears after its immediate dominator.
    #[must_use]
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.tree.preorder().len());
        let mut stack = vec![self.tree.entry()];
        while let Some(node) = stack.pop() {
            order.push(BlockId::from(node));
            for &child in self.tree.children(node).iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Iterated dominance frontier of a set of blocks.
    #[must_use]
    pub fn iterated_frontier(&self, blocks: &[BlockId]) -> BTreeSet<BlockId> {
        let mut result = BTreeSet::new();
        let mut worklist: Vec<BlockId> = blocks.to_vec();
        while let Some(block) = worklist.pop() {
            for df in self.frontier(block) {
                if result.insert(df) {
                    worklist.push(df);
                }
            }
        }
        result
    }
}
