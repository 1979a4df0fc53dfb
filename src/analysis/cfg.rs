//! Control flow graph view of a function.
//!
//! [`FunctionCfg`] exposes the block graph of a [`Function`] through the
//! generic graph traits so that the traversal and dominator algorithms in
//! [`crate::utils::graph::algorithms`] run on it directly. The view borrows
//! the function and copies nothing: predecessor and successor lists are the
//! ones the function maintains on every edit.
//!
//! Node identifiers are block indices. Removed block slots stay in the index
//! space without edges, so they are never reached from the entry.

use crate::{
    ir::{BlockId, Function},
    utils::graph::{
        algorithms::{postorder, reverse_postorder},
        GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
};

/// A borrowed control flow graph view of a function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionCfg<'a> {
    func: &'a Function,
}

impl<'a> FunctionCfg<'a> {
    /// Creates a CFG view of `func`.
    #[must_use]
    pub fn new(func: &'a Function) -> Self {
        Self { func }
    }

    /// The underlying function.
    #[must_use]
    pub fn function(&self) -> &'a Function {
        self.func
    }

    /// Blocks reachable from the entry in postorder.
    #[must_use]
    pub fn postorder(&self) -> Vec<BlockId> {
        postorder(self, self.entry())
            .into_iter()
            .map(BlockId::from)
            .collect()
    }

    /// Blocks reachable from the entry in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        reverse_postorder(self, self.entry())
            .into_iter()
            .map(BlockId::from)
            .collect()
    }

    /// Per block slot, whether the block is reachable from the entry.
    #[must_use]
    pub fn reachable(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.node_count()];
        for block in self.postorder() {
            reachable[block.index()] = true;
        }
        reachable
    }
}

impl GraphBase for FunctionCfg<'_> {
    fn node_count(&self) -> usize {
        self.func.block_capacity()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.func.blocks().iter().copied().map(NodeId::from)
    }
}

impl Successors for FunctionCfg<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.func
            .succs(BlockId::from(node))
            .iter()
            .copied()
            .map(NodeId::from)
    }
}

impl Predecessors for FunctionCfg<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.func
            .preds(BlockId::from(node))
            .iter()
            .copied()
            .map(NodeId::from)
    }
}

impl RootedGraph for FunctionCfg<'_> {
    fn entry(&self) -> NodeId {
        NodeId::from(self.func.entry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Inst, IrType, Operand};

    #[test]
    fn test_view_follows_function_edges() {
        let mut f = Function::new("f", IrType::Void, vec![]);
        let entry = f.add_block("entry");
        let body = f.add_block("body");
        let dead = f.add_block("dead");
        let exit = f.add_block("exit");
        f.set_entry(entry);
        f.set_exit(exit);
        f.append_inst(
            entry,
            Inst::Branch {
                cond: Operand::bool(true),
                then_bb: body,
                else_bb: exit,
            },
        );
        f.append_inst(body, Inst::Jump { target: exit });
        f.append_inst(dead, Inst::Jump { target: exit });
        f.append_inst(exit, Inst::Return { value: None });

        let cfg = FunctionCfg::new(&f);
        assert_eq!(cfg.node_count(), 4);
        assert_eq!(cfg.reverse_postorder(), vec![entry, body, exit]);
        let reachable = cfg.reachable();
        assert!(reachable[body.index()]);
        assert!(!reachable[dead.index()]);
        assert_eq!(cfg.predecessors(NodeId::from(exit)).count(), 3);
    }
}
