//! Natural loop analysis.
//!
//! # Loop Structure
//!
//! ```text
//!     [preheader]     <- Single entry predecessor (may need insertion)
//!          |
//!          v
//!     [header] <------+  <- Single entry point, dominates all loop blocks
//!          |          |
//!          v          |
//!     [body ...]      |
//!          |          |
//!          v          |
//!     [latch] --------+  <- Back edge source(s)
//!          |
//!          v
//!     [exit ...]         <- Outside the loop, with a predecessor inside
//! ```
//!
//! Loops are found from back edges `u -> h` where `h` dominates `u`. The body
//! of such a loop is `h` plus every block that reaches `u` without passing
//! through `h`. Loops sharing a header are merged into one. Nesting follows
//! containment: the parent of a loop is the smallest other loop containing its
//! header.
//!
//! [`LoopForest::ensure_preheaders`] gives every loop a preheader, the hoisting
//! target of loop-invariant code motion.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::{DominanceInfo, FunctionCfg},
    ir::{BlockId, Function, Inst, Operand},
};

/// Index of a loop within its [`LoopForest`].
pub type LoopId = usize;

/// Exit edge information for a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoopExit {
    /// The block inside the loop that branches out.
    pub exiting_block: BlockId,
    /// The block outside the loop that is the exit target.
    pub exit_block: BlockId,
}

/// A natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The header block (single entry point, dominates all loop blocks).
    pub header: BlockId,

    /// All blocks of the loop, header and nested loops included.
    pub body: BTreeSet<BlockId>,

    /// Blocks of this loop that belong to no nested loop.
    pub unique_blocks: BTreeSet<BlockId>,

    /// Back edge sources.
    pub latches: Vec<BlockId>,

    /// Preheader block, if the header has a suitable single outside predecessor.
    pub preheader: Option<BlockId>,

    /// Exit edges from the loop.
    pub exits: Vec<LoopExit>,

    /// Loop nesting depth (0 = outermost).
    pub depth: usize,

    /// Enclosing loop, if this loop is nested.
    pub parent: Option<LoopId>,

    /// Immediately nested loops.
    pub children: Vec<LoopId>,
}

impl LoopInfo {
    fn new(header: BlockId) -> Self {
        let mut body = BTreeSet::new();
        body.insert(header);
        Self {
            header,
            body,
            unique_blocks: BTreeSet::new(),
            latches: Vec::new(),
            preheader: None,
            exits: Vec::new(),
            depth: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns true if this is an innermost loop (no children).
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// Blocks inside the loop that branch out of it, without duplicates.
    #[must_use]
    pub fn exiting_blocks(&self) -> Vec<BlockId> {
        let set: BTreeSet<BlockId> = self.exits.iter().map(|e| e.exiting_block).collect();
        set.into_iter().collect()
    }

    /// Blocks outside the loop that are entered from it, without duplicates.
    #[must_use]
    pub fn exit_blocks(&self) -> Vec<BlockId> {
        let set: BTreeSet<BlockId> = self.exits.iter().map(|e| e.exit_block).collect();
        set.into_iter().collect()
    }

    /// Predecessors of the header that lie outside the loop.
    #[must_use]
    pub fn outside_preds(&self, func: &Function) -> Vec<BlockId> {
        func.preds(self.header)
            .iter()
            .copied()
            .filter(|p| !self.body.contains(p))
            .collect()
    }
}

/// All loops of a function with their nesting.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<LoopInfo>,
    /// Innermost loop per block slot.
    block_to_loop: Vec<Option<LoopId>>,
}

impl LoopForest {
    /// Detects all natural loops of `func`.
    ///
    /// `dom` must be the dominance information of the current CFG.
    #[must_use]
    pub fn compute(func: &Function, dom: &DominanceInfo) -> Self {
        let cfg = FunctionCfg::new(func);
        let mut by_header: BTreeMap<BlockId, LoopInfo> = BTreeMap::new();

        for node in cfg.reverse_postorder() {
            for &succ in func.succs(node) {
                if dom.dominates(succ, node) {
                    let info = by_header
                        .entry(succ)
                        .or_insert_with(|| LoopInfo::new(succ));
                    info.latches.push(node);
                    expand_loop_body(func, info, node);
                }
            }
        }

        let mut loops: Vec<LoopInfo> = by_header.into_values().collect();
        compute_nesting(&mut loops);

        let mut forest = LoopForest {
            loops,
            block_to_loop: vec![None; func.block_capacity()],
        };
        forest.assign_blocks();
        for id in 0..forest.loops.len() {
            forest.loops[id].preheader = find_preheader(func, &forest.loops[id]);
            compute_exits(func, &mut forest.loops[id]);
        }
        forest
    }

    /// Maps each block to its innermost loop and derives the unique-block sets.
    fn assign_blocks(&mut self) {
        for id in 0..self.loops.len() {
            for &block in &self.loops[id].body {
                let slot = &mut self.block_to_loop[block.index()];
                let deeper = match *slot {
                    Some(existing) => self.loops[existing].size() > self.loops[id].size(),
                    None => true,
                };
                if deeper {
                    *slot = Some(id);
                }
            }
        }
        for info in &mut self.loops {
            info.unique_blocks.clear();
        }
        for (index, slot) in self.block_to_loop.iter().enumerate() {
            if let Some(id) = *slot {
                self.loops[id].unique_blocks.insert(BlockId::new(index));
            }
        }
    }

    /// All loops, ordered by header.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Loop by id.
    #[must_use]
    pub fn get(&self, id: LoopId) -> &LoopInfo {
        &self.loops[id]
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns true if there are no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The innermost loop containing `block`.
    #[must_use]
    pub fn innermost_loop(&self, block: BlockId) -> Option<LoopId> {
        self.block_to_loop.get(block.index()).copied().flatten()
    }

    /// Number of loops enclosing `block` (0 outside any loop).
    #[must_use]
    pub fn loop_depth(&self, block: BlockId) -> usize {
        self.innermost_loop(block)
            .map_or(0, |id| self.loops[id].depth + 1)
    }

    /// Outermost loops.
    #[must_use]
    pub fn roots(&self) -> Vec<LoopId> {
        (0..self.loops.len())
            .filter(|&id| self.loops[id].parent.is_none())
            .collect()
    }

    /// Loops in postorder of the nesting tree: every loop after all loops
    /// nested in it.
    #[must_use]
    pub fn postorder(&self) -> Vec<LoopId> {
        let mut order = Vec::with_capacity(self.loops.len());
        let mut stack: Vec<(LoopId, bool)> =
            self.roots().into_iter().rev().map(|id| (id, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.loops[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Gives every loop a preheader, synthesizing blocks where needed.
    ///
    /// An existing block is reused when the header has exactly one outside
    /// predecessor and that predecessor has the header as its only successor.
    /// Otherwise a new block is placed before the header: outside predecessors
    /// are redirected to it, header phi operands from those predecessors are
    /// merged into phis of the new block, and the block jumps to the header.
    ///
    /// Returns the synthesized blocks. The dominator tree of `func` changes, so
    /// callers must recompute [`DominanceInfo`] afterwards.
    pub fn ensure_preheaders(&mut self, func: &mut Function) -> Vec<BlockId> {
        let mut created = Vec::new();

        for id in self.postorder() {
            if self.loops[id].preheader.is_some() {
                continue;
            }
            let preheader = insert_preheader(func, &self.loops[id]);
            self.loops[id].preheader = Some(preheader);
            created.push(preheader);

            if self.block_to_loop.len() <= preheader.index() {
                self.block_to_loop.resize(preheader.index() + 1, None);
            }
            let parent = self.loops[id].parent;
            self.block_to_loop[preheader.index()] = parent;
            if let Some(parent) = parent {
                self.loops[parent].unique_blocks.insert(preheader);
            }
            let mut ancestor = parent;
            while let Some(a) = ancestor {
                self.loops[a].body.insert(preheader);
                ancestor = self.loops[a].parent;
            }
        }

        if !created.is_empty() {
            for info in &mut self.loops {
                compute_exits(func, info);
            }
        }
        created
    }
}

/// Adds every block reaching `latch` without passing the header.
fn expand_loop_body(func: &Function, info: &mut LoopInfo, latch: BlockId) {
    if info.body.contains(&latch) {
        return;
    }

    let mut worklist = vec![latch];
    while let Some(block) = worklist.pop() {
        if info.body.insert(block) {
            for &pred in func.preds(block) {
                if pred != info.header && !info.body.contains(&pred) {
                    worklist.push(pred);
                }
            }
        }
    }
}

/// The single outside predecessor of the header, if it jumps only to the header.
fn find_preheader(func: &Function, info: &LoopInfo) -> Option<BlockId> {
    match info.outside_preds(func).as_slice() {
        [single] if func.succs(*single).len() == 1 => Some(*single),
        _ => None,
    }
}

/// Computes exit edges: successors outside the loop of blocks inside it.
fn compute_exits(func: &Function, info: &mut LoopInfo) {
    info.exits.clear();
    for &block in &info.body {
        for &succ in func.succs(block) {
            if !info.body.contains(&succ) {
                info.exits.push(LoopExit {
                    exiting_block: block,
                    exit_block: succ,
                });
            }
        }
    }
}

/// Computes parents, children and depths. The parent is the smallest other
/// loop containing the header.
fn compute_nesting(loops: &mut [LoopInfo]) {
    let n = loops.len();

    for i in 0..n {
        let header = loops[i].header;
        let parent = (0..n)
            .filter(|&j| j != i && loops[j].body.contains(&header))
            .min_by_key(|&j| loops[j].size());
        loops[i].parent = parent;
    }

    for i in 0..n {
        if let Some(parent) = loops[i].parent {
            loops[parent].children.push(i);
        }
    }

    for i in 0..n {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(parent) = current {
            depth += 1;
            current = loops[parent].parent;
        }
        loops[i].depth = depth;
    }
}

/// Synthesizes a preheader for `info` and rewires the CFG through it.
fn insert_preheader(func: &mut Function, info: &LoopInfo) -> BlockId {
    let header = info.header;
    let outside = info.outside_preds(func);
    let preheader = func.add_block_before(header, "preheader");

    for phi in func.phis(header) {
        let Inst::Phi { dest, incoming } = func.inst(phi).clone() else {
            continue;
        };
        let (from_outside, from_loop): (Vec<_>, Vec<_>) = incoming
            .into_iter()
            .partition(|(_, pred)| outside.contains(pred));
        if from_outside.is_empty() {
            continue;
        }

        let value = if from_outside.len() == 1 {
            from_outside[0].0
        } else {
            let ty = func.reg_ty(dest).clone();
            let name = format!("{}.ph", func.reg_name(dest));
            let merged = func.new_reg(&name, ty);
            func.insert_phi(
                preheader,
                Inst::Phi {
                    dest: merged,
                    incoming: from_outside,
                },
            );
            Operand::Reg(merged)
        };

        let mut rewritten = from_loop;
        rewritten.push((value, preheader));
        if let Inst::Phi { incoming, .. } = func.inst_mut(phi) {
            *incoming = rewritten;
        }
    }

    for pred in &outside {
        func.retarget(*pred, header, preheader);
    }
    func.append_inst(preheader, Inst::Jump { target: header });

    if func.entry() == header {
        func.set_entry(preheader);
    }
    preheader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrType, Operand};

    fn branch(f: &mut Function, from: BlockId, then_bb: BlockId, else_bb: BlockId) {
        f.append_inst(
            from,
            Inst::Branch {
                cond: Operand::Param(0),
                then_bb,
                else_bb,
            },
        );
    }

    fn jump(f: &mut Function, from: BlockId, target: BlockId) {
        f.append_inst(from, Inst::Jump { target });
    }

    fn new_function() -> Function {
        Function::new("f", IrType::Void, vec![crate::ir::Param::new("c", IrType::I1)])
    }

    /// entry -> outer; outer -> inner | exit; inner -> inner | latch; latch -> outer
    fn nested() -> (Function, [BlockId; 5]) {
        let mut f = new_function();
        let entry = f.add_block("entry");
        let outer = f.add_block("outer");
        let inner = f.add_block("inner");
        let latch = f.add_block("latch");
        let exit = f.add_block("exit");
        f.set_entry(entry);
        f.set_exit(exit);
        jump(&mut f, entry, outer);
        branch(&mut f, outer, inner, exit);
        branch(&mut f, inner, inner, latch);
        jump(&mut f, latch, outer);
        f.append_inst(exit, Inst::Return { value: None });
        (f, [entry, outer, inner, latch, exit])
    }

    #[test]
    fn test_nested_loops() {
        let (f, [entry, outer, inner, latch, exit]) = nested();
        let dom = DominanceInfo::compute(&f).unwrap();
        let forest = LoopForest::compute(&f, &dom);

        assert_eq!(forest.len(), 2);
        let outer_id = forest.innermost_loop(outer).unwrap();
        let inner_id = forest.innermost_loop(inner).unwrap();
        let outer_loop = forest.get(outer_id);
        let inner_loop = forest.get(inner_id);

        assert_eq!(outer_loop.body, [outer, inner, latch].into_iter().collect());
        assert_eq!(outer_loop.unique_blocks, [outer, latch].into_iter().collect());
        assert_eq!(inner_loop.parent, Some(outer_id));
        assert_eq!(outer_loop.children, vec![inner_id]);
        assert_eq!(forest.loop_depth(inner), 2);
        assert_eq!(forest.loop_depth(latch), 1);
        assert_eq!(forest.loop_depth(entry), 0);
        assert_eq!(outer_loop.exiting_blocks(), vec![outer]);
        assert_eq!(outer_loop.exit_blocks(), vec![exit]);
        assert_eq!(inner_loop.exit_blocks(), vec![latch]);
        assert_eq!(forest.postorder(), vec![inner_id, outer_id]);

        // entry jumps only to the outer header; the inner header has none.
        assert_eq!(outer_loop.preheader, Some(entry));
        assert_eq!(inner_loop.preheader, None);
    }

    #[test]
    fn test_preheader_synthesis_merges_phis() {
        // entry -> a | b; a -> header; b -> header; header -> header | exit
        let mut f = new_function();
        let entry = f.add_block("entry");
        let a = f.add_block("a");
        let b = f.add_block("b");
        let header = f.add_block("header");
        let exit = f.add_block("exit");
        f.set_entry(entry);
        f.set_exit(exit);
        branch(&mut f, entry, a, b);
        jump(&mut f, a, header);
        jump(&mut f, b, header);
        branch(&mut f, header, header, exit);
        f.append_inst(exit, Inst::Return { value: None });
        let x = f.new_reg("x", IrType::I32);
        f.insert_phi(
            header,
            Inst::Phi {
                dest: x,
                incoming: vec![
                    (Operand::int(1), a),
                    (Operand::int(2), b),
                    (Operand::Reg(x), header),
                ],
            },
        );

        let dom = DominanceInfo::compute(&f).unwrap();
        let mut forest = LoopForest::compute(&f, &dom);
        assert_eq!(forest.get(0).preheader, None);

        let created = forest.ensure_preheaders(&mut f);
        assert_eq!(created.len(), 1);
        let pre = created[0];
        assert_eq!(forest.get(0).preheader, Some(pre));
        assert_eq!(f.succs(pre), &[header]);
        let mut preds = f.preds(pre).to_vec();
        preds.sort();
        assert_eq!(preds, vec![a, b]);
        assert!(!f.preds(header).contains(&a));

        // The header phi now has one operand per predecessor.
        let Inst::Phi { incoming, .. } = f.inst(f.phis(header)[0]) else {
            panic!("expected phi");
        };
        assert_eq!(incoming.len(), 2);
        assert_eq!(f.phis(pre).len(), 1);
        assert!(DominanceInfo::compute(&f).unwrap().dominates(pre, header));
    }

    #[test]
    fn test_reuses_single_successor_predecessor() {
        let (mut f, [entry, ..]) = nested();
        let dom = DominanceInfo::compute(&f).unwrap();
        let mut forest = LoopForest::compute(&f, &dom);
        let blocks_before = f.blocks().len();

        // Only the inner loop needs a new block.
        let created = forest.ensure_preheaders(&mut f);
        assert_eq!(created.len(), 1);
        assert_eq!(f.blocks().len(), blocks_before + 1);
        let outer_id = forest.roots()[0];
        assert_eq!(forest.get(outer_id).preheader, Some(entry));
        assert!(forest.get(outer_id).contains(created[0]));
    }
}
