//! Functions, basic blocks and the instruction arena.
//!
//! A [`Function`] owns three arenas: blocks, instructions and registers. Blocks keep
//! an ordered list of instruction handles; each instruction records the block it is
//! currently placed in, and each register records its defining instruction. These
//! back-references are plain handles maintained by the mutation methods here, so a
//! split, merge or clone never leaves a dangling pointer behind.
//!
//! # Edge maintenance
//!
//! Predecessor and successor lists are derived from terminators but stored on the
//! blocks. Every method that inserts, removes or retargets a terminator refreshes
//! the edges of the affected block before returning, so the CFG is consistent
//! after each individual edit.
//!
//! # Layout
//!
//! The layout is the ordered list of live blocks. The entry block is always first
//! in the layout; before SSA destruction a single exit block holds the only `ret`.

use std::collections::BTreeMap;

use crate::{
    ir::{BlockId, Constant, Inst, InstId, IrType, Operand, RegId},
    Error, Result,
};

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: IrType,
}

impl Param {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: IrType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Per-register information.
#[derive(Debug, Clone)]
pub struct RegData {
    name: String,
    ty: IrType,
    def: Option<InstId>,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct BlockData {
    name: String,
    insts: Vec<InstId>,
    preds: Vec<BlockId>,
    succs: Vec<BlockId>,
    removed: bool,
}

impl BlockData {
    fn new(name: String) -> Self {
        Self {
            name,
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            removed: false,
        }
    }

    /// Block label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instructions in program order.
    #[must_use]
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Predecessor blocks.
    #[must_use]
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    /// Successor blocks.
    #[must_use]
    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }
}

#[derive(Debug, Clone)]
struct InstData {
    inst: Inst,
    block: Option<BlockId>,
}

/// An IR function.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    ret_ty: IrType,
    params: Vec<Param>,
    external: bool,
    removed: bool,
    blocks: Vec<BlockData>,
    insts: Vec<InstData>,
    regs: Vec<RegData>,
    layout: Vec<BlockId>,
    entry: BlockId,
    exit: BlockId,
    symbols: BTreeMap<String, usize>,
}

impl Function {
    /// Creates a function without any blocks.
    #[must_use]
    pub fn new(name: impl Into<String>, ret_ty: IrType, params: Vec<Param>) -> Self {
        Self {
            name: name.into(),
            ret_ty,
            params,
            external: false,
            removed: false,
            blocks: Vec::new(),
            insts: Vec::new(),
            regs: Vec::new(),
            layout: Vec::new(),
            entry: BlockId::new(0),
            exit: BlockId::new(0),
            symbols: BTreeMap::new(),
        }
    }

    /// Creates a body-less declaration of a runtime library function.
    #[must_use]
    pub fn new_external(name: impl Into<String>, ret_ty: IrType, params: Vec<Param>) -> Self {
        let mut function = Self::new(name, ret_ty, params);
        function.external = true;
        function
    }

    // ── Signature ───────────────────────────────────────────────────────

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return type.
    #[must_use]
    pub fn ret_ty(&self) -> &IrType {
        &self.ret_ty
    }

    /// Formal parameters.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Returns `true` for runtime library declarations.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Returns `true` once the function was deleted from its module.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }

    // ── Symbol table ────────────────────────────────────────────────────

    /// Returns a name derived from `base` that is unique within this function.
    pub fn unique_name(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "t" } else { base };
        let counter = self.symbols.entry(base.to_string()).or_insert(0);
        let name = if *counter == 0 {
            base.to_string()
        } else {
            format!("{base}.{counter}")
        };
        *counter += 1;
        name
    }

    // ── Registers ───────────────────────────────────────────────────────

    /// Allocates a fresh register of type `ty`.
    pub fn new_reg(&mut self, name: &str, ty: IrType) -> RegId {
        let name = self.unique_name(name);
        let id = RegId::new(self.regs.len());
        self.regs.push(RegData {
            name,
            ty,
            def: None,
        });
        id
    }

    /// Number of registers ever allocated.
    #[must_use]
    pub fn reg_count(&self) -> usize {
        self.regs.len()
    }

    /// Type of a register.
    #[must_use]
    pub fn reg_ty(&self, reg: RegId) -> &IrType {
        &self.regs[reg.index()].ty
    }

    /// Name of a register.
    #[must_use]
    pub fn reg_name(&self, reg: RegId) -> &str {
        &self.regs[reg.index()].name
    }

    /// The instruction currently defining `reg`, if it is placed in a block.
    #[must_use]
    pub fn reg_def(&self, reg: RegId) -> Option<InstId> {
        self.regs[reg.index()]
            .def
            .filter(|&inst| self.insts[inst.index()].block.is_some())
    }

    /// Type of an operand. Globals and null are pointers whose pointee is only
    /// known to the module, so they yield `None`.
    #[must_use]
    pub fn operand_ty(&self, op: Operand) -> Option<IrType> {
        match op {
            Operand::Reg(r) => Some(self.reg_ty(r).clone()),
            Operand::Param(i) => self.params.get(i).map(|p| p.ty.clone()),
            Operand::Const(Constant::Int(_)) => Some(IrType::I32),
            Operand::Const(Constant::Bool(_)) => Some(IrType::I1),
            Operand::Global(_) | Operand::Const(Constant::Null) => None,
        }
    }

    /// Returns `true` if the operand holds an address.
    #[must_use]
    pub fn is_pointer(&self, op: Operand) -> bool {
        match op {
            Operand::Global(_) | Operand::Const(Constant::Null) => true,
            other => self.operand_ty(other).is_some_and(|t| t.is_pointer()),
        }
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Entry block.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Merged exit block holding the single `ret`.
    #[must_use]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Sets the entry block and moves it to the front of the layout.
    pub fn set_entry(&mut self, block: BlockId) {
        self.entry = block;
        if let Some(pos) = self.layout.iter().position(|&b| b == block) {
            self.layout.remove(pos);
            self.layout.insert(0, block);
        }
    }

    /// Sets the exit block.
    pub fn set_exit(&mut self, block: BlockId) {
        self.exit = block;
    }

    /// Live blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.layout
    }

    /// Number of block slots ever allocated (the graph node count).
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Block data.
    #[must_use]
    pub fn block(&self, block: BlockId) -> &BlockData {
        &self.blocks[block.index()]
    }

    /// Block data, failing on removed blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedBlock`] if the block was removed or never existed.
    pub fn try_block(&self, block: BlockId) -> Result<&BlockData> {
        match self.blocks.get(block.index()) {
            Some(data) if !data.removed => Ok(data),
            _ => Err(Error::UnresolvedBlock(block.index())),
        }
    }

    /// Returns `true` if the block exists and was not removed.
    #[must_use]
    pub fn is_live_block(&self, block: BlockId) -> bool {
        self.blocks.get(block.index()).is_some_and(|b| !b.removed)
    }

    /// Block label.
    #[must_use]
    pub fn block_name(&self, block: BlockId) -> &str {
        &self.blocks[block.index()].name
    }

    /// Instructions of a block.
    #[must_use]
    pub fn block_insts(&self, block: BlockId) -> &[InstId] {
        &self.blocks[block.index()].insts
    }

    /// Predecessors of a block.
    #[must_use]
    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.blocks[block.index()].preds
    }

    /// Successors of a block.
    #[must_use]
    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.blocks[block.index()].succs
    }

    /// Appends a new block at the end of the layout.
    pub fn add_block(&mut self, name: &str) -> BlockId {
        let id = self.alloc_block(name);
        self.layout.push(id);
        id
    }

    /// Inserts a new block right after `after` in the layout.
    pub fn add_block_after(&mut self, after: BlockId, name: &str) -> BlockId {
        let id = self.alloc_block(name);
        match self.layout.iter().position(|&b| b == after) {
            Some(pos) => self.layout.insert(pos + 1, id),
            None => self.layout.push(id),
        }
        id
    }

    /// Inserts a new block right before `before` in the layout.
    pub fn add_block_before(&mut self, before: BlockId, name: &str) -> BlockId {
        let id = self.alloc_block(name);
        match self.layout.iter().position(|&b| b == before) {
            Some(pos) => self.layout.insert(pos, id),
            None => self.layout.push(id),
        }
        id
    }

    fn alloc_block(&mut self, name: &str) -> BlockId {
        let name = self.unique_name(name);
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BlockData::new(name));
        id
    }

    /// Deletes a block with all of its instructions.
    ///
    /// The block is unlinked from both its predecessors and successors, and phi
    /// operands flowing from it into successors are dropped. Predecessors that
    /// still branch to the block must be rewritten by the caller beforehand.
    pub fn remove_block(&mut self, block: BlockId) {
        for inst in self.blocks[block.index()].insts.clone() {
            self.detach(inst);
        }
        self.blocks[block.index()].insts.clear();

        let succs = std::mem::take(&mut self.blocks[block.index()].succs);
        for succ in succs {
            self.blocks[succ.index()].preds.retain(|&p| p != block);
            self.remove_phi_incoming(succ, block);
        }
        let preds = std::mem::take(&mut self.blocks[block.index()].preds);
        for pred in preds {
            self.blocks[pred.index()].succs.retain(|&s| s != block);
        }

        self.blocks[block.index()].removed = true;
        self.layout.retain(|&b| b != block);
    }

    /// Reorders the layout. `order` must be a permutation of the live blocks.
    pub fn set_layout(&mut self, order: Vec<BlockId>) {
        debug_assert_eq!(order.len(), self.layout.len());
        self.layout = order;
    }

    // ── Instructions ────────────────────────────────────────────────────

    /// Instruction payload.
    #[must_use]
    pub fn inst(&self, inst: InstId) -> &Inst {
        &self.insts[inst.index()].inst
    }

    /// Mutable instruction payload.
    ///
    /// Terminator targets must not be changed through this reference; use
    /// [`Function::set_terminator`] or [`Function::retarget`] so that edges stay
    /// consistent.
    pub fn inst_mut(&mut self, inst: InstId) -> &mut Inst {
        &mut self.insts[inst.index()].inst
    }

    /// Block currently holding the instruction.
    #[must_use]
    pub fn inst_block(&self, inst: InstId) -> Option<BlockId> {
        self.insts[inst.index()].block
    }

    /// All placed instructions in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = (BlockId, InstId)> + '_ {
        self.layout.iter().flat_map(move |&b| {
            self.blocks[b.index()]
                .insts
                .iter()
                .map(move |&i| (b, i))
        })
    }

    /// Number of placed instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.layout
            .iter()
            .map(|b| self.blocks[b.index()].insts.len())
            .sum()
    }

    fn alloc_inst(&mut self, inst: Inst, block: BlockId) -> InstId {
        let id = InstId::new(self.insts.len());
        for def in inst.defs() {
            self.regs[def.index()].def = Some(id);
        }
        self.insts.push(InstData {
            inst,
            block: Some(block),
        });
        id
    }

    fn after_insert(&mut self, block: BlockId, id: InstId) {
        if self.insts[id.index()].inst.is_terminator() {
            self.refresh_edges(block);
        }
    }

    /// Appends an instruction at the end of a block.
    pub fn append_inst(&mut self, block: BlockId, inst: Inst) -> InstId {
        let id = self.alloc_inst(inst, block);
        self.blocks[block.index()].insts.push(id);
        self.after_insert(block, id);
        id
    }

    /// Inserts an instruction at position `pos` of a block.
    pub fn insert_inst(&mut self, block: BlockId, pos: usize, inst: Inst) -> InstId {
        let id = self.alloc_inst(inst, block);
        let insts = &mut self.blocks[block.index()].insts;
        let pos = pos.min(insts.len());
        insts.insert(pos, id);
        self.after_insert(block, id);
        id
    }

    /// Inserts an instruction directly before `before`.
    pub fn insert_before(&mut self, before: InstId, inst: Inst) -> Option<InstId> {
        let block = self.inst_block(before)?;
        let pos = self.position(block, before)?;
        Some(self.insert_inst(block, pos, inst))
    }

    /// Inserts an instruction directly after `after`.
    pub fn insert_after(&mut self, after: InstId, inst: Inst) -> Option<InstId> {
        let block = self.inst_block(after)?;
        let pos = self.position(block, after)?;
        Some(self.insert_inst(block, pos + 1, inst))
    }

    /// Inserts an instruction before the terminator of `block` (or at its end).
    pub fn insert_before_terminator(&mut self, block: BlockId, inst: Inst) -> InstId {
        let pos = match self.terminator(block) {
            Some(term) => self.position(block, term).unwrap_or(0),
            None => self.blocks[block.index()].insts.len(),
        };
        self.insert_inst(block, pos, inst)
    }

    /// Inserts a phi after the existing phis at the head of `block`.
    pub fn insert_phi(&mut self, block: BlockId, inst: Inst) -> InstId {
        let pos = self.phis(block).len();
        self.insert_inst(block, pos, inst)
    }

    /// Index of an instruction within its block.
    #[must_use]
    pub fn position(&self, block: BlockId, inst: InstId) -> Option<usize> {
        self.blocks[block.index()].insts.iter().position(|&i| i == inst)
    }

    fn detach(&mut self, inst: InstId) {
        self.insts[inst.index()].block = None;
        for def in self.insts[inst.index()].inst.defs() {
            if self.regs[def.index()].def == Some(inst) {
                self.regs[def.index()].def = None;
            }
        }
    }

    /// Removes an instruction from its block.
    ///
    /// Removing a terminator also removes the outgoing edges of the block.
    pub fn remove_inst(&mut self, inst: InstId) {
        let Some(block) = self.inst_block(inst) else {
            return;
        };
        self.blocks[block.index()].insts.retain(|&i| i != inst);
        let was_terminator = self.insts[inst.index()].inst.is_terminator();
        self.detach(inst);
        if was_terminator {
            self.refresh_edges(block);
        }
    }

    /// Moves an existing instruction before the terminator of `block`.
    pub fn move_before_terminator(&mut self, inst: InstId, block: BlockId) {
        if let Some(old) = self.inst_block(inst) {
            self.blocks[old.index()].insts.retain(|&i| i != inst);
        }
        let pos = match self.terminator(block) {
            Some(term) => self.position(block, term).unwrap_or(0),
            None => self.blocks[block.index()].insts.len(),
        };
        self.blocks[block.index()].insts.insert(pos, inst);
        self.insts[inst.index()].block = Some(block);
    }

    /// Terminator of a block, if the block ends in one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.blocks[block.index()]
            .insts
            .last()
            .copied()
            .filter(|&i| self.insts[i.index()].inst.is_terminator())
    }

    /// Replaces (or installs) the terminator of `block` and refreshes its edges.
    pub fn set_terminator(&mut self, block: BlockId, inst: Inst) -> InstId {
        if let Some(old) = self.terminator(block) {
            self.blocks[block.index()].insts.retain(|&i| i != old);
            self.detach(old);
        }
        self.append_inst(block, inst)
    }

    /// Rewrites branch targets of `block` from `from` to `to` and refreshes edges.
    pub fn retarget(&mut self, block: BlockId, from: BlockId, to: BlockId) -> bool {
        let Some(term) = self.terminator(block) else {
            return false;
        };
        let changed = self.insts[term.index()].inst.replace_target(from, to);
        if changed {
            self.refresh_edges(block);
        }
        changed
    }

    /// Recomputes the successor list of `block` from its terminator and patches
    /// the predecessor lists of old and new successors.
    pub fn refresh_edges(&mut self, block: BlockId) {
        let new_succs = match self.terminator(block) {
            Some(term) => self.insts[term.index()].inst.targets(),
            None => Vec::new(),
        };
        let old_succs = std::mem::take(&mut self.blocks[block.index()].succs);
        for old in &old_succs {
            if !new_succs.contains(old) {
                self.blocks[old.index()].preds.retain(|&p| p != block);
            }
        }
        for new in &new_succs {
            let preds = &mut self.blocks[new.index()].preds;
            if !preds.contains(&block) {
                preds.push(block);
            }
        }
        self.blocks[block.index()].succs = new_succs;
    }

    /// Leading phi instructions of a block.
    #[must_use]
    pub fn phis(&self, block: BlockId) -> Vec<InstId> {
        self.blocks[block.index()]
            .insts
            .iter()
            .copied()
            .take_while(|&i| self.insts[i.index()].inst.is_phi())
            .collect()
    }

    /// Drops phi operands of `block` that flow in from `pred`.
    pub fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId) {
        for phi in self.phis(block) {
            if let Inst::Phi { incoming, .. } = &mut self.insts[phi.index()].inst {
                incoming.retain(|(_, b)| *b != pred);
            }
        }
    }

    /// Relabels phi operands of `block` from predecessor `from` to `to`.
    pub fn retarget_phis(&mut self, block: BlockId, from: BlockId, to: BlockId) {
        for phi in self.phis(block) {
            if let Inst::Phi { incoming, .. } = &mut self.insts[phi.index()].inst {
                for (_, b) in incoming.iter_mut() {
                    if *b == from {
                        *b = to;
                    }
                }
            }
        }
    }

    /// Replaces every read of `from` by `to` in placed instructions.
    pub fn replace_all_uses(&mut self, from: Operand, to: Operand) -> usize {
        let mut count = 0;
        for b in self.layout.clone() {
            for i in self.blocks[b.index()].insts.clone() {
                if self.insts[i.index()].inst.replace_operand(from, to) {
                    count += 1;
                }
            }
        }
        count
    }

    /// For every register, the placed instructions reading it.
    #[must_use]
    pub fn uses_map(&self) -> Vec<Vec<InstId>> {
        let mut uses = vec![Vec::new(); self.regs.len()];
        for (_, inst) in self.instructions() {
            for reg in self.inst(inst).used_regs() {
                let list: &mut Vec<InstId> = &mut uses[reg.index()];
                if !list.contains(&inst) {
                    list.push(inst);
                }
            }
        }
        uses
    }

    /// Moves the instructions of `block` from position `at` onward into a new
    /// block placed right after it.
    ///
    /// The new block inherits the terminator and therefore the successors;
    /// successor phis are relabeled to name the new block. `block` is left
    /// without a terminator for the caller to complete.
    pub fn split_block(&mut self, block: BlockId, at: usize, name: &str) -> BlockId {
        let tail_block = self.add_block_after(block, name);
        let tail: Vec<InstId> = {
            let insts = &mut self.blocks[block.index()].insts;
            let at = at.min(insts.len());
            insts.split_off(at)
        };
        for &inst in &tail {
            self.insts[inst.index()].block = Some(tail_block);
        }
        self.blocks[tail_block.index()].insts = tail;

        let succs = self.blocks[block.index()].succs.clone();
        for succ in succs {
            self.retarget_phis(succ, block, tail_block);
        }
        self.refresh_edges(block);
        self.refresh_edges(tail_block);
        if self.exit == block {
            self.exit = tail_block;
        }
        tail_block
    }

    /// Returns `true` if any instruction is a call.
    #[must_use]
    pub fn has_calls(&self) -> bool {
        self.instructions()
            .any(|(_, i)| matches!(self.inst(i), Inst::Call { .. }))
    }

    /// Checks the single-exit shape the optimizer relies on.
    ///
    /// Returns `true` when some block lacks a terminator, has a terminator that
    /// is not its last instruction, or when the function does not contain
    /// exactly one `ret` placed in the exit block.
    #[must_use]
    pub fn is_not_functional(&self) -> bool {
        if self.external {
            return false;
        }
        let mut returns = 0;
        for &block in &self.layout {
            let insts = &self.blocks[block.index()].insts;
            let Some(&last) = insts.last() else {
                return true;
            };
            if !self.inst(last).is_terminator() {
                return true;
            }
            for &inst in &insts[..insts.len() - 1] {
                if self.inst(inst).is_terminator() {
                    return true;
                }
            }
            if matches!(self.inst(last), Inst::Return { .. }) {
                returns += 1;
                if block != self.exit {
                    return true;
                }
            }
        }
        returns != 1
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new_external("", IrType::Void, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, IcmpCond};

    fn diamond() -> (Function, [BlockId; 4]) {
        let mut f = Function::new("f", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let entry = f.add_block("entry");
        let a = f.add_block("a");
        let b = f.add_block("b");
        let merge = f.add_block("merge");
        f.set_entry(entry);
        f.set_exit(merge);
        let c = f.new_reg("c", IrType::I1);
        f.append_inst(
            entry,
            Inst::Icmp {
                cond: IcmpCond::Sgt,
                dest: c,
                lhs: Operand::Param(0),
                rhs: Operand::int(0),
            },
        );
        f.append_inst(
            entry,
            Inst::Branch {
                cond: Operand::Reg(c),
                then_bb: a,
                else_bb: b,
            },
        );
        f.append_inst(a, Inst::Jump { target: merge });
        f.append_inst(b, Inst::Jump { target: merge });
        f.append_inst(
            merge,
            Inst::Return {
                value: Some(Operand::int(1)),
            },
        );
        (f, [entry, a, b, merge])
    }

    #[test]
    fn test_edges_follow_terminators() {
        let (f, [entry, a, b, merge]) = diamond();
        assert_eq!(f.succs(entry), &[a, b]);
        assert_eq!(f.preds(merge), &[a, b]);
        assert!(f.preds(entry).is_empty());
        assert!(!f.is_not_functional());
    }

    #[test]
    fn test_retarget_updates_preds() {
        let (mut f, [entry, a, b, merge]) = diamond();
        assert!(f.retarget(entry, b, merge));
        assert_eq!(f.succs(entry), &[a, merge]);
        assert!(f.preds(b).is_empty());
        assert!(f.preds(merge).contains(&entry));
    }

    #[test]
    fn test_split_block_moves_tail() {
        let (mut f, [entry, a, _, merge]) = diamond();
        let tail = f.split_block(entry, 1, "entry.split");
        assert_eq!(f.block_insts(entry).len(), 1);
        assert!(f.terminator(entry).is_none());
        assert!(f.succs(entry).is_empty());
        assert!(f.preds(a).contains(&tail));
        assert!(!f.preds(a).contains(&entry));
        f.append_inst(entry, Inst::Jump { target: tail });
        assert_eq!(f.preds(tail), &[entry]);
        assert_eq!(f.exit(), merge);
    }

    #[test]
    fn test_remove_block_cleans_phis() {
        let (mut f, [_, a, b, merge]) = diamond();
        let r = f.new_reg("p", IrType::I32);
        f.insert_phi(
            merge,
            Inst::Phi {
                dest: r,
                incoming: vec![(Operand::int(1), a), (Operand::int(2), b)],
            },
        );
        f.remove_block(b);
        let phi = f.phis(merge)[0];
        match f.inst(phi) {
            Inst::Phi { incoming, .. } => assert_eq!(incoming, &vec![(Operand::int(1), a)]),
            _ => panic!("expected phi"),
        }
        assert_eq!(f.preds(merge), &[a]);
        assert!(!f.blocks().contains(&b));
    }

    #[test]
    fn test_unique_names_and_defs() {
        let mut f = Function::new("g", IrType::Void, Vec::new());
        let bb = f.add_block("entry");
        let r1 = f.new_reg("x", IrType::I32);
        let r2 = f.new_reg("x", IrType::I32);
        assert_ne!(f.reg_name(r1), f.reg_name(r2));
        let inst = f.append_inst(
            bb,
            Inst::Binary {
                op: BinaryOp::Add,
                dest: r1,
                lhs: Operand::int(1),
                rhs: Operand::int(2),
            },
        );
        assert_eq!(f.reg_def(r1), Some(inst));
        f.remove_inst(inst);
        assert_eq!(f.reg_def(r1), None);
    }

    #[test]
    fn test_not_functional_without_terminator() {
        let mut f = Function::new("h", IrType::Void, Vec::new());
        let bb = f.add_block("entry");
        f.set_entry(bb);
        f.set_exit(bb);
        assert!(f.is_not_functional());
        f.append_inst(bb, Inst::Return { value: None });
        assert!(!f.is_not_functional());
    }
}
