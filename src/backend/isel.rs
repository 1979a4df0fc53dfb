//! Instruction selection from IR to RV32IM machine IR.
//!
//! Selection runs on functions that already left SSA form: phis are gone and
//! values flow through `move` instructions. Every IR register maps to one
//! virtual register, so the several moves defining a former phi result all
//! write the same virtual register.
//!
//! # Selection Rules
//!
//! | IR                      | Machine code                                    |
//! |-------------------------|-------------------------------------------------|
//! | constant 0, `false`, `null` | the `zero` register                         |
//! | other constants         | `li`                                            |
//! | global address          | `lui %hi` + `addi %lo`                          |
//! | binary with 12-bit rhs  | immediate form (`addi`, `slli`, `andi`, ...)    |
//! | `icmp` feeding only its block's branch | fused `beq`/`bne`/`blt`/`bge`    |
//! | other `icmp`            | `xor`/`seqz`/`snez`/`slt`/`xori` sequences      |
//! | `gep` with constant offset used only as an address | folded displacement  |
//! | `alloca`                | frame slot, no code                             |
//! | call                    | args in `a0`-`a7`, overflow in the outgoing area |
//!
//! # Calling Convention
//!
//! The entry block copies every callee-saved register into a fresh virtual
//! register and every return restores them. The allocator coalesces these
//! copies away when a callee-saved register is not needed and otherwise
//! spills or keeps them, which is exactly a save and restore. The return
//! address is handled by the frame: it is saved only in functions with calls.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::{DominanceInfo, LoopForest},
    backend::{
        mir::{
            is_imm12, Address, AluImmOp, AluOp, BranchOp, Imm, MBlock, MBlockId, MFunction, MInst,
            Reg, StackSlot, Width,
        },
        target::{PhysReg, RegisterFile, ARG_REGS},
    },
    ir::{
        BinaryOp, BlockId, Constant, FuncId, Function, IcmpCond, Inst, InstId, IrType, Module,
        Operand, RegId,
    },
    Result,
};

/// Selects machine code for the functions of a module.
pub struct InstructionSelector<'a> {
    module: &'a Module,
    rf: &'a RegisterFile,
}

impl<'a> InstructionSelector<'a> {
    /// Creates a selector for `module`.
    #[must_use]
    pub fn new(module: &'a Module, rf: &'a RegisterFile) -> Self {
        Self { module, rf }
    }

    /// Selects machine code for one defined function.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the function still contains phis or
    /// parallel copies, or if an operand cannot be lowered.
    pub fn select(&self, id: FuncId) -> Result<MFunction> {
        let func = self.module.function(id);
        if func.is_external() || func.is_removed() {
            return Err(invariant_error!(
                "cannot select code for function '{}' without a body",
                func.name()
            ));
        }
        let mut selector = FunctionSelector::new(self.module, self.rf, func);
        selector.run()?;
        let mut mf = selector.mf;
        mf.compute_cfg();
        log::trace!(
            "selected {} machine instructions for '{}'",
            mf.instruction_count(),
            mf.name
        );
        Ok(mf)
    }
}

/// Copies loop nesting depths from the IR blocks onto the machine blocks.
///
/// Machine blocks are laid out like the IR blocks they were selected from,
/// with the entry block first.
///
/// # Errors
///
/// Returns an error if dominators cannot be computed for `func`.
pub fn assign_loop_depths(mf: &mut MFunction, func: &Function) -> Result<()> {
    let dom = DominanceInfo::compute(func)?;
    let loops = LoopForest::compute(func, &dom);
    for (index, block) in block_order(func).into_iter().enumerate() {
        if let Some(mblock) = mf.blocks.get_mut(index) {
            mblock.loop_depth = u32::try_from(loops.loop_depth(block)).unwrap_or(u32::MAX);
        }
    }
    Ok(())
}

fn block_order(func: &Function) -> Vec<BlockId> {
    let entry = func.entry();
    std::iter::once(entry)
        .chain(func.blocks().iter().copied().filter(|&b| b != entry))
        .collect()
}

enum FoldBase {
    Frame(StackSlot),
    Value(Operand),
}

struct FunctionSelector<'a> {
    module: &'a Module,
    rf: &'a RegisterFile,
    func: &'a Function,
    mf: MFunction,
    vregs: Vec<Option<Reg>>,
    params: Vec<Reg>,
    blocks: BTreeMap<BlockId, MBlockId>,
    allocas: BTreeMap<RegId, StackSlot>,
    folded: BTreeSet<RegId>,
    fused: BTreeSet<RegId>,
    saved: Vec<(PhysReg, Reg)>,
    current: usize,
}

impl<'a> FunctionSelector<'a> {
    fn new(module: &'a Module, rf: &'a RegisterFile, func: &'a Function) -> Self {
        Self {
            module,
            rf,
            func,
            mf: MFunction::new(func.name()),
            vregs: vec![None; func.reg_count()],
            params: Vec::new(),
            blocks: BTreeMap::new(),
            allocas: BTreeMap::new(),
            folded: BTreeSet::new(),
            fused: BTreeSet::new(),
            saved: Vec::new(),
            current: 0,
        }
    }

    fn run(&mut self) -> Result<()> {
        let order = block_order(self.func);
        for (index, &block) in order.iter().enumerate() {
            self.blocks.insert(block, MBlockId(index));
            let label = format!(".L{}.{}", self.func.name(), self.func.block_name(block));
            self.mf.blocks.push(MBlock::new(label, 0));
        }
        self.classify();
        self.prologue();
        let func = self.func;
        for (index, &block) in order.iter().enumerate() {
            self.current = index;
            for &inst in func.block_insts(block) {
                self.select_inst(block, inst)?;
            }
        }
        Ok(())
    }

    // ── Pre-scan ────────────────────────────────────────────────────────

    /// Finds allocas, foldable address computations and fusable compares.
    fn classify(&mut self) {
        let func = self.func;
        for (_, inst) in func.instructions() {
            if let Inst::Alloca { dest, ty } = func.inst(inst) {
                let size = self.module.size_of(ty);
                let slot = self.mf.frame.add_local(size);
                self.allocas.insert(*dest, slot);
            }
        }

        let uses = func.uses_map();
        for (block, inst) in func.instructions() {
            match func.inst(inst) {
                Inst::Gep { dest, .. } => {
                    let address_only = uses[dest.index()].iter().all(|&u| {
                        match func.inst(u) {
                            Inst::Load { ptr, .. } => *ptr == Operand::Reg(*dest),
                            Inst::Store { value, ptr } => {
                                *ptr == Operand::Reg(*dest) && *value != Operand::Reg(*dest)
                            }
                            _ => false,
                        }
                    });
                    if address_only && self.constant_offset(inst).is_some_and(is_imm12) {
                        self.folded.insert(*dest);
                    }
                }
                Inst::Icmp { dest, .. } => {
                    let users = &uses[dest.index()];
                    let fusable = users.len() == 1
                        && func.terminator(block) == Some(users[0])
                        && matches!(
                            func.inst(users[0]),
                            Inst::Branch { cond, .. } if *cond == Operand::Reg(*dest)
                        );
                    if fusable {
                        self.fused.insert(*dest);
                    }
                }
                _ => {}
            }
        }
    }

    /// Byte offset of a `gep` whose indices are all constant.
    fn constant_offset(&self, inst: InstId) -> Option<i32> {
        let Inst::Gep { ptr, indices, .. } = self.func.inst(inst) else {
            return None;
        };
        let pointee = self.pointee(*ptr);
        let mut offset = 0i32;
        if let Some(first) = indices.first() {
            let elem = i32::try_from(self.module.size_of(&pointee)).ok()?;
            offset = offset.checked_add(first.as_int()?.checked_mul(elem)?)?;
        }
        if let Some(second) = indices.get(1) {
            let index = second.as_int()?;
            offset = offset.checked_add(match pointee {
                IrType::Struct(id) => {
                    let field = usize::try_from(index).ok()?;
                    i32::try_from(self.module.field_offset(id, field)).ok()?
                }
                other => index.checked_mul(i32::try_from(self.module.size_of(&other)).ok()?)?,
            })?;
        }
        if indices.len() > 2 {
            return None;
        }
        Some(offset)
    }

    fn pointee(&self, ptr: Operand) -> IrType {
        self.module
            .operand_ty(self.func, ptr)
            .pointee()
            .cloned()
            .unwrap_or(IrType::I32)
    }

    fn width_of(&self, ptr: Operand) -> Width {
        match self.pointee(ptr) {
            IrType::I1 | IrType::I8 => Width::Byte,
            _ => Width::Word,
        }
    }

    // ── Emission helpers ────────────────────────────────────────────────

    fn emit(&mut self, inst: MInst) {
        self.mf.blocks[self.current].insts.push(inst);
    }

    fn vreg(&mut self, reg: RegId) -> Reg {
        if let Some(v) = self.vregs[reg.index()] {
            return v;
        }
        let v = self.mf.new_vreg();
        self.vregs[reg.index()] = Some(v);
        v
    }

    fn target(&self, block: BlockId) -> Result<MBlockId> {
        self.blocks
            .get(&block)
            .copied()
            .ok_or_else(|| invariant_error!("branch to unknown block {}", block))
    }

    /// Register holding the value of `op`, emitting code as needed.
    fn operand(&mut self, op: Operand) -> Result<Reg> {
        match op {
            Operand::Reg(r) => {
                if let Some(&slot) = self.allocas.get(&r) {
                    let rd = self.mf.new_vreg();
                    self.emit(MInst::FrameAddr { rd, slot });
                    return Ok(rd);
                }
                if self.folded.contains(&r) {
                    return self.materialize_folded(r);
                }
                Ok(self.vreg(r))
            }
            Operand::Param(i) => self
                .params
                .get(i)
                .copied()
                .ok_or_else(|| invariant_error!("parameter {} out of range", i)),
            Operand::Global(g) => {
                let symbol = self.module.global(g).name.clone();
                let hi = self.mf.new_vreg();
                self.emit(MInst::LuiHi {
                    rd: hi,
                    symbol: symbol.clone(),
                });
                let rd = self.mf.new_vreg();
                self.emit(MInst::AluImm {
                    op: AluImmOp::Addi,
                    rd,
                    rs1: hi,
                    imm: Imm::Lo(symbol),
                });
                Ok(rd)
            }
            Operand::Const(c) => {
                let value = match c {
                    Constant::Int(v) => v,
                    Constant::Bool(b) => i32::from(b),
                    Constant::Null => 0,
                };
                if value == 0 {
                    return Ok(Reg::ZERO);
                }
                let rd = self.mf.new_vreg();
                self.emit(MInst::Li { rd, imm: value });
                Ok(rd)
            }
        }
    }

    /// Computes the address of a folded `gep` into a fresh register.
    fn materialize_folded(&mut self, reg: RegId) -> Result<Reg> {
        let (base, offset) = self.fold(Operand::Reg(reg));
        let rs1 = match base {
            FoldBase::Frame(slot) => {
                let rd = self.mf.new_vreg();
                self.emit(MInst::FrameAddr { rd, slot });
                rd
            }
            FoldBase::Value(op) => self.operand(op)?,
        };
        let rd = self.mf.new_vreg();
        self.emit(MInst::AluImm {
            op: AluImmOp::Addi,
            rd,
            rs1,
            imm: Imm::Int(offset),
        });
        Ok(rd)
    }

    /// Writes the value of `op` into `rd`.
    fn copy_into(&mut self, rd: Reg, op: Operand) -> Result<()> {
        if let Some(imm) = op.as_int().or_else(|| op.is_null().then_some(0)) {
            self.emit(MInst::Li { rd, imm });
            return Ok(());
        }
        let rs = self.operand(op)?;
        self.emit(MInst::Mv { rd, rs });
        Ok(())
    }

    /// Memory operand for a load or store through `ptr`.
    fn address(&mut self, ptr: Operand) -> Result<Address> {
        let (base, offset) = self.fold(ptr);
        match base {
            FoldBase::Frame(slot) => Ok(Address::Frame { slot, offset }),
            FoldBase::Value(Operand::Global(g)) if offset == 0 => {
                let symbol = self.module.global(g).name.clone();
                let hi = self.mf.new_vreg();
                self.emit(MInst::LuiHi {
                    rd: hi,
                    symbol: symbol.clone(),
                });
                Ok(Address::Global { base: hi, symbol })
            }
            FoldBase::Value(op) => Ok(Address::Base {
                base: self.operand(op)?,
                offset,
            }),
        }
    }

    fn fold(&self, ptr: Operand) -> (FoldBase, i32) {
        if let Operand::Reg(r) = ptr {
            if let Some(&slot) = self.allocas.get(&r) {
                return (FoldBase::Frame(slot), 0);
            }
            if self.folded.contains(&r) {
                if let Some(def) = self.func.reg_def(r) {
                    if let (Inst::Gep { ptr: base, .. }, Some(offset)) =
                        (self.func.inst(def), self.constant_offset(def))
                    {
                        let (inner, inner_offset) = self.fold(*base);
                        return match inner_offset.checked_add(offset).filter(|&o| is_imm12(o)) {
                            Some(total) => (inner, total),
                            None => (FoldBase::Value(*base), offset),
                        };
                    }
                }
            }
        }
        (FoldBase::Value(ptr), 0)
    }

    // ── Prologue ────────────────────────────────────────────────────────

    fn prologue(&mut self) {
        self.current = 0;
        let callee_saved = self.rf.callee_saved().to_vec();
        for phys in callee_saved {
            let v = self.mf.new_vreg();
            self.emit(MInst::Mv {
                rd: v,
                rs: Reg::Phys(phys),
            });
            self.saved.push((phys, v));
        }
        let func = self.func;
        for (i, param) in func.params().iter().enumerate() {
            let v = self.mf.new_vreg();
            match PhysReg::arg(i) {
                Some(a) => self.emit(MInst::Mv {
                    rd: v,
                    rs: Reg::Phys(a),
                }),
                None => {
                    let width = match param.ty {
                        IrType::I1 | IrType::I8 => Width::Byte,
                        _ => Width::Word,
                    };
                    self.emit(MInst::Load {
                        width,
                        rd: v,
                        addr: Address::Frame {
                            slot: StackSlot::IncomingArg(i - ARG_REGS),
                            offset: 0,
                        },
                    });
                }
            }
            self.params.push(v);
        }
    }

    // ── Instructions ────────────────────────────────────────────────────

    fn select_inst(&mut self, block: BlockId, inst: InstId) -> Result<()> {
        match self.func.inst(inst).clone() {
            Inst::Binary { op, dest, lhs, rhs } => {
                let rd = self.vreg(dest);
                self.select_binary(op, rd, lhs, rhs)
            }
            Inst::Icmp {
                cond,
                dest,
                lhs,
                rhs,
            } => {
                if self.fused.contains(&dest) {
                    return Ok(());
                }
                let rd = self.vreg(dest);
                self.select_icmp(cond, rd, lhs, rhs)
            }
            Inst::Load { dest, ptr } => {
                let rd = self.vreg(dest);
                let width = self.width_of(ptr);
                let addr = self.address(ptr)?;
                self.emit(MInst::Load { width, rd, addr });
                Ok(())
            }
            Inst::Store { value, ptr } => {
                let rs = self.operand(value)?;
                let width = self.width_of(ptr);
                let addr = self.address(ptr)?;
                self.emit(MInst::Store { width, rs, addr });
                Ok(())
            }
            Inst::Alloca { .. } => Ok(()),
            Inst::Gep { dest, .. } if self.folded.contains(&dest) => Ok(()),
            Inst::Gep { dest, ptr, indices } => self.select_gep(dest, ptr, &indices),
            Inst::BitCast { dest, src } | Inst::Move { dest, src } => {
                let rd = self.vreg(dest);
                self.copy_into(rd, src)
            }
            Inst::Call { dest, callee, args } => self.select_call(dest, callee, &args),
            Inst::Branch {
                cond,
                then_bb,
                else_bb,
            } => self.select_branch(cond, then_bb, else_bb),
            Inst::Jump { target } => {
                let target = self.target(target)?;
                self.emit(MInst::Jump { target });
                Ok(())
            }
            Inst::Return { value } => {
                if let Some(value) = value {
                    self.copy_into(Reg::Phys(PhysReg::A0), value)?;
                }
                for (phys, v) in self.saved.clone() {
                    self.emit(MInst::Mv {
                        rd: Reg::Phys(phys),
                        rs: v,
                    });
                }
                self.emit(MInst::Ret {
                    value: value.is_some(),
                });
                Ok(())
            }
            Inst::Phi { .. } | Inst::ParallelCopy { .. } => Err(invariant_error!(
                "'{}' in {} of '{}' reached instruction selection",
                self.func.inst(inst).mnemonic(),
                block,
                self.func.name()
            )),
        }
    }

    fn select_binary(&mut self, op: BinaryOp, rd: Reg, lhs: Operand, rhs: Operand) -> Result<()> {
        let (lhs, rhs) = if op.is_commutative() && lhs.is_const() && !rhs.is_const() {
            (rhs, lhs)
        } else {
            (lhs, rhs)
        };

        if let Some(c) = rhs.as_int() {
            let imm_form = match op {
                BinaryOp::Add if is_imm12(c) => Some((AluImmOp::Addi, c)),
                BinaryOp::Sub if c != i32::MIN && is_imm12(-c) => Some((AluImmOp::Addi, -c)),
                BinaryOp::Shl => Some((AluImmOp::Slli, c & 31)),
                BinaryOp::AShr => Some((AluImmOp::Srai, c & 31)),
                BinaryOp::And if is_imm12(c) => Some((AluImmOp::Andi, c)),
                BinaryOp::Or if is_imm12(c) => Some((AluImmOp::Ori, c)),
                BinaryOp::Xor if is_imm12(c) => Some((AluImmOp::Xori, c)),
                _ => None,
            };
            if let Some((op, imm)) = imm_form {
                let rs1 = self.operand(lhs)?;
                self.emit(MInst::AluImm {
                    op,
                    rd,
                    rs1,
                    imm: Imm::Int(imm),
                });
                return Ok(());
            }
        }

        let alu = match op {
            BinaryOp::Add => AluOp::Add,
            BinaryOp::Sub => AluOp::Sub,
            BinaryOp::Mul => AluOp::Mul,
            BinaryOp::SDiv => AluOp::Div,
            BinaryOp::SRem => AluOp::Rem,
            BinaryOp::Shl => AluOp::Sll,
            BinaryOp::AShr => AluOp::Sra,
            BinaryOp::And => AluOp::And,
            BinaryOp::Or => AluOp::Or,
            BinaryOp::Xor => AluOp::Xor,
        };
        let rs1 = self.operand(lhs)?;
        let rs2 = self.operand(rhs)?;
        self.emit(MInst::Alu {
            op: alu,
            rd,
            rs1,
            rs2,
        });
        Ok(())
    }

    /// `slt`, taking the immediate form for a small constant rhs.
    fn less_than(&mut self, rd: Reg, lhs: Operand, rhs: Operand) -> Result<()> {
        let rs1 = self.operand(lhs)?;
        match rhs.as_int().filter(|&c| is_imm12(c)) {
            Some(c) => self.emit(MInst::AluImm {
                op: AluImmOp::Slti,
                rd,
                rs1,
                imm: Imm::Int(c),
            }),
            None => {
                let rs2 = self.operand(rhs)?;
                self.emit(MInst::Alu {
                    op: AluOp::Slt,
                    rd,
                    rs1,
                    rs2,
                });
            }
        }
        Ok(())
    }

    fn select_icmp(&mut self, cond: IcmpCond, rd: Reg, lhs: Operand, rhs: Operand) -> Result<()> {
        match cond {
            IcmpCond::Eq | IcmpCond::Ne => {
                let diff = if rhs.as_int() == Some(0) || rhs.is_null() {
                    self.operand(lhs)?
                } else {
                    let t = self.mf.new_vreg();
                    self.select_binary(BinaryOp::Xor, t, lhs, rhs)?;
                    t
                };
                self.emit(if cond == IcmpCond::Eq {
                    MInst::Seqz { rd, rs: diff }
                } else {
                    MInst::Snez { rd, rs: diff }
                });
            }
            IcmpCond::Slt => self.less_than(rd, lhs, rhs)?,
            IcmpCond::Sgt => self.less_than(rd, rhs, lhs)?,
            IcmpCond::Sge | IcmpCond::Sle => {
                let t = self.mf.new_vreg();
                if cond == IcmpCond::Sge {
                    self.less_than(t, lhs, rhs)?;
                } else {
                    self.less_than(t, rhs, lhs)?;
                }
                self.emit(MInst::AluImm {
                    op: AluImmOp::Xori,
                    rd,
                    rs1: t,
                    imm: Imm::Int(1),
                });
            }
        }
        Ok(())
    }

    fn select_branch(&mut self, cond: Operand, then_bb: BlockId, else_bb: BlockId) -> Result<()> {
        let then_target = self.target(then_bb)?;
        let else_target = self.target(else_bb)?;

        if let Some(value) = cond.as_int() {
            let target = if value != 0 { then_target } else { else_target };
            self.emit(MInst::Jump { target });
            return Ok(());
        }

        let fused = cond
            .as_reg()
            .filter(|r| self.fused.contains(r))
            .and_then(|r| self.func.reg_def(r))
            .map(|def| self.func.inst(def).clone());
        let (op, rs1, rs2) = match fused {
            Some(Inst::Icmp { cond, lhs, rhs, .. }) => {
                let (op, a, b) = match cond {
                    IcmpCond::Eq => (BranchOp::Beq, lhs, rhs),
                    IcmpCond::Ne => (BranchOp::Bne, lhs, rhs),
                    IcmpCond::Slt => (BranchOp::Blt, lhs, rhs),
                    IcmpCond::Sge => (BranchOp::Bge, lhs, rhs),
                    IcmpCond::Sgt => (BranchOp::Blt, rhs, lhs),
                    IcmpCond::Sle => (BranchOp::Bge, rhs, lhs),
                };
                (op, self.operand(a)?, self.operand(b)?)
            }
            _ => (BranchOp::Bne, self.operand(cond)?, Reg::ZERO),
        };
        self.emit(MInst::Branch {
            op,
            rs1,
            rs2,
            target: then_target,
        });
        self.emit(MInst::Jump {
            target: else_target,
        });
        Ok(())
    }

    fn select_gep(&mut self, dest: RegId, ptr: Operand, indices: &[Operand]) -> Result<()> {
        let rd = self.vreg(dest);
        let pointee = self.pointee(ptr);
        let mut addr = self.operand(ptr)?;
        let mut offset = 0i32;

        let mut scaled = |this: &mut Self, index: Operand, size: u32, addr: &mut Reg| -> Result<()> {
            let size = i32::try_from(size).unwrap_or(i32::MAX);
            if let Some(c) = index.as_int() {
                offset = offset.wrapping_add(c.wrapping_mul(size));
                return Ok(());
            }
            let idx = this.operand(index)?;
            let step = if size == 1 {
                idx
            } else {
                let t = this.mf.new_vreg();
                if size > 0 && (size & (size - 1)) == 0 {
                    this.emit(MInst::AluImm {
                        op: AluImmOp::Slli,
                        rd: t,
                        rs1: idx,
                        imm: Imm::Int(size.trailing_zeros() as i32),
                    });
                } else {
                    let s = this.operand(Operand::int(size))?;
                    this.emit(MInst::Alu {
                        op: AluOp::Mul,
                        rd: t,
                        rs1: idx,
                        rs2: s,
                    });
                }
                t
            };
            let sum = this.mf.new_vreg();
            this.emit(MInst::Alu {
                op: AluOp::Add,
                rd: sum,
                rs1: *addr,
                rs2: step,
            });
            *addr = sum;
            Ok(())
        };

        let elem_size = self.module.size_of(&pointee);
        if let Some(&first) = indices.first() {
            scaled(self, first, elem_size, &mut addr)?;
        }
        if let Some(&second) = indices.get(1) {
            match pointee {
                IrType::Struct(id) => {
                    let field = second
                        .as_int()
                        .and_then(|i| usize::try_from(i).ok())
                        .ok_or_else(|| invariant_error!("non-constant member index in {}", dest))?;
                    let member = i32::try_from(self.module.field_offset(id, field)).unwrap_or(0);
                    scaled(self, Operand::int(member), 1, &mut addr)?;
                }
                other => {
                    let size = self.module.size_of(&other);
                    scaled(self, second, size, &mut addr)?;
                }
            }
        }

        if offset == 0 {
            self.emit(MInst::Mv { rd, rs: addr });
        } else if is_imm12(offset) {
            self.emit(MInst::AluImm {
                op: AluImmOp::Addi,
                rd,
                rs1: addr,
                imm: Imm::Int(offset),
            });
        } else {
            let k = self.operand(Operand::int(offset))?;
            self.emit(MInst::Alu {
                op: AluOp::Add,
                rd,
                rs1: addr,
                rs2: k,
            });
        }
        Ok(())
    }

    fn select_call(&mut self, dest: Option<RegId>, callee: FuncId, args: &[Operand]) -> Result<()> {
        let values = args
            .iter()
            .map(|&a| self.operand(a))
            .collect::<Result<Vec<_>>>()?;
        for (i, &value) in values.iter().enumerate().skip(ARG_REGS) {
            self.emit(MInst::Store {
                width: Width::Word,
                rs: value,
                addr: Address::Frame {
                    slot: StackSlot::OutgoingArg(i - ARG_REGS),
                    offset: 0,
                },
            });
        }
        for (i, &value) in values.iter().enumerate().take(ARG_REGS) {
            if let Some(a) = PhysReg::arg(i) {
                self.emit(MInst::Mv {
                    rd: Reg::Phys(a),
                    rs: value,
                });
            }
        }
        self.mf.frame.note_call(args.len());
        self.emit(MInst::Call {
            callee: self.module.function(callee).name().to_string(),
            args: args.len(),
        });
        if let Some(dest) = dest {
            let rd = self.vreg(dest);
            self.emit(MInst::Mv {
                rd,
                rs: Reg::Phys(PhysReg::A0),
            });
        }
        Ok(())
    }
}
