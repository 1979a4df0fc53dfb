//! Machine IR.
//!
//! RV32IM instructions over physical and virtual registers, grouped into
//! blocks that mirror the IR blocks they were selected from. Instruction
//! selection produces virtual registers; the register allocator rewrites them
//! to physical ones in place.
//!
//! Every instruction reports the registers it reads and writes, including the
//! implicit ones: a call reads its argument registers and clobbers every
//! caller-saved register, a return reads `ra`, `a0` and the callee-saved set.
//! This is what makes the calling convention visible to liveness analysis.

use std::fmt;

use crate::backend::{
    frame::Frame,
    target::{PhysReg, RegisterFile, ARG_REGS},
};

/// A machine register operand.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Reg {
    /// A hardware register.
    Phys(PhysReg),
    /// A virtual register awaiting allocation.
    Virt(u32),
}

impl Reg {
    /// The zero register.
    pub const ZERO: Reg = Reg::Phys(PhysReg::ZERO);

    /// Dense index: physical registers first, then virtual registers.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Reg::Phys(p) => p.index(),
            Reg::Virt(v) => 32 + v as usize,
        }
    }

    /// Inverse of [`Reg::index`].
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        match PhysReg::from_index(index) {
            Some(p) => Reg::Phys(p),
            None => Reg::Virt(u32::try_from(index - 32).unwrap_or(u32::MAX)),
        }
    }

    /// Returns `true` for virtual registers.
    #[must_use]
    pub fn is_virtual(self) -> bool {
        matches!(self, Reg::Virt(_))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Phys(p) => write!(f, "{p}"),
            Reg::Virt(v) => write!(f, "%v{v}"),
        }
    }
}

/// Handle of a machine block within its function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MBlockId(pub usize);

/// Memory access width.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Width {
    /// `lb`/`sb`
    Byte,
    /// `lw`/`sw`
    Word,
}

/// A stack location, resolved to an `sp` offset by the [`Frame`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum StackSlot {
    /// Stack object of an `alloca`.
    Local(usize),
    /// Spill slot of a virtual register.
    Spill(usize),
    /// Parameter passed on the stack by the caller (index past the registers).
    IncomingArg(usize),
    /// Argument this function passes on the stack (index past the registers).
    OutgoingArg(usize),
    /// Saved return address.
    ReturnAddress,
}

/// A memory operand.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Address {
    /// `offset(base)`
    Base { base: Reg, offset: i32 },
    /// `%lo(symbol)(base)` where `base` holds `%hi(symbol)`.
    Global { base: Reg, symbol: String },
    /// `offset(sp)` relative to a stack slot.
    Frame { slot: StackSlot, offset: i32 },
}

impl Address {
    fn base_mut(&mut self) -> Option<&mut Reg> {
        match self {
            Address::Base { base, .. } | Address::Global { base, .. } => Some(base),
            Address::Frame { .. } => None,
        }
    }

    fn base(&self) -> Option<Reg> {
        match self {
            Address::Base { base, .. } | Address::Global { base, .. } => Some(*base),
            Address::Frame { .. } => None,
        }
    }
}

/// Register-register ALU operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Sll,
    Sra,
    And,
    Or,
    Xor,
    Slt,
}

/// Register-immediate ALU operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AluImmOp {
    Addi,
    Slli,
    Srai,
    Andi,
    Ori,
    Xori,
    Slti,
}

/// Compare-and-branch conditions.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BranchOp {
    Beq,
    Bne,
    Blt,
    Bge,
}

/// Immediate operand of an I-type instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Imm {
    /// A 12-bit signed constant.
    Int(i32),
    /// `%lo(symbol)`
    Lo(String),
}

impl fmt::Display for Imm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imm::Int(v) => write!(f, "{v}"),
            Imm::Lo(sym) => write!(f, "%lo({sym})"),
        }
    }
}

/// Returns `true` if `value` fits a 12-bit signed immediate.
#[must_use]
pub fn is_imm12(value: i32) -> bool {
    (-2048..=2047).contains(&value)
}

/// A machine instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MInst {
    /// `li rd, imm`
    Li { rd: Reg, imm: i32 },
    /// `lui rd, %hi(symbol)`
    LuiHi { rd: Reg, symbol: String },
    /// `mv rd, rs`
    Mv { rd: Reg, rs: Reg },
    /// `op rd, rs1, rs2`
    Alu {
        op: AluOp,
        rd: Reg,
        rs1: Reg,
        rs2: Reg,
    },
    /// `op rd, rs1, imm`
    AluImm {
        op: AluImmOp,
        rd: Reg,
        rs1: Reg,
        imm: Imm,
    },
    /// `seqz rd, rs`
    Seqz { rd: Reg, rs: Reg },
    /// `snez rd, rs`
    Snez { rd: Reg, rs: Reg },
    /// `lw`/`lb rd, addr`
    Load { width: Width, rd: Reg, addr: Address },
    /// `sw`/`sb rs, addr`
    Store { width: Width, rs: Reg, addr: Address },
    /// `addi rd, sp, <slot offset>`
    FrameAddr { rd: Reg, slot: StackSlot },
    /// `op rs1, rs2, target`
    Branch {
        op: BranchOp,
        rs1: Reg,
        rs2: Reg,
        target: MBlockId,
    },
    /// `j target`
    Jump { target: MBlockId },
    /// `call callee`, with `args` values placed in argument registers.
    Call { callee: String, args: usize },
    /// `ret`, optionally returning `a0`.
    Ret { value: bool },
}

impl MInst {
    /// Registers read by this instruction, implicit ones included.
    #[must_use]
    pub fn uses(&self, rf: &RegisterFile) -> Vec<Reg> {
        match self {
            MInst::Li { .. } | MInst::LuiHi { .. } | MInst::FrameAddr { .. } | MInst::Jump { .. } => {
                Vec::new()
            }
            MInst::Mv { rs, .. } | MInst::Seqz { rs, .. } | MInst::Snez { rs, .. } => vec![*rs],
            MInst::Alu { rs1, rs2, .. } | MInst::Branch { rs1, rs2, .. } => vec![*rs1, *rs2],
            MInst::AluImm { rs1, .. } => vec![*rs1],
            MInst::Load { addr, .. } => addr.base().into_iter().collect(),
            MInst::Store { rs, addr, .. } => {
                let mut uses = vec![*rs];
                uses.extend(addr.base());
                uses
            }
            MInst::Call { args, .. } => (0..(*args).min(ARG_REGS))
                .filter_map(PhysReg::arg)
                .map(Reg::Phys)
                .collect(),
            MInst::Ret { value } => {
                let mut uses = vec![Reg::Phys(PhysReg::RA)];
                if *value {
                    uses.push(Reg::Phys(PhysReg::A0));
                }
                uses.extend(rf.callee_saved().iter().copied().map(Reg::Phys));
                uses
            }
        }
    }

    /// Registers written by this instruction, implicit ones included.
    #[must_use]
    pub fn defs(&self, rf: &RegisterFile) -> Vec<Reg> {
        match self {
            MInst::Li { rd, .. }
            | MInst::LuiHi { rd, .. }
            | MInst::Mv { rd, .. }
            | MInst::Alu { rd, .. }
            | MInst::AluImm { rd, .. }
            | MInst::Seqz { rd, .. }
            | MInst::Snez { rd, .. }
            | MInst::Load { rd, .. }
            | MInst::FrameAddr { rd, .. } => vec![*rd],
            MInst::Call { .. } => rf.caller_saved().iter().copied().map(Reg::Phys).collect(),
            MInst::Store { .. } | MInst::Branch { .. } | MInst::Jump { .. } | MInst::Ret { .. } => {
                Vec::new()
            }
        }
    }

    /// Applies `f` to every explicit register operand, reads and writes alike.
    pub fn for_each_reg_mut(&mut self, mut f: impl FnMut(&mut Reg)) {
        match self {
            MInst::Li { rd, .. } | MInst::LuiHi { rd, .. } | MInst::FrameAddr { rd, .. } => f(rd),
            MInst::Mv { rd, rs } | MInst::Seqz { rd, rs } | MInst::Snez { rd, rs } => {
                f(rd);
                f(rs);
            }
            MInst::Alu { rd, rs1, rs2, .. } => {
                f(rd);
                f(rs1);
                f(rs2);
            }
            MInst::AluImm { rd, rs1, .. } => {
                f(rd);
                f(rs1);
            }
            MInst::Load { rd, addr, .. } => {
                f(rd);
                if let Some(base) = addr.base_mut() {
                    f(base);
                }
            }
            MInst::Store { rs, addr, .. } => {
                f(rs);
                if let Some(base) = addr.base_mut() {
                    f(base);
                }
            }
            MInst::Branch { rs1, rs2, .. } => {
                f(rs1);
                f(rs2);
            }
            MInst::Jump { .. } | MInst::Call { .. } | MInst::Ret { .. } => {}
        }
    }

    /// Rewrites explicit reads of `from` into `to`.
    pub fn replace_use(&mut self, from: Reg, to: Reg) {
        let rd = self.explicit_def();
        self.for_each_reg_mut(|r| {
            if *r == from {
                *r = to;
            }
        });
        // Undo the rename of the destination.
        if rd == Some(from) {
            self.set_explicit_def(from);
        }
    }

    /// Rewrites the explicit destination `from` into `to`.
    pub fn replace_def(&mut self, from: Reg, to: Reg) {
        if self.explicit_def() == Some(from) {
            self.set_explicit_def(to);
        }
    }

    /// The destination register named in the instruction text.
    #[must_use]
    pub fn explicit_def(&self) -> Option<Reg> {
        match self {
            MInst::Li { rd, .. }
            | MInst::LuiHi { rd, .. }
            | MInst::Mv { rd, .. }
            | MInst::Alu { rd, .. }
            | MInst::AluImm { rd, .. }
            | MInst::Seqz { rd, .. }
            | MInst::Snez { rd, .. }
            | MInst::Load { rd, .. }
            | MInst::FrameAddr { rd, .. } => Some(*rd),
            _ => None,
        }
    }

    fn set_explicit_def(&mut self, reg: Reg) {
        match self {
            MInst::Li { rd, .. }
            | MInst::LuiHi { rd, .. }
            | MInst::Mv { rd, .. }
            | MInst::Alu { rd, .. }
            | MInst::AluImm { rd, .. }
            | MInst::Seqz { rd, .. }
            | MInst::Snez { rd, .. }
            | MInst::Load { rd, .. }
            | MInst::FrameAddr { rd, .. } => *rd = reg,
            _ => {}
        }
    }

    /// `(dest, src)` of a register-to-register move.
    #[must_use]
    pub fn as_move(&self) -> Option<(Reg, Reg)> {
        match self {
            MInst::Mv { rd, rs } => Some((*rd, *rs)),
            _ => None,
        }
    }

    /// Blocks this instruction may transfer control to.
    #[must_use]
    pub fn target(&self) -> Option<MBlockId> {
        match self {
            MInst::Branch { target, .. } | MInst::Jump { target } => Some(*target),
            _ => None,
        }
    }

    /// Returns `true` if control never falls through this instruction.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(self, MInst::Jump { .. } | MInst::Ret { .. })
    }
}

/// A machine basic block.
#[derive(Debug, Clone)]
pub struct MBlock {
    /// Assembly label.
    pub label: String,
    /// Instructions in order.
    pub insts: Vec<MInst>,
    /// Successors, derived from the branch instructions.
    pub succs: Vec<MBlockId>,
    /// Predecessors.
    pub preds: Vec<MBlockId>,
    /// Loop nesting depth of the IR block this block was selected from.
    pub loop_depth: u32,
}

impl MBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new(label: impl Into<String>, loop_depth: u32) -> Self {
        Self {
            label: label.into(),
            insts: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
            loop_depth,
        }
    }
}

/// A function in machine IR.
#[derive(Debug, Clone)]
pub struct MFunction {
    /// Symbol name.
    pub name: String,
    /// Blocks in layout order; the first block is the entry.
    pub blocks: Vec<MBlock>,
    /// Stack frame description.
    pub frame: Frame,
    vreg_count: u32,
}

impl MFunction {
    /// Creates a function without blocks.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            frame: Frame::default(),
            vreg_count: 0,
        }
    }

    /// Allocates a fresh virtual register.
    pub fn new_vreg(&mut self) -> Reg {
        let reg = Reg::Virt(self.vreg_count);
        self.vreg_count += 1;
        reg
    }

    /// Number of virtual registers allocated so far.
    #[must_use]
    pub fn vreg_count(&self) -> u32 {
        self.vreg_count
    }

    /// Size of the dense register index space.
    #[must_use]
    pub fn reg_space(&self) -> usize {
        32 + self.vreg_count as usize
    }

    /// Recomputes successor and predecessor lists from the instructions.
    ///
    /// A block without a trailing jump or return falls through to the next
    /// block in layout order.
    pub fn compute_cfg(&mut self) {
        let count = self.blocks.len();
        for index in 0..count {
            let block = &self.blocks[index];
            let mut succs: Vec<MBlockId> = block.insts.iter().filter_map(MInst::target).collect();
            let falls_through = !block.insts.last().is_some_and(MInst::is_terminator);
            if falls_through && index + 1 < count {
                succs.push(MBlockId(index + 1));
            }
            succs.dedup();
            self.blocks[index].succs = succs;
            self.blocks[index].preds.clear();
        }
        for index in 0..count {
            for succ in self.blocks[index].succs.clone() {
                let preds = &mut self.blocks[succ.0].preds;
                if !preds.contains(&MBlockId(index)) {
                    preds.push(MBlockId(index));
                }
            }
        }
    }

    /// Total number of instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Virtual registers still mentioned by some instruction.
    #[must_use]
    pub fn virtual_regs(&self) -> Vec<Reg> {
        let mut regs = Vec::new();
        for block in &self.blocks {
            for inst in &block.insts {
                let mut inst = inst.clone();
                inst.for_each_reg_mut(|r| {
                    if r.is_virtual() && !regs.contains(r) {
                        regs.push(*r);
                    }
                });
            }
        }
        regs
    }
}
