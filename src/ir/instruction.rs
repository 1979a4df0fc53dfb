//! IR instructions.
//!
//! Instructions are a single sum type, [`Inst`]. Every pass pattern-matches over it
//! directly; there is no visitor layer. Each variant names its destination register
//! (if any) and its operands explicitly so that def/use information can be derived
//! without side tables.
//!
//! # Conventions
//!
//! - `dest` is the register defined by the instruction
//! - `lhs`/`rhs` are binary operands
//! - `ptr` is the address operand of memory instructions
//! - `then_bb`/`else_bb`/`target` are branch targets
//! - phi operands are `(value, predecessor)` pairs; their order carries no meaning

use std::fmt;

use strum::{Display, EnumIter};

use crate::ir::{BlockId, FuncId, IrType, Operand, RegId};

/// Integer binary operators. Arithmetic wraps on 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Signed division.
    SDiv,
    /// Signed remainder.
    SRem,
    /// Left shift.
    Shl,
    /// Arithmetic right shift.
    AShr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

impl BinaryOp {
    /// Returns `true` when `a op b == b op a`.
    #[must_use]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
        )
    }

    /// Returns `true` for operators that trap on a zero divisor.
    #[must_use]
    pub fn may_trap(self) -> bool {
        matches!(self, BinaryOp::SDiv | BinaryOp::SRem)
    }

    /// Folds the operator over two constants with 32-bit wrapping semantics.
    ///
    /// Division and remainder by zero are not folded and return `None`. Shift
    /// amounts are taken modulo 32 as on the target.
    #[must_use]
    pub fn fold(self, lhs: i32, rhs: i32) -> Option<i32> {
        let value = match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::SDiv => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            BinaryOp::SRem => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            BinaryOp::Shl => lhs.wrapping_shl(rhs as u32),
            BinaryOp::AShr => lhs.wrapping_shr(rhs as u32),
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
        };
        Some(value)
    }
}

/// Signed integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum IcmpCond {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Signed greater than.
    Sgt,
    /// Signed greater or equal.
    Sge,
    /// Signed less than.
    Slt,
    /// Signed less or equal.
    Sle,
}

impl IcmpCond {
    /// The predicate that gives the same result with swapped operands.
    ///
    /// `sgt(a, b) == slt(b, a)`; equality predicates are symmetric.
    #[must_use]
    pub fn mirrored(self) -> Self {
        match self {
            IcmpCond::Eq => IcmpCond::Eq,
            IcmpCond::Ne => IcmpCond::Ne,
            IcmpCond::Sgt => IcmpCond::Slt,
            IcmpCond::Sge => IcmpCond::Sle,
            IcmpCond::Slt => IcmpCond::Sgt,
            IcmpCond::Sle => IcmpCond::Sge,
        }
    }

    /// The logical negation of the predicate.
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            IcmpCond::Eq => IcmpCond::Ne,
            IcmpCond::Ne => IcmpCond::Eq,
            IcmpCond::Sgt => IcmpCond::Sle,
            IcmpCond::Sge => IcmpCond::Slt,
            IcmpCond::Slt => IcmpCond::Sge,
            IcmpCond::Sle => IcmpCond::Sgt,
        }
    }

    /// Evaluates the predicate on two constants.
    #[must_use]
    pub fn fold(self, lhs: i32, rhs: i32) -> bool {
        match self {
            IcmpCond::Eq => lhs == rhs,
            IcmpCond::Ne => lhs != rhs,
            IcmpCond::Sgt => lhs > rhs,
            IcmpCond::Sge => lhs >= rhs,
            IcmpCond::Slt => lhs < rhs,
            IcmpCond::Sle => lhs <= rhs,
        }
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// `dest = op lhs, rhs`
    Binary {
        op: BinaryOp,
        dest: RegId,
        lhs: Operand,
        rhs: Operand,
    },
    /// `dest = icmp cond lhs, rhs`
    Icmp {
        cond: IcmpCond,
        dest: RegId,
        lhs: Operand,
        rhs: Operand,
    },
    /// `dest = load ptr`
    Load { dest: RegId, ptr: Operand },
    /// `store value, ptr`
    Store { value: Operand, ptr: Operand },
    /// `dest = alloca ty`, a stack slot in the entry block.
    Alloca { dest: RegId, ty: IrType },
    /// `dest = getelementptr ptr, indices...`
    Gep {
        dest: RegId,
        ptr: Operand,
        indices: Vec<Operand>,
    },
    /// `dest = bitcast src`
    BitCast { dest: RegId, src: Operand },
    /// `dest = phi [value, pred]...`
    Phi {
        dest: RegId,
        incoming: Vec<(Operand, BlockId)>,
    },
    /// `dest = call callee(args...)`
    Call {
        dest: Option<RegId>,
        callee: FuncId,
        args: Vec<Operand>,
    },
    /// `br cond, then_bb, else_bb`
    Branch {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    /// `br target`
    Jump { target: BlockId },
    /// `ret value`
    Return { value: Option<Operand> },
    /// `dest = move src`, produced by copy sequentialization.
    Move { dest: RegId, src: Operand },
    /// Simultaneous copies produced by phi elimination.
    ParallelCopy { moves: Vec<(RegId, Operand)> },
}

impl Inst {
    /// The register defined by this instruction.
    ///
    /// Parallel copies define several registers; use [`Inst::defs`] for them.
    #[must_use]
    pub fn def(&self) -> Option<RegId> {
        match self {
            Inst::Binary { dest, .. }
            | Inst::Icmp { dest, .. }
            | Inst::Load { dest, .. }
            | Inst::Alloca { dest, .. }
            | Inst::Gep { dest, .. }
            | Inst::BitCast { dest, .. }
            | Inst::Phi { dest, .. }
            | Inst::Move { dest, .. } => Some(*dest),
            Inst::Call { dest, .. } => *dest,
            Inst::Store { .. }
            | Inst::Branch { .. }
            | Inst::Jump { .. }
            | Inst::Return { .. }
            | Inst::ParallelCopy { .. } => None,
        }
    }

    /// All registers defined by this instruction.
    #[must_use]
    pub fn defs(&self) -> Vec<RegId> {
        match self {
            Inst::ParallelCopy { moves } => moves.iter().map(|(d, _)| *d).collect(),
            other => other.def().into_iter().collect(),
        }
    }

    /// All operands read by this instruction, in a fixed order.
    #[must_use]
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Inst::Binary { lhs, rhs, .. } | Inst::Icmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Load { ptr, .. } => vec![*ptr],
            Inst::Store { value, ptr } => vec![*value, *ptr],
            Inst::Alloca { .. } | Inst::Jump { .. } => Vec::new(),
            Inst::Gep { ptr, indices, .. } => {
                let mut ops = Vec::with_capacity(indices.len() + 1);
                ops.push(*ptr);
                ops.extend(indices.iter().copied());
                ops
            }
            Inst::BitCast { src, .. } | Inst::Move { src, .. } => vec![*src],
            Inst::Phi { incoming, .. } => incoming.iter().map(|(v, _)| *v).collect(),
            Inst::Call { args, .. } => args.clone(),
            Inst::Branch { cond, .. } => vec![*cond],
            Inst::Return { value } => value.iter().copied().collect(),
            Inst::ParallelCopy { moves } => moves.iter().map(|(_, s)| *s).collect(),
        }
    }

    /// Mutable references to every operand read by this instruction.
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Inst::Binary { lhs, rhs, .. } | Inst::Icmp { lhs, rhs, .. } => vec![lhs, rhs],
            Inst::Load { ptr, .. } => vec![ptr],
            Inst::Store { value, ptr } => vec![value, ptr],
            Inst::Alloca { .. } | Inst::Jump { .. } => Vec::new(),
            Inst::Gep { ptr, indices, .. } => {
                let mut ops = Vec::with_capacity(indices.len() + 1);
                ops.push(ptr);
                ops.extend(indices.iter_mut());
                ops
            }
            Inst::BitCast { src, .. } | Inst::Move { src, .. } => vec![src],
            Inst::Phi { incoming, .. } => incoming.iter_mut().map(|(v, _)| v).collect(),
            Inst::Call { args, .. } => args.iter_mut().collect(),
            Inst::Branch { cond, .. } => vec![cond],
            Inst::Return { value } => value.iter_mut().collect(),
            Inst::ParallelCopy { moves } => moves.iter_mut().map(|(_, s)| s).collect(),
        }
    }

    /// Replaces every read of `from` with `to`. Returns `true` if anything changed.
    pub fn replace_operand(&mut self, from: Operand, to: Operand) -> bool {
        let mut changed = false;
        for op in self.operands_mut() {
            if *op == from {
                *op = to;
                changed = true;
            }
        }
        changed
    }

    /// Registers read by this instruction.
    #[must_use]
    pub fn used_regs(&self) -> Vec<RegId> {
        self.operands()
            .into_iter()
            .filter_map(Operand::as_reg)
            .collect()
    }

    /// Returns `true` for `br` and `ret`.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Branch { .. } | Inst::Jump { .. } | Inst::Return { .. }
        )
    }

    /// Returns `true` for phi instructions.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        matches!(self, Inst::Phi { .. })
    }

    /// Successor blocks named by a terminator, without duplicates.
    #[must_use]
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Inst::Branch {
                then_bb, else_bb, ..
            } => {
                if then_bb == else_bb {
                    vec![*then_bb]
                } else {
                    vec![*then_bb, *else_bb]
                }
            }
            Inst::Jump { target } => vec![*target],
            _ => Vec::new(),
        }
    }

    /// Rewrites branch targets equal to `from` into `to`.
    pub fn replace_target(&mut self, from: BlockId, to: BlockId) -> bool {
        let mut changed = false;
        match self {
            Inst::Branch {
                then_bb, else_bb, ..
            } => {
                if *then_bb == from {
                    *then_bb = to;
                    changed = true;
                }
                if *else_bb == from {
                    *else_bb = to;
                    changed = true;
                }
            }
            Inst::Jump { target } if *target == from => {
                *target = to;
                changed = true;
            }
            _ => {}
        }
        changed
    }

    /// Short opcode mnemonic, used in events and the printer.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Inst::Binary { .. } => "binary",
            Inst::Icmp { .. } => "icmp",
            Inst::Load { .. } => "load",
            Inst::Store { .. } => "store",
            Inst::Alloca { .. } => "alloca",
            Inst::Gep { .. } => "getelementptr",
            Inst::BitCast { .. } => "bitcast",
            Inst::Phi { .. } => "phi",
            Inst::Call { .. } => "call",
            Inst::Branch { .. } | Inst::Jump { .. } => "br",
            Inst::Return { .. } => "ret",
            Inst::Move { .. } => "move",
            Inst::ParallelCopy { .. } => "parallel_copy",
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}
