//! Instruction combining.
//!
//! A worklist of binary operations, comparisons, phis and branches is
//! rewritten with local algebraic identities. Whenever an instruction changes,
//! its users are queued again so that rewrites cascade.
//!
//! # Rewrites
//!
//! | Pattern                         | Result          |
//! |---------------------------------|-----------------|
//! | `c op x` (commutative, `c` constant) | `x op c`   |
//! | `(x op a) op b` (add, mul, and, or, xor) | `x op (a op b)` |
//! | `x + 0`, `x - 0`, `x * 1`, `x / 1`, `x << 0` | `x` |
//! | `x * 0`, `0 / x`, `x % 1`, `x - x`, `0 << x` | `0` |
//! | `x + x`                         | `x << 1`        |
//! | `x * 2^k`                       | `x << k`        |
//! | `x * -1`, `x / -1`              | `0 - x`         |
//! | `x + (0 - y)`, `x - (0 - y)`    | `x - y`, `x + y` |
//! | `(a - b) + b`, `(a + b) - b`    | `a`             |
//! | `(x << a) << b`                 | `x << (a + b)`  |
//! | `c < x` (constant on the left)  | `x > c`         |
//! | `br (xor c, true), t, f`        | `br c, f, t`    |
//! | `phi [v, ..], [v, ..]`          | `v`             |
//!
//! Bitwise identities are only applied to 32-bit integers; boolean `and`,
//! `or` and `xor` keep their shape so that the branch rule can match them.

use std::collections::{BTreeSet, VecDeque};

use crate::{
    compiler::{
        context::CompilerContext, pass::SsaPass, passes::utils::trivial_phi_value, EventKind,
    },
    ir::{BinaryOp, Constant, FuncId, Function, Inst, InstId, IrType, Module, Operand, RegId},
    Result,
};

/// Outcome of combining a binary operation.
enum Combined {
    /// The result equals an existing operand.
    Value(Operand),
    /// The instruction is replaced by a simpler binary operation.
    Binary(BinaryOp, Operand, Operand),
}

/// Algebraic simplification of arithmetic, comparisons and branches.
pub struct InstructionCombiningPass;

impl Default for InstructionCombiningPass {
    fn default() -> Self {
        Self::new()
    }
}

/// `(op, lhs, rhs)` of the binary operation defining `op`, if any.
fn binary_def(func: &Function, op: Operand) -> Option<(BinaryOp, Operand, Operand)> {
    let def = func.reg_def(op.as_reg()?)?;
    match *func.inst(def) {
        Inst::Binary { op, lhs, rhs, .. } => Some((op, lhs, rhs)),
        _ => None,
    }
}

/// `y` if `op` is defined as `0 - y`.
fn negated(func: &Function, op: Operand) -> Option<Operand> {
    match binary_def(func, op)? {
        (BinaryOp::Sub, lhs, rhs) if lhs == Operand::int(0) => Some(rhs),
        _ => None,
    }
}

fn is_int(op: Operand, value: i32) -> bool {
    op == Operand::int(value)
}

/// Exponent `k` if `value == 2^k` with `k > 0`.
fn power_of_two(value: i32) -> Option<i32> {
    (value > 1 && value.count_ones() == 1).then(|| value.trailing_zeros() as i32)
}

impl InstructionCombiningPass {
    /// Creates a new instruction combining pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Places a constant operand of a commutative operation on the right and
    /// merges it with the constant of a same-operator left operand.
    fn canonicalize(
        func: &Function,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    ) -> Option<(Operand, Operand)> {
        if !op.is_commutative() {
            return None;
        }
        let (lhs, rhs, swapped) = if lhs.is_const() && !rhs.is_const() {
            (rhs, lhs, true)
        } else {
            (lhs, rhs, false)
        };
        if let Some(b) = rhs.as_const().and_then(|_| rhs.as_int()) {
            if let Some((inner, x, a)) = binary_def(func, lhs) {
                if inner == op && !x.is_const() {
                    if let Some(merged) = a.as_int().and_then(|a| op.fold(a, b)) {
                        return Some((x, Operand::int(merged)));
                    }
                }
            }
        }
        swapped.then_some((lhs, rhs))
    }

    fn combine_add(func: &Function, lhs: Operand, rhs: Operand) -> Option<Combined> {
        if lhs == rhs {
            return Some(Combined::Binary(BinaryOp::Shl, lhs, Operand::int(1)));
        }
        if is_int(rhs, 0) {
            return Some(Combined::Value(lhs));
        }
        if let Some(y) = negated(func, rhs) {
            return Some(Combined::Binary(BinaryOp::Sub, lhs, y));
        }
        if let Some(x) = negated(func, lhs) {
            return Some(Combined::Binary(BinaryOp::Sub, rhs, x));
        }
        if let Some((BinaryOp::Sub, a, b)) = binary_def(func, lhs) {
            if b == rhs {
                return Some(Combined::Value(a));
            }
        }
        if let Some((BinaryOp::Sub, b, c)) = binary_def(func, rhs) {
            if c == lhs {
                return Some(Combined::Value(b));
            }
        }
        None
    }

    fn combine_sub(func: &Function, lhs: Operand, rhs: Operand) -> Option<Combined> {
        if lhs == rhs {
            return Some(Combined::Value(Operand::int(0)));
        }
        if is_int(rhs, 0) {
            return Some(Combined::Value(lhs));
        }
        if let (Some(x), Some(y)) = (negated(func, lhs), negated(func, rhs)) {
            return Some(Combined::Binary(BinaryOp::Sub, y, x));
        }
        if let Some(y) = negated(func, rhs) {
            return Some(Combined::Binary(BinaryOp::Add, lhs, y));
        }
        if is_int(lhs, 0) {
            if let Some((BinaryOp::Sub, a, b)) = binary_def(func, rhs) {
                return Some(Combined::Binary(BinaryOp::Sub, b, a));
            }
        }
        if let Some((BinaryOp::Add, a, b)) = binary_def(func, lhs) {
            if a == rhs {
                return Some(Combined::Value(b));
            }
            if b == rhs {
                return Some(Combined::Value(a));
            }
        }
        if let Some((BinaryOp::Sub, a, c)) = binary_def(func, rhs) {
            if a == lhs {
                return Some(Combined::Value(c));
            }
        }
        None
    }

    fn combine_mul(lhs: Operand, rhs: Operand) -> Option<Combined> {
        match rhs.as_int()? {
            0 => Some(Combined::Value(Operand::int(0))),
            1 => Some(Combined::Value(lhs)),
            -1 => Some(Combined::Binary(BinaryOp::Sub, Operand::int(0), lhs)),
            value => power_of_two(value)
                .map(|k| Combined::Binary(BinaryOp::Shl, lhs, Operand::int(k))),
        }
    }

    fn combine_shift(func: &Function, op: BinaryOp, lhs: Operand, rhs: Operand) -> Option<Combined> {
        if is_int(lhs, 0) {
            return Some(Combined::Value(Operand::int(0)));
        }
        if is_int(rhs, 0) {
            return Some(Combined::Value(lhs));
        }
        let b = rhs.as_int()?;
        match binary_def(func, lhs)? {
            (inner, x, a) if inner == op => {
                let total = a.as_int()?.checked_add(b)?;
                (0..32)
                    .contains(&total)
                    .then(|| Combined::Binary(op, x, Operand::int(total)))
            }
            (BinaryOp::Mul, x, a) if op == BinaryOp::Shl => {
                let factor = a.as_int()?.checked_shl(u32::try_from(b).ok()?)?;
                Some(Combined::Binary(BinaryOp::Mul, x, Operand::int(factor)))
            }
            _ => None,
        }
    }

    fn combine_bitwise(op: BinaryOp, lhs: Operand, rhs: Operand) -> Option<Combined> {
        match op {
            BinaryOp::And if is_int(rhs, 0) => Some(Combined::Value(Operand::int(0))),
            BinaryOp::And if is_int(rhs, -1) || lhs == rhs => Some(Combined::Value(lhs)),
            BinaryOp::Or if is_int(rhs, 0) || lhs == rhs => Some(Combined::Value(lhs)),
            BinaryOp::Or if is_int(rhs, -1) => Some(Combined::Value(Operand::int(-1))),
            BinaryOp::Xor if is_int(rhs, 0) => Some(Combined::Value(lhs)),
            BinaryOp::Xor if lhs == rhs => Some(Combined::Value(Operand::int(0))),
            _ => None,
        }
    }

    /// Simplification of `dest = op lhs, rhs`, if one applies.
    fn combine_binary(
        func: &Function,
        dest: RegId,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    ) -> Option<Combined> {
        let boolean = matches!(func.reg_ty(dest), IrType::I1);
        if boolean {
            return None;
        }
        if let Some((l, r)) = Self::canonicalize(func, op, lhs, rhs) {
            return Some(Combined::Binary(op, l, r));
        }
        match op {
            BinaryOp::Add => Self::combine_add(func, lhs, rhs),
            BinaryOp::Sub => Self::combine_sub(func, lhs, rhs),
            BinaryOp::Mul => Self::combine_mul(lhs, rhs),
            BinaryOp::SDiv => {
                if is_int(lhs, 0) {
                    Some(Combined::Value(Operand::int(0)))
                } else if is_int(rhs, 1) {
                    Some(Combined::Value(lhs))
                } else if is_int(rhs, -1) {
                    Some(Combined::Binary(BinaryOp::Sub, Operand::int(0), lhs))
                } else {
                    None
                }
            }
            BinaryOp::SRem => (is_int(lhs, 0) || is_int(rhs, 1) || is_int(rhs, -1))
                .then_some(Combined::Value(Operand::int(0))),
            BinaryOp::Shl | BinaryOp::AShr => Self::combine_shift(func, op, lhs, rhs),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => Self::combine_bitwise(op, lhs, rhs),
        }
    }

    /// Instructions reading `reg`.
    fn users(func: &Function, reg: RegId) -> Vec<InstId> {
        func.instructions()
            .map(|(_, i)| i)
            .filter(|&i| func.inst(i).used_regs().contains(&reg))
            .collect()
    }

    /// Rewrites one instruction. Returns the register whose users should be
    /// revisited, or `None` if nothing changed.
    fn combine(func: &mut Function, inst: InstId, ctx: &CompilerContext) -> Option<Option<RegId>> {
        let block = func.inst_block(inst)?;
        match func.inst(inst).clone() {
            Inst::Binary { op, dest, lhs, rhs } => {
                match Self::combine_binary(func, dest, op, lhs, rhs)? {
                    Combined::Value(value) => {
                        func.replace_all_uses(Operand::Reg(dest), value);
                        func.remove_inst(inst);
                    }
                    Combined::Binary(op, lhs, rhs) => {
                        *func.inst_mut(inst) = Inst::Binary { op, dest, lhs, rhs };
                    }
                }
                ctx.events
                    .record(EventKind::InstructionCombined)
                    .at(func.name(), block.index())
                    .message(format!("simplified {op} into {}", func.reg_name(dest)));
                Some(Some(dest))
            }
            Inst::Icmp {
                cond,
                dest,
                lhs,
                rhs,
            } if lhs.is_const() && !rhs.is_const() => {
                *func.inst_mut(inst) = Inst::Icmp {
                    cond: cond.mirrored(),
                    dest,
                    lhs: rhs,
                    rhs: lhs,
                };
                ctx.events
                    .record(EventKind::InstructionCombined)
                    .at(func.name(), block.index())
                    .message(format!("constant moved right in {}", func.reg_name(dest)));
                Some(Some(dest))
            }
            Inst::Branch {
                cond,
                then_bb,
                else_bb,
            } => {
                let (BinaryOp::Xor, inner, flip) = binary_def(func, cond)? else {
                    return None;
                };
                if flip != Operand::Const(Constant::Bool(true)) {
                    return None;
                }
                func.set_terminator(
                    block,
                    Inst::Branch {
                        cond: inner,
                        then_bb: else_bb,
                        else_bb: then_bb,
                    },
                );
                ctx.events
                    .record(EventKind::InstructionCombined)
                    .at(func.name(), block.index())
                    .message("negated branch condition folded into targets");
                Some(None)
            }
            Inst::Phi { dest, .. } => {
                let value = trivial_phi_value(func, inst)?;
                func.replace_all_uses(Operand::Reg(dest), value);
                func.remove_inst(inst);
                ctx.events
                    .record(EventKind::PhiSimplified)
                    .at(func.name(), block.index())
                    .message(format!("{} has a single value", func.reg_name(dest)));
                Some(Some(dest))
            }
            _ => None,
        }
    }
}

impl SsaPass for InstructionCombiningPass {
    fn name(&self) -> &'static str {
        "instruction-combining"
    }

    fn description(&self) -> &'static str {
        "Simplifies instructions with algebraic identities"
    }

    fn run_on_function(
        &self,
        func: &mut Function,
        _id: FuncId,
        _module: &Module,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let mut queue: VecDeque<InstId> = func
            .instructions()
            .filter(|(_, i)| {
                matches!(
                    func.inst(*i),
                    Inst::Binary { .. } | Inst::Icmp { .. } | Inst::Branch { .. } | Inst::Phi { .. }
                )
            })
            .map(|(_, i)| i)
            .collect();
        let mut queued: BTreeSet<InstId> = queue.iter().copied().collect();
        let limit = func.instruction_count().saturating_mul(ctx.config.max_pass_iterations);

        let mut changes = 0;
        while let Some(inst) = queue.pop_front() {
            queued.remove(&inst);
            let Some(revisit) = Self::combine(func, inst, ctx) else {
                continue;
            };
            changes += 1;
            if changes >= limit {
                log::warn!("instruction-combining: rewrite limit hit in '{}'", func.name());
                break;
            }
            if func.inst_block(inst).is_some() && queued.insert(inst) {
                queue.push_back(inst);
            }
            if let Some(reg) = revisit {
                for user in Self::users(func, reg) {
                    if queued.insert(user) {
                        queue.push_back(user);
                    }
                }
            }
        }
        Ok(changes > 0)
    }
}
