//! Sparse conditional constant propagation.
//!
//! Every register carries a lattice value:
//!
//! ```text
//!        Undefined
//!       /    |    \
//!   Const(c1) ... Const(cn)
//!       \    |    /
//!       Overdefined
//! ```
//!
//! Values only move down. Two worklists drive the analysis: CFG edges that
//! became executable, and registers whose value dropped. An instruction is
//! evaluated only once its block is known to execute, and a phi only joins
//! operands arriving over executable edges. Parameters, loads, calls and
//! addresses are overdefined.
//!
//! Afterwards constant registers are replaced by their value, their
//! definitions deleted, and branches on constants folded. Integer arithmetic
//! wraps at 32 bits; a division or remainder by zero is never folded.

use std::collections::{BTreeSet, VecDeque};

use crate::{
    compiler::{
        context::CompilerContext,
        passes::utils::{fold_constant_branch, remove_unreachable_blocks},
        pass::SsaPass,
        EventKind,
    },
    ir::{BlockId, Constant, FuncId, Function, IcmpCond, Inst, InstId, IrType, Module, Operand, RegId},
    Result,
};

/// Lattice value of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lattice {
    Undefined,
    Const(Constant),
    Overdefined,
}

impl Lattice {
    fn meet(self, other: Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Undefined, x) | (x, Lattice::Undefined) => x,
            (Lattice::Const(a), Lattice::Const(b)) if a == b => self,
            _ => Lattice::Overdefined,
        }
    }
}

/// Analysis state of one function.
struct Solver<'a> {
    func: &'a Function,
    values: Vec<Lattice>,
    executable: Vec<bool>,
    edges: BTreeSet<(BlockId, BlockId)>,
    block_queue: VecDeque<BlockId>,
    reg_queue: VecDeque<RegId>,
    uses: Vec<Vec<InstId>>,
}

impl<'a> Solver<'a> {
    fn new(func: &'a Function) -> Self {
        Self {
            func,
            values: vec![Lattice::Undefined; func.reg_count()],
            executable: vec![false; func.block_capacity()],
            edges: BTreeSet::new(),
            block_queue: VecDeque::new(),
            reg_queue: VecDeque::new(),
            uses: func.uses_map(),
        }
    }

    fn solve(&mut self) {
        let func = self.func;
        let entry = func.entry();
        self.executable[entry.index()] = true;
        self.block_queue.push_back(entry);

        while !self.block_queue.is_empty() || !self.reg_queue.is_empty() {
            while let Some(block) = self.block_queue.pop_front() {
                for &inst in func.block_insts(block) {
                    self.visit(inst);
                }
            }
            while let Some(reg) = self.reg_queue.pop_front() {
                for inst in self.uses[reg.index()].clone() {
                    let live = func
                        .inst_block(inst)
                        .is_some_and(|b| self.executable[b.index()]);
                    if live {
                        self.visit(inst);
                    }
                }
            }
        }
    }

    fn value(&self, op: Operand) -> Lattice {
        match op {
            Operand::Const(c) => Lattice::Const(c),
            Operand::Reg(r) => self.values[r.index()],
            Operand::Param(_) | Operand::Global(_) => Lattice::Overdefined,
        }
    }

    fn lower(&mut self, reg: RegId, value: Lattice) {
        let old = self.values[reg.index()];
        let new = old.meet(value);
        if new != old {
            self.values[reg.index()] = new;
            self.reg_queue.push_back(reg);
        }
    }

    fn mark_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.edges.insert((from, to)) {
            return;
        }
        if self.executable[to.index()] {
            // Only the phis see the new edge.
            let func = self.func;
            for phi in func.phis(to) {
                self.visit(phi);
            }
        } else {
            self.executable[to.index()] = true;
            self.block_queue.push_back(to);
        }
    }

    fn visit(&mut self, inst: InstId) {
        let func = self.func;
        let Some(block) = func.inst_block(inst) else {
            return;
        };
        match func.inst(inst) {
            Inst::Binary { op, dest, lhs, rhs } => {
                let result = match (self.value(*lhs), self.value(*rhs)) {
                    (Lattice::Const(a), Lattice::Const(b)) => {
                        match (constant_int(a), constant_int(b)) {
                            (Some(a), Some(b)) => op
                                .fold(a, b)
                                .map_or(Lattice::Overdefined, |v| {
                                    Lattice::Const(typed(func.reg_ty(*dest), v))
                                }),
                            _ => Lattice::Overdefined,
                        }
                    }
                    (Lattice::Overdefined, _) | (_, Lattice::Overdefined) => Lattice::Overdefined,
                    _ => Lattice::Undefined,
                };
                self.lower(*dest, result);
            }
            Inst::Icmp {
                cond,
                dest,
                lhs,
                rhs,
            } => {
                let result = match (self.value(*lhs), self.value(*rhs)) {
                    (Lattice::Const(a), Lattice::Const(b)) => fold_compare(*cond, a, b)
                        .map_or(Lattice::Overdefined, |v| Lattice::Const(Constant::Bool(v))),
                    (Lattice::Overdefined, _) | (_, Lattice::Overdefined) => Lattice::Overdefined,
                    _ => Lattice::Undefined,
                };
                self.lower(*dest, result);
            }
            Inst::BitCast { dest, src } | Inst::Move { dest, src } => {
                let value = self.value(*src);
                self.lower(*dest, value);
            }
            Inst::Phi { dest, incoming } => {
                let mut result = Lattice::Undefined;
                for (value, pred) in incoming {
                    if self.edges.contains(&(*pred, block)) {
                        result = result.meet(self.value(*value));
                    }
                }
                self.lower(*dest, result);
            }
            Inst::Load { dest, .. } | Inst::Alloca { dest, .. } | Inst::Gep { dest, .. } => {
                self.lower(*dest, Lattice::Overdefined);
            }
            Inst::Call { dest, .. } => {
                if let Some(dest) = dest {
                    self.lower(*dest, Lattice::Overdefined);
                }
            }
            Inst::ParallelCopy { moves } => {
                for (dest, _) in moves {
                    self.lower(*dest, Lattice::Overdefined);
                }
            }
            Inst::Branch {
                cond,
                then_bb,
                else_bb,
            } => {
                let (then_bb, else_bb) = (*then_bb, *else_bb);
                match self.value(*cond) {
                    Lattice::Const(c) => {
                        let target = if constant_int(c).unwrap_or(1) != 0 {
                            then_bb
                        } else {
                            else_bb
                        };
                        self.mark_edge(block, target);
                    }
                    Lattice::Overdefined => {
                        self.mark_edge(block, then_bb);
                        self.mark_edge(block, else_bb);
                    }
                    Lattice::Undefined => {}
                }
            }
            Inst::Jump { target } => {
                let target = *target;
                self.mark_edge(block, target);
            }
            Inst::Store { .. } | Inst::Return { .. } => {}
        }
    }
}

fn constant_int(c: Constant) -> Option<i32> {
    match c {
        Constant::Int(v) => Some(v),
        Constant::Bool(b) => Some(i32::from(b)),
        Constant::Null => None,
    }
}

/// Builds the constant of the destination type from a folded integer.
fn typed(ty: &IrType, value: i32) -> Constant {
    match ty {
        IrType::I1 => Constant::Bool(value != 0),
        _ => Constant::Int(value),
    }
}

fn fold_compare(cond: IcmpCond, a: Constant, b: Constant) -> Option<bool> {
    match (a, b) {
        (Constant::Null, Constant::Null) => match cond {
            IcmpCond::Eq => Some(true),
            IcmpCond::Ne => Some(false),
            _ => None,
        },
        (Constant::Null, _) | (_, Constant::Null) => None,
        (a, b) => Some(cond.fold(constant_int(a)?, constant_int(b)?)),
    }
}

/// Sparse conditional constant propagation pass.
pub struct ConstantPropagationPass;

impl Default for ConstantPropagationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPropagationPass {
    /// Creates a new constant propagation pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SsaPass for ConstantPropagationPass {
    fn name(&self) -> &'static str {
        "sccp"
    }

    fn description(&self) -> &'static str {
        "Propagates constants along executable control flow edges"
    }

    fn run_on_function(
        &self,
        func: &mut Function,
        _id: FuncId,
        _module: &Module,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let constants: Vec<(RegId, Constant)> = {
            let mut solver = Solver::new(func);
            solver.solve();
            solver
                .values
                .iter()
                .enumerate()
                .filter_map(|(index, value)| match value {
                    Lattice::Const(c) => Some((RegId::new(index), *c)),
                    _ => None,
                })
                .filter(|(reg, _)| func.reg_def(*reg).is_some())
                .collect()
        };

        let mut changed = false;
        for (reg, constant) in constants {
            let Some(def) = func.reg_def(reg) else {
                continue;
            };
            let block = func.inst_block(def).map_or(0, BlockId::index);
            func.remove_inst(def);
            func.replace_all_uses(Operand::Reg(reg), Operand::Const(constant));
            ctx.events
                .record(EventKind::ConstantFolded)
                .at(func.name(), block)
                .message(format!("{} = {constant}", func.reg_name(reg)));
            changed = true;
        }

        for block in func.blocks().to_vec() {
            if func.is_live_block(block) {
                changed |= fold_constant_branch(func, block, &ctx.events);
            }
        }
        changed |= remove_unreachable_blocks(func, &ctx.events);
        Ok(changed)
    }
}
