//! Loop Invariant Code Motion (LICM) Pass.
//!
//! This pass moves computations that produce the same value on every iteration
//! out of loops and into the loop preheader.
//!
//! # Algorithm
//!
//! Loops are processed innermost first. Within a loop, an instruction is
//! invariant if:
//!
//! 1. It is not a phi, and every operand is defined outside the loop or by an
//!    instruction already proven invariant
//! 2. It computes a pure value, or it is a load whose address no store in the
//!    loop may alias and the loop calls no function with a side effect
//!
//! Instructions that may trap (division by a non-constant, loads) are only
//! hoisted when their block runs on every iteration that leaves the loop,
//! i.e. it dominates every exiting block.
//!
//! Invariant instructions are moved, in discovery order, to the end of the
//! preheader right before its terminator. Loops without a preheader get one
//! first.
//!
//! # Example
//!
//! ```text
//! // Before LICM                      // After LICM
//! preheader:                          preheader:
//!     jump header                         x = add a, b
//! header:                                 jump header
//!     i = phi [0, preheader], [i2, body]  header:
//!     x = add a, b                        i = phi [0, preheader], [i2, body]
//!     ...                                 ...
//! ```

use std::collections::BTreeSet;

use crate::{
    analysis::{
        Andersen, DominanceInfo, FunctionCfg, LoopForest, LoopInfo, SideEffectChecker,
        SideEffectInfo,
    },
    compiler::{context::CompilerContext, passes::utils::is_pure, pass::SsaPass, EventKind},
    ir::{BlockId, FuncId, Function, Inst, InstId, Module, Operand},
    Result,
};

/// Loop Invariant Code Motion Pass.
///
/// Moves loop-invariant computations to the loop preheader.
#[derive(Default)]
pub struct LicmPass {
    points_to: Option<Andersen>,
    side_effects: Option<SideEffectInfo>,
}

impl LicmPass {
    /// Creates a new LICM pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the memory read through `ptr` stays unchanged while
    /// the loop runs.
    fn load_is_invariant(&self, id: FuncId, func: &Function, info: &LoopInfo, ptr: Operand) -> bool {
        info.body.iter().all(|&block| {
            func.block_insts(block).iter().all(|&inst| match func.inst(inst) {
                Inst::Store { ptr: target, .. } => self
                    .points_to
                    .as_ref()
                    .is_some_and(|pt| !pt.may_alias(id, func, ptr, *target)),
                Inst::Call { callee, .. } => self
                    .side_effects
                    .as_ref()
                    .is_some_and(|info| !info.has_side_effect(*callee)),
                _ => true,
            })
        })
    }

    /// Returns `true` if an operand does not change inside the loop.
    fn operand_is_invariant(
        func: &Function,
        info: &LoopInfo,
        invariant: &BTreeSet<InstId>,
        op: Operand,
    ) -> bool {
        let Operand::Reg(reg) = op else {
            return true;
        };
        match func.reg_def(reg) {
            Some(def) => {
                invariant.contains(&def)
                    || func.inst_block(def).is_some_and(|b| !info.contains(b))
            }
            None => false,
        }
    }

    /// Collects the invariant instructions of a loop in hoisting order.
    fn find_invariants(
        &self,
        id: FuncId,
        func: &Function,
        dom: &DominanceInfo,
        info: &LoopInfo,
        order: &[BlockId],
    ) -> Vec<InstId> {
        let exiting = info.exiting_blocks();
        let mut invariant = BTreeSet::new();
        let mut ordered = Vec::new();

        loop {
            let mut found = false;
            for &block in order.iter().filter(|b| info.contains(**b)) {
                let runs_on_exit =
                    !exiting.is_empty() && exiting.iter().all(|&e| dom.dominates(block, e));
                for &inst in func.block_insts(block) {
                    if invariant.contains(&inst) {
                        continue;
                    }
                    let data = func.inst(inst);
                    let hoistable = match data {
                        Inst::Load { ptr, .. } => {
                            runs_on_exit && self.load_is_invariant(id, func, info, *ptr)
                        }
                        Inst::Binary { op, .. } if op.may_trap() => is_pure(data) || runs_on_exit,
                        other => is_pure(other),
                    };
                    if hoistable
                        && data
                            .operands()
                            .into_iter()
                            .all(|op| Self::operand_is_invariant(func, info, &invariant, op))
                    {
                        invariant.insert(inst);
                        ordered.push(inst);
                        found = true;
                    }
                }
            }
            if !found {
                break;
            }
        }
        ordered
    }
}

impl SsaPass for LicmPass {
    fn name(&self) -> &'static str {
        "licm"
    }

    fn description(&self) -> &'static str {
        "Moves loop-invariant computations to loop preheaders"
    }

    fn initialize(&mut self, module: &Module, _ctx: &CompilerContext) -> Result<()> {
        self.points_to = Some(Andersen::analyze(module));
        self.side_effects = Some(SideEffectChecker::new(true, true).analyze(module));
        Ok(())
    }

    fn run_on_function(
        &self,
        func: &mut Function,
        id: FuncId,
        _module: &Module,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let dom = DominanceInfo::compute(func)?;
        let mut forest = LoopForest::compute(func, &dom);
        if forest.is_empty() {
            return Ok(false);
        }

        let created = forest.ensure_preheaders(func);
        for &block in &created {
            ctx.events
                .record(EventKind::PreheaderInserted)
                .at(func.name(), block.index())
                .message(format!("preheader '{}'", func.block_name(block)));
        }
        let dom = if created.is_empty() {
            dom
        } else {
            DominanceInfo::compute(func)?
        };
        let order = FunctionCfg::new(func).reverse_postorder();

        let mut hoisted = 0;
        for loop_id in forest.postorder() {
            let info = forest.get(loop_id);
            let Some(preheader) = info.preheader else {
                continue;
            };
            for inst in self.find_invariants(id, func, &dom, info, &order) {
                func.move_before_terminator(inst, preheader);
                ctx.events
                    .record(EventKind::InstructionHoisted)
                    .at(func.name(), preheader.index())
                    .message(format!(
                        "{} hoisted out of loop '{}'",
                        func.inst(inst).mnemonic(),
                        func.block_name(info.header)
                    ));
                hoisted += 1;
            }
        }

        if hoisted > 0 {
            log::debug!("licm: hoisted {hoisted} instructions in '{}'", func.name());
        }
        Ok(hoisted > 0 || !created.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::PassScheduler,
        ir::{BinaryOp, FunctionBuilder, GlobalInit, IcmpCond, IrType, Param},
        ssa::{construct_ssa, verify_ssa},
    };

    /// `for (i = 0; i < n; i++) { x = a * b; sum += x; g = sum; }`
    fn counting_loop(module: &mut Module, divisor: Operand) -> (FuncId, BlockId) {
        let g = module.add_global("g", IrType::I32, GlobalInit::Int(0));
        let params = vec![
            Param::new("n", IrType::I32),
            Param::new("a", IrType::I32),
            Param::new("b", IrType::I32),
        ];
        let id = module.declare_function("f", IrType::Void, params);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let i = b.alloca("i", IrType::I32);
        let sum = b.alloca("sum", IrType::I32);
        b.store(Operand::int(0), i);
        b.store(Operand::int(0), sum);
        let header = b.new_block("header");
        let body = b.new_block("body");
        let done = b.new_block("done");
        b.jump(header);

        b.position_at_end(header);
        let iv = b.load(IrType::I32, i);
        let c = b.icmp(IcmpCond::Slt, iv, Operand::Param(0));
        b.branch(c, body, done);

        b.position_at_end(body);
        let x = b.binary(BinaryOp::Mul, Operand::Param(1), Operand::Param(2));
        let q = b.binary(BinaryOp::SDiv, x, divisor);
        let s = b.load(IrType::I32, sum);
        let s2 = b.binary(BinaryOp::Add, s, q);
        b.store(s2, sum);
        b.store(s2, Operand::Global(g));
        let iv2 = b.binary(BinaryOp::Add, iv, Operand::int(1));
        b.store(iv2, i);
        b.jump(header);

        b.position_at_end(done);
        b.ret(None);
        b.finish().unwrap();

        let mut func = module.take_function(id);
        construct_ssa(&mut func, &crate::compiler::EventLog::new()).unwrap();
        module.restore_function(id, func);
        (id, body)
    }

    fn run_licm(module: &mut Module) -> CompilerContext {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(1, 1);
        scheduler.add(LicmPass::new());
        scheduler.run_pipeline(module, &ctx).unwrap();
        ctx
    }

    fn block_of(func: &Function, pred: impl Fn(&Inst) -> bool) -> Option<BlockId> {
        func.instructions()
            .find(|(_, i)| pred(func.inst(*i)))
            .map(|(b, _)| b)
    }

    #[test]
    fn test_invariant_product_hoisted() {
        let mut module = Module::new();
        let (id, body) = counting_loop(&mut module, Operand::int(3));
        let ctx = run_licm(&mut module);
        let f = module.function(id);
        verify_ssa(f).unwrap();

        let mul = block_of(f, |i| matches!(i, Inst::Binary { op: BinaryOp::Mul, .. })).unwrap();
        let div = block_of(f, |i| matches!(i, Inst::Binary { op: BinaryOp::SDiv, .. })).unwrap();
        assert_ne!(mul, body);
        assert_eq!(mul, div);
        // The induction variable update stays in the loop.
        let inc = block_of(f, |i| {
            matches!(i, Inst::Binary { op: BinaryOp::Add, rhs, .. } if *rhs == Operand::int(1))
        })
        .unwrap();
        assert_eq!(inc, body);
        assert!(ctx.events.count_kind(EventKind::InstructionHoisted) >= 2);
    }

    #[test]
    fn test_trapping_division_stays_in_conditional_body() {
        let mut module = Module::new();
        let (id, body) = counting_loop(&mut module, Operand::Param(0));
        run_licm(&mut module);
        let f = module.function(id);

        // The body does not dominate the exiting header, so the division may
        // never run and cannot be speculated.
        let div = block_of(f, |i| matches!(i, Inst::Binary { op: BinaryOp::SDiv, .. })).unwrap();
        assert_eq!(div, body);
        let mul = block_of(f, |i| matches!(i, Inst::Binary { op: BinaryOp::Mul, .. })).unwrap();
        assert_ne!(mul, body);
    }
}
