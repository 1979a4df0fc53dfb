//! Common subexpression elimination.
//!
//! Blocks are visited in reverse postorder. Every pure instruction is
//! reduced to an [`Expression`] key; when an earlier instruction with the same
//! key is defined in a block dominating the current one, the later result is
//! replaced by the earlier register.
//!
//! Commutative operations are also registered under their swapped key, with
//! comparisons mirrored (`sgt a, b` is the same value as `slt b, a`).
//!
//! Loads take part as well. A load is reusable only when no store that may
//! alias its address, and no call with a side effect, can execute between the
//! two loads. Aliasing is answered by the points-to sets of [`Andersen`].

use std::collections::{BTreeSet, HashMap};

use crate::{
    analysis::{Andersen, DominanceInfo, FunctionCfg, SideEffectChecker, SideEffectInfo},
    compiler::{context::CompilerContext, passes::utils::is_pure, pass::SsaPass, EventKind},
    ir::{BinaryOp, BlockId, FuncId, Function, IcmpCond, Inst, InstId, IrType, Module, Operand, RegId},
    Result,
};

/// Structural key of a computed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Expression {
    Binary(BinaryOp, Operand, Operand),
    Icmp(IcmpCond, Operand, Operand),
    Gep(IrType, Operand, Vec<Operand>),
    BitCast(IrType, Operand),
    Load(IrType, Operand),
}

impl Expression {
    fn of(func: &Function, inst: &Inst) -> Option<Self> {
        if let Inst::Load { dest, ptr } = inst {
            return Some(Expression::Load(func.reg_ty(*dest).clone(), *ptr));
        }
        if !is_pure(inst) {
            return None;
        }
        match inst {
            Inst::Binary { op, lhs, rhs, .. } => Some(Expression::Binary(*op, *lhs, *rhs)),
            Inst::Icmp { cond, lhs, rhs, .. } => Some(Expression::Icmp(*cond, *lhs, *rhs)),
            Inst::Gep { dest, ptr, indices } => Some(Expression::Gep(
                func.reg_ty(*dest).clone(),
                *ptr,
                indices.clone(),
            )),
            Inst::BitCast { dest, src } => {
                Some(Expression::BitCast(func.reg_ty(*dest).clone(), *src))
            }
            _ => None,
        }
    }

    /// The same value with operands swapped, for commutative operations.
    fn commuted(&self) -> Option<Self> {
        match self {
            Expression::Binary(op, lhs, rhs) if op.is_commutative() => {
                Some(Expression::Binary(*op, *rhs, *lhs))
            }
            Expression::Icmp(cond, lhs, rhs) => Some(Expression::Icmp(cond.mirrored(), *rhs, *lhs)),
            _ => None,
        }
    }
}

/// Common subexpression elimination pass.
#[derive(Default)]
pub struct CommonSubexpressionPass {
    points_to: Option<Andersen>,
    side_effects: Option<SideEffectInfo>,
}

impl CommonSubexpressionPass {
    /// Creates a new CSE pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if executing `inst` may change the value loaded from `ptr`.
    fn clobbers(&self, id: FuncId, func: &Function, inst: &Inst, ptr: Operand) -> bool {
        match inst {
            Inst::Store { ptr: target, .. } => self
                .points_to
                .as_ref()
                .is_none_or(|pt| pt.may_alias(id, func, ptr, *target)),
            Inst::Call { callee, .. } => self
                .side_effects
                .as_ref()
                .is_none_or(|info| info.has_side_effect(*callee)),
            _ => false,
        }
    }

    fn clobbered_in(
        &self,
        id: FuncId,
        func: &Function,
        insts: &[InstId],
        ptr: Operand,
    ) -> bool {
        insts
            .iter()
            .any(|&i| self.clobbers(id, func, func.inst(i), ptr))
    }

    /// Blocks strictly dominated by the block of `load` on whose entry the
    /// loaded value may already be stale.
    fn stale_blocks(
        &self,
        id: FuncId,
        func: &Function,
        dom: &DominanceInfo,
        load: InstId,
        ptr: Operand,
    ) -> BTreeSet<BlockId> {
        let mut stale = BTreeSet::new();
        let Some(home) = func.inst_block(load) else {
            return stale;
        };
        let position = func.position(home, load).unwrap_or(0);
        let mut worklist = Vec::new();

        let after_load = &func.block_insts(home)[position + 1..];
        if self.clobbered_in(id, func, after_load, ptr) {
            worklist.push(home);
        }
        for &block in func.blocks() {
            if dom.strictly_dominates(home, block)
                && self.clobbered_in(id, func, func.block_insts(block), ptr)
            {
                worklist.push(block);
            }
        }

        while let Some(block) = worklist.pop() {
            for &succ in func.succs(block) {
                if dom.strictly_dominates(home, succ) && stale.insert(succ) {
                    worklist.push(succ);
                }
            }
        }
        stale
    }

    /// Returns `true` if the value of `earlier` can replace the load `later`.
    fn load_available(
        &self,
        id: FuncId,
        func: &Function,
        dom: &DominanceInfo,
        earlier: InstId,
        later: InstId,
        ptr: Operand,
    ) -> bool {
        let (Some(home), Some(block)) = (func.inst_block(earlier), func.inst_block(later)) else {
            return false;
        };
        let insts = func.block_insts(block);
        let later_pos = func.position(block, later).unwrap_or(0);

        if home == block {
            let earlier_pos = func.position(home, earlier).unwrap_or(0);
            return earlier_pos < later_pos
                && !self.clobbered_in(id, func, &insts[earlier_pos + 1..later_pos], ptr);
        }
        !self.stale_blocks(id, func, dom, earlier, ptr).contains(&block)
            && !self.clobbered_in(id, func, &insts[..later_pos], ptr)
    }
}

impl SsaPass for CommonSubexpressionPass {
    fn name(&self) -> &'static str {
        "cse"
    }

    fn description(&self) -> &'static str {
        "Reuses values computed in dominating blocks"
    }

    fn should_run(&self, func: &Function, _ctx: &CompilerContext) -> bool {
        !func.is_not_functional()
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
        let order = FunctionCfg::new(func).reverse_postorder();
        let mut table: HashMap<Expression, Vec<(RegId, InstId)>> = HashMap::new();
        let mut replacements: Vec<(InstId, RegId, RegId)> = Vec::new();

        for block in order {
            for &inst in func.block_insts(block) {
                let data = func.inst(inst);
                let (Some(dest), Some(expr)) = (data.def(), Expression::of(func, data)) else {
                    continue;
                };

                let reusable = table.get(&expr).and_then(|candidates| {
                    candidates.iter().find(|(_, def)| {
                        let Some(def_block) = func.inst_block(*def) else {
                            return false;
                        };
                        if !dom.dominates(def_block, block) {
                            return false;
                        }
                        match &expr {
                            Expression::Load(_, ptr) => {
                                self.load_available(id, func, &dom, *def, inst, *ptr)
                            }
                            _ => true,
                        }
                    })
                });

                if let Some(&(existing, _)) = reusable {
                    replacements.push((inst, dest, existing));
                    continue;
                }
                if let Some(commuted) = expr.commuted() {
                    table.entry(commuted).or_default().push((dest, inst));
                }
                table.entry(expr).or_default().push((dest, inst));
            }
        }

        for &(inst, dest, existing) in &replacements {
            let block = func.inst_block(inst).map_or(0, BlockId::index);
            ctx.events
                .record(EventKind::ExpressionReused)
                .at(func.name(), block)
                .message(format!(
                    "{} reuses {}",
                    func.reg_name(dest),
                    func.reg_name(existing)
                ));
            func.remove_inst(inst);
            func.replace_all_uses(Operand::Reg(dest), Operand::Reg(existing));
        }
        Ok(!replacements.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::PassScheduler,
        ir::{FunctionBuilder, GlobalInit, Param},
    };

    fn run_cse(module: &mut Module) -> CompilerContext {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(1, 1);
        scheduler.add(CommonSubexpressionPass::new());
        scheduler.run_pipeline(module, &ctx).unwrap();
        ctx
    }

    fn count(func: &Function, pred: impl Fn(&Inst) -> bool) -> usize {
        func.instructions().filter(|(_, i)| pred(func.inst(*i))).count()
    }

    #[test]
    fn test_commuted_and_mirrored_expressions_reused() {
        let mut module = Module::new();
        let params = vec![Param::new("a", IrType::I32), Param::new("b", IrType::I32)];
        let id = module.declare_function("f", IrType::Void, params);
        let print = module.require_function("printInt").unwrap();
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let (a, bb) = (Operand::Param(0), Operand::Param(1));
        let s1 = b.binary(BinaryOp::Add, a, bb);
        let s2 = b.binary(BinaryOp::Add, bb, a);
        let c1 = b.icmp(IcmpCond::Sgt, a, bb);
        let c2 = b.icmp(IcmpCond::Slt, bb, a);
        let d1 = b.binary(BinaryOp::Sub, a, bb);
        let d2 = b.binary(BinaryOp::Sub, bb, a);
        for v in [s1, s2, d1, d2] {
            b.call(print, &IrType::Void, vec![v]);
        }
        let both = b.binary(BinaryOp::And, c1, c2);
        b.call(print, &IrType::Void, vec![both]);
        b.ret(None);
        b.finish().unwrap();

        let ctx = run_cse(&mut module);
        let f = module.function(id);
        assert_eq!(ctx.events.count_kind(EventKind::ExpressionReused), 2);
        assert_eq!(count(f, |i| matches!(i, Inst::Binary { op: BinaryOp::Add, .. })), 1);
        assert_eq!(count(f, |i| matches!(i, Inst::Binary { op: BinaryOp::Sub, .. })), 2);
        assert_eq!(count(f, |i| matches!(i, Inst::Icmp { .. })), 1);
    }

    #[test]
    fn test_load_not_reused_across_aliasing_store() {
        let mut module = Module::new();
        let g = module.add_global("g", IrType::I32, GlobalInit::Int(0));
        let print = module.require_function("printInt").unwrap();
        let id = module.declare_function("f", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let x = b.load(IrType::I32, Operand::Global(g));
        let y = b.load(IrType::I32, Operand::Global(g));
        b.store(Operand::int(3), Operand::Global(g));
        let z = b.load(IrType::I32, Operand::Global(g));
        for v in [x, y, z] {
            b.call(print, &IrType::Void, vec![v]);
        }
        b.ret(None);
        b.finish().unwrap();

        run_cse(&mut module);
        let f = module.function(id);
        // y reuses x; z must reload after the store.
        assert_eq!(count(f, |i| matches!(i, Inst::Load { .. })), 2);
    }

    #[test]
    fn test_non_dominating_definition_not_reused() {
        let mut module = Module::new();
        let id = module.declare_function("f", IrType::I32, vec![Param::new("a", IrType::I1)]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let left = b.new_block("left");
        let right = b.new_block("right");
        b.branch(Operand::Param(0), left, right);
        b.position_at_end(left);
        let l = b.binary(BinaryOp::Mul, Operand::int(3), Operand::int(5));
        b.ret(Some(l));
        b.position_at_end(right);
        let r = b.binary(BinaryOp::Mul, Operand::int(3), Operand::int(5));
        b.ret(Some(r));
        b.finish().unwrap();

        let ctx = run_cse(&mut module);
        assert!(!ctx.events.has(EventKind::ExpressionReused));
    }
}
