//! Function inlining.
//!
//! Inlining copies the body of a callee into its caller, replacing the call.
//! It runs in two phases:
//!
//! 1. **Non-recursive inlining**: every call to a defined function that is not
//!    part of a call cycle and whose body does not exceed
//!    [`PipelineConfig::inline_threshold`](crate::compiler::PipelineConfig)
//!    instructions is inlined. The phase repeats until no such call remains, so
//!    chains of small helpers collapse completely.
//! 2. **Recursive unrolling**: a function calling itself directly is unrolled
//!    by inlining a snapshot of its own body at each self call, repeated
//!    [`recursive_inline_depth`](crate::compiler::PipelineConfig) times. Calls
//!    remaining in the innermost copies stay real calls. Each function is
//!    unrolled at most once per pass instance.
//!
//! # Splicing
//!
//! ```text
//! bb:                          bb:
//!     a = ...                      a = ...
//!     r = call f(a)                jump f.entry
//!     use r             =>     f.entry:  (callee blocks, params replaced by args)
//!     ret                          ...
//!                              f.exit:
//!                                  jump bb.cont
//!                              bb.cont:
//!                                  use <returned value>
//!                                  ret
//! ```
//!
//! The callee's single `ret` becomes the jump to the continuation, and the
//! returned operand replaces every use of the call result. Since the callee's
//! exit block dominates the continuation, the caller stays in SSA form.
//! Stack slots of the callee are placed in the caller's entry block.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::CallGraph,
    compiler::{context::CompilerContext, pass::SsaPass, EventKind, EventLog},
    ir::{BlockId, FuncId, Function, Inst, InstId, Module, Operand, RegId},
    Result,
};

/// Inlines small non-recursive callees and unrolls direct recursion.
#[derive(Default)]
pub struct InliningPass {
    unrolled: BTreeSet<FuncId>,
}

/// Mapping from callee entities to their copies in the caller.
struct CloneMap<'a> {
    regs: Vec<Option<RegId>>,
    blocks: BTreeMap<BlockId, BlockId>,
    args: &'a [Operand],
}

impl CloneMap<'_> {
    fn operand(&self, op: Operand) -> Operand {
        match op {
            Operand::Reg(r) => self.regs[r.index()].map_or(op, Operand::Reg),
            Operand::Param(i) => self.args.get(i).copied().unwrap_or(op),
            other => other,
        }
    }

    fn reg(&self, reg: RegId) -> RegId {
        self.regs[reg.index()].unwrap_or(reg)
    }

    fn block(&self, block: BlockId) -> BlockId {
        self.blocks.get(&block).copied().unwrap_or(block)
    }

    /// Rewrites a callee instruction into caller terms.
    fn apply(&self, inst: &Inst) -> Inst {
        let mut inst = inst.clone();
        for op in inst.operands_mut() {
            *op = self.operand(*op);
        }
        match &mut inst {
            Inst::Binary { dest, .. }
            | Inst::Icmp { dest, .. }
            | Inst::Load { dest, .. }
            | Inst::Alloca { dest, .. }
            | Inst::Gep { dest, .. }
            | Inst::BitCast { dest, .. }
            | Inst::Move { dest, .. } => *dest = self.reg(*dest),
            Inst::Call { dest, .. } => *dest = dest.map(|d| self.reg(d)),
            Inst::ParallelCopy { moves } => {
                for (dest, _) in moves.iter_mut() {
                    *dest = self.reg(*dest);
                }
            }
            Inst::Phi { dest, incoming } => {
                *dest = self.reg(*dest);
                for (_, pred) in incoming.iter_mut() {
                    *pred = self.block(*pred);
                }
            }
            Inst::Branch {
                then_bb, else_bb, ..
            } => {
                *then_bb = self.block(*then_bb);
                *else_bb = self.block(*else_bb);
            }
            Inst::Jump { target } => *target = self.block(*target),
            Inst::Store { .. } | Inst::Return { .. } => {}
        }
        inst
    }
}

impl InliningPass {
    /// Creates a new inlining pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `callee` has a body that can be spliced.
    fn inlinable(callee: &Function, threshold: usize) -> bool {
        !callee.is_external()
            && !callee.is_removed()
            && !callee.is_not_functional()
            && callee.instruction_count() <= threshold
    }

    /// Replaces the call `call` in `caller` by a copy of `callee`'s body.
    ///
    /// Returns `false` if `call` is no longer a placed call instruction.
    fn inline_call(
        caller: &mut Function,
        call: InstId,
        callee: &Function,
        events: &EventLog,
    ) -> bool {
        let Some(block) = caller.inst_block(call) else {
            return false;
        };
        let Inst::Call { dest, args, .. } = caller.inst(call).clone() else {
            return false;
        };
        let Some(pos) = caller.position(block, call) else {
            return false;
        };

        let cont = caller.split_block(block, pos, &format!("{}.cont", callee.name()));
        caller.remove_inst(call);

        let mut map = CloneMap {
            regs: vec![None; callee.reg_count()],
            blocks: BTreeMap::new(),
            args: &args,
        };
        for index in 0..callee.reg_count() {
            let reg = RegId::new(index);
            if callee.reg_def(reg).is_some() {
                let name = format!("{}.{}", callee.name(), callee.reg_name(reg));
                map.regs[index] = Some(caller.new_reg(&name, callee.reg_ty(reg).clone()));
            }
        }
        for &src in callee.blocks() {
            let name = format!("{}.{}", callee.name(), callee.block_name(src));
            let copy = caller.add_block_before(cont, &name);
            map.blocks.insert(src, copy);
        }

        let entry = caller.entry();
        let mut allocas = 0;
        let mut returned = None;
        for &src in callee.blocks() {
            let copy = map.block(src);
            for &inst in callee.block_insts(src) {
                match map.apply(callee.inst(inst)) {
                    Inst::Return { value } => {
                        returned = value;
                        caller.append_inst(copy, Inst::Jump { target: cont });
                    }
                    alloca @ Inst::Alloca { .. } => {
                        caller.insert_inst(entry, allocas, alloca);
                        allocas += 1;
                    }
                    other => {
                        caller.append_inst(copy, other);
                    }
                }
            }
        }

        caller.append_inst(
            block,
            Inst::Jump {
                target: map.block(callee.entry()),
            },
        );
        if let (Some(dest), Some(value)) = (dest, returned) {
            caller.replace_all_uses(Operand::Reg(dest), value);
        }

        events
            .record(EventKind::FunctionInlined)
            .at(caller.name(), block.index())
            .message(format!("inlined '{}'", callee.name()));
        true
    }

    /// Phase one: inlines non-recursive callees to a fixpoint.
    fn inline_small_callees(module: &mut Module, ctx: &CompilerContext) -> usize {
        let threshold = ctx.config.inline_threshold;
        let mut inlined = 0;
        for _ in 0..ctx.config.max_pass_iterations {
            let graph = CallGraph::build(module);
            let mut round = 0;
            for callee_id in module.defined_functions() {
                if graph.is_recursive(callee_id)
                    || !Self::inlinable(module.function(callee_id), threshold)
                {
                    continue;
                }
                let sites = graph.call_sites(callee_id).to_vec();
                if sites.is_empty() {
                    continue;
                }
                let callee = module.function(callee_id).clone();
                for (caller_id, call) in sites {
                    if Self::inline_call(module.function_mut(caller_id), call, &callee, &ctx.events)
                    {
                        round += 1;
                    }
                }
            }
            if round == 0 {
                break;
            }
            inlined += round;
        }
        inlined
    }

    /// Phase two: unrolls direct self recursion.
    fn unroll_recursion(&mut self, module: &mut Module, ctx: &CompilerContext) -> usize {
        let graph = CallGraph::build(module);
        let mut inlined = 0;
        for id in module.defined_functions() {
            if self.unrolled.contains(&id)
                || !graph.calls_self(id)
                || !Self::inlinable(module.function(id), ctx.config.inline_threshold)
            {
                continue;
            }
            self.unrolled.insert(id);

            let snapshot = module.function(id).clone();
            let func = module.function_mut(id);
            for depth in 0..ctx.config.recursive_inline_depth {
                let sites: Vec<InstId> = func
                    .instructions()
                    .filter(|(_, i)| matches!(func.inst(*i), Inst::Call { callee, .. } if *callee == id))
                    .map(|(_, i)| i)
                    .collect();
                if sites.is_empty() {
                    break;
                }
                for call in sites {
                    if Self::inline_call(func, call, &snapshot, &ctx.events) {
                        inlined += 1;
                    }
                }
                log::trace!("inlining: '{}' unrolled to depth {}", func.name(), depth + 1);
            }
        }
        inlined
    }
}

impl SsaPass for InliningPass {
    fn name(&self) -> &'static str {
        "inlining"
    }

    fn description(&self) -> &'static str {
        "Inlines small functions and unrolls direct recursion"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn run_on_function(
        &self,
        _func: &mut Function,
        _id: FuncId,
        _module: &Module,
        _ctx: &CompilerContext,
    ) -> Result<bool> {
        // Global pass; see `run_global`.
        Ok(false)
    }

    fn run_global(&mut self, module: &mut Module, ctx: &CompilerContext) -> Result<bool> {
        let inlined = Self::inline_small_callees(module, ctx) + self.unroll_recursion(module, ctx);
        if inlined > 0 {
            log::debug!("inlining: {inlined} call sites inlined");
        }
        Ok(inlined > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinaryOp, FunctionBuilder, IcmpCond, IrType, Param},
        ssa::{construct_ssa, verify_ssa},
    };

    fn into_ssa(module: &mut Module) {
        let events = EventLog::new();
        for id in module.defined_functions() {
            let mut func = module.take_function(id);
            construct_ssa(&mut func, &events).unwrap();
            module.restore_function(id, func);
        }
    }

    fn calls_to(func: &Function, target: FuncId) -> usize {
        func.instructions()
            .filter(|(_, i)| matches!(func.inst(*i), Inst::Call { callee, .. } if *callee == target))
            .count()
    }

    #[test]
    fn test_small_callee_inlined() {
        let mut module = Module::new();
        let print_int = module.require_function("printInt").unwrap();
        let square = module.declare_function("square", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(square));
        let v = b.binary(BinaryOp::Mul, Operand::Param(0), Operand::Param(0));
        b.ret(Some(v));
        b.finish().unwrap();

        let main = module.declare_function("main", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(main));
        let r = b.call(square, &IrType::I32, vec![Operand::int(7)]).unwrap();
        b.call(print_int, &IrType::Void, vec![r]);
        b.ret(None);
        b.finish().unwrap();
        into_ssa(&mut module);

        let ctx = CompilerContext::default();
        let mut pass = InliningPass::new();
        assert!(pass.run_global(&mut module, &ctx).unwrap());

        let f = module.function(main);
        verify_ssa(f).unwrap();
        assert!(!f.is_not_functional());
        assert_eq!(calls_to(f, square), 0);
        // The product of the inlined body feeds printInt.
        let printed = f
            .instructions()
            .find_map(|(_, i)| match f.inst(i) {
                Inst::Call { callee, args, .. } if *callee == print_int => Some(args[0]),
                _ => None,
            })
            .unwrap();
        let def = f.reg_def(printed.as_reg().unwrap()).unwrap();
        assert!(matches!(
            f.inst(def),
            Inst::Binary { op: BinaryOp::Mul, lhs, .. } if *lhs == Operand::int(7)
        ));
        assert_eq!(ctx.events.count_kind(EventKind::FunctionInlined), 1);
        assert!(!pass.run_global(&mut module, &ctx).unwrap());
    }

    #[test]
    fn test_large_callee_kept() {
        let mut module = Module::new();
        let big = module.declare_function("big", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(big));
        let mut v = Operand::Param(0);
        for k in 0..8 {
            v = b.binary(BinaryOp::Add, v, Operand::int(k));
        }
        b.ret(Some(v));
        b.finish().unwrap();

        let main = module.declare_function("main", IrType::I32, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(main));
        let r = b.call(big, &IrType::I32, vec![Operand::int(1)]).unwrap();
        b.ret(Some(r));
        b.finish().unwrap();
        into_ssa(&mut module);

        let config = crate::compiler::PipelineConfig::default().with_inline_threshold(4);
        let ctx = CompilerContext::new(config);
        let mut pass = InliningPass::new();
        assert!(!pass.run_global(&mut module, &ctx).unwrap());
        assert_eq!(calls_to(module.function(main), big), 1);
    }

    #[test]
    fn test_recursion_unrolled_to_depth() {
        // int down(int n) { if (n > 0) return down(n - 1); return 0; }
        let mut module = Module::new();
        let down = module.declare_function("down", IrType::I32, vec![Param::new("n", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(down));
        let rec = b.new_block("rec");
        let base = b.new_block("base");
        let c = b.icmp(IcmpCond::Sgt, Operand::Param(0), Operand::int(0));
        b.branch(c, rec, base);
        b.position_at_end(rec);
        let n1 = b.binary(BinaryOp::Sub, Operand::Param(0), Operand::int(1));
        let r = b.call(down, &IrType::I32, vec![n1]).unwrap();
        b.ret(Some(r));
        b.position_at_end(base);
        b.ret(Some(Operand::int(0)));
        b.finish().unwrap();
        into_ssa(&mut module);

        let ctx = CompilerContext::default();
        let mut pass = InliningPass::new();
        assert!(pass.run_global(&mut module, &ctx).unwrap());

        let f = module.function(down);
        verify_ssa(f).unwrap();
        assert!(!f.is_not_functional());
        // One self call per level, the innermost copy keeps a real call.
        assert_eq!(calls_to(f, down), 1);
        assert_eq!(ctx.events.count_kind(EventKind::FunctionInlined), 3);
        // Each function is unrolled once.
        assert!(!pass.run_global(&mut module, &ctx).unwrap());
    }
}
