//! Dead code elimination passes.
//!
//! This module provides two passes:
//!
//! - [`DeadCodeEliminationPass`]: removes instructions whose results can never
//!   influence an observable effect of their function.
//! - [`FunctionRemovalPass`]: deletes functions that the entry function can
//!   never call.
//!
//! # Liveness
//!
//! An instruction is live when it is:
//!
//! 1. A store, a return or a block terminator
//! 2. A call to a function with a side effect (I/O counts, loads do not)
//! 3. The definition of an operand of a live instruction
//!
//! Everything else is dropped. Because every terminator is live, a branch
//! controlling a live block is always kept, and its condition with it. Cycles
//! of phis and arithmetic that only feed each other (dead induction
//! variables) are removed in one sweep since nothing outside the cycle marks
//! them.

use crate::{
    analysis::{CallGraph, SideEffectChecker, SideEffectInfo},
    compiler::{context::CompilerContext, pass::SsaPass, EventKind},
    ir::{FuncId, Function, Inst, InstId, Module},
    Result,
};

/// Removes instructions with no effect on the observable behavior.
#[derive(Default)]
pub struct DeadCodeEliminationPass {
    side_effects: Option<SideEffectInfo>,
}

impl DeadCodeEliminationPass {
    /// Creates a new dead code elimination pass.
    ///
    /// # Returns
    ///
    /// A new instance of `DeadCodeEliminationPass`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `inst` must be kept regardless of its uses.
    fn is_root(&self, inst: &Inst) -> bool {
        match inst {
            Inst::Store { .. } | Inst::Return { .. } | Inst::Branch { .. } | Inst::Jump { .. } => {
                true
            }
            Inst::Call { callee, .. } => self
                .side_effects
                .as_ref()
                .is_none_or(|info| info.has_side_effect(*callee)),
            _ => false,
        }
    }

    /// Marks the live instructions of `func`, indexed by instruction handle.
    fn mark_live(&self, func: &Function) -> Vec<bool> {
        let slots = func
            .instructions()
            .map(|(_, i)| i.index() + 1)
            .max()
            .unwrap_or(0);
        let mut live = vec![false; slots];
        let mut worklist: Vec<InstId> = Vec::new();

        for (_, inst) in func.instructions() {
            if self.is_root(func.inst(inst)) {
                live[inst.index()] = true;
                worklist.push(inst);
            }
        }

        while let Some(inst) = worklist.pop() {
            for reg in func.inst(inst).used_regs() {
                if let Some(def) = func.reg_def(reg) {
                    if !live[def.index()] {
                        live[def.index()] = true;
                        worklist.push(def);
                    }
                }
            }
        }
        live
    }
}

impl SsaPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "Eliminates instructions that cannot affect stores, calls or returns"
    }

    fn initialize(&mut self, module: &Module, _ctx: &CompilerContext) -> Result<()> {
        self.side_effects = Some(SideEffectChecker::new(false, true).analyze(module));
        Ok(())
    }

    fn run_on_function(
        &self,
        func: &mut Function,
        _id: FuncId,
        _module: &Module,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let live = self.mark_live(func);
        let dead: Vec<(usize, InstId)> = func
            .instructions()
            .filter(|(_, i)| !live[i.index()])
            .map(|(b, i)| (b.index(), i))
            .collect();

        for &(block, inst) in &dead {
            ctx.events
                .record(EventKind::InstructionRemoved)
                .at(func.name(), block)
                .message(format!("dead {}", func.inst(inst).mnemonic()));
            func.remove_inst(inst);
        }
        Ok(!dead.is_empty())
    }
}

/// Deletes every function the entry function cannot reach over call edges.
///
/// # Entry Points
///
/// The entry is the function named by
/// [`PipelineConfig::entry_function`](crate::compiler::PipelineConfig). A
/// module without it is left untouched. External declarations are never
/// removed.
pub struct FunctionRemovalPass;

impl Default for FunctionRemovalPass {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRemovalPass {
    /// Creates a new function removal pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SsaPass for FunctionRemovalPass {
    fn name(&self) -> &'static str {
        "function-removal"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Removes functions unreachable from the entry function"
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
        let Some(entry) = module.function_by_name(&ctx.config.entry_function) else {
            log::debug!(
                "function-removal: no entry function '{}'",
                ctx.config.entry_function
            );
            return Ok(false);
        };

        let reachable = CallGraph::build(module).reachable_from(entry);
        let mut changed = false;
        for id in module.defined_functions() {
            if reachable.contains(&id) {
                continue;
            }
            ctx.events
                .record(EventKind::FunctionRemoved)
                .function(module.function(id).name())
                .message("unreachable from the entry function");
            module.remove_function(id);
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::PassScheduler,
        ir::{BinaryOp, FunctionBuilder, GlobalInit, IrType, Operand, Param},
        ssa::construct_ssa,
    };

    fn in_ssa(module: &mut Module, id: FuncId) {
        let ctx = CompilerContext::default();
        let mut func = module.take_function(id);
        construct_ssa(&mut func, &ctx.events).unwrap();
        module.restore_function(id, func);
    }

    fn run_dce(module: &mut Module) -> CompilerContext {
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(1, 1);
        scheduler.add(DeadCodeEliminationPass::new());
        scheduler.run_pipeline(module, &ctx).unwrap();
        ctx
    }

    #[test]
    fn test_unused_arithmetic_removed() {
        let mut module = Module::new();
        let id = module.declare_function("f", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let _unused = b.binary(BinaryOp::Mul, Operand::Param(0), Operand::int(3));
        let kept = b.binary(BinaryOp::Add, Operand::Param(0), Operand::int(1));
        b.ret(Some(kept));
        b.finish().unwrap();
        in_ssa(&mut module, id);

        let ctx = run_dce(&mut module);
        let f = module.function(id);
        assert!(f
            .instructions()
            .all(|(_, i)| !matches!(f.inst(i), Inst::Binary { op: BinaryOp::Mul, .. })));
        assert_eq!(ctx.events.count_kind(EventKind::InstructionRemoved), 1);
    }

    #[test]
    fn test_side_effecting_calls_kept() {
        let mut module = Module::new();
        let print_int = module.require_function("printInt").unwrap();
        let len = module.require_function("__string_length").unwrap();
        let counter = module.add_global("counter", IrType::I32, GlobalInit::Int(0));

        let id = module.declare_function("main", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        b.call(print_int, &IrType::Void, vec![Operand::int(1)]);
        let _pure = b.call(len, &IrType::I32, vec![Operand::null()]);
        b.store(Operand::int(2), Operand::Global(counter));
        b.ret(None);
        b.finish().unwrap();

        run_dce(&mut module);
        let f = module.function(id);
        let calls: Vec<FuncId> = f
            .instructions()
            .filter_map(|(_, i)| match f.inst(i) {
                Inst::Call { callee, .. } => Some(*callee),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![print_int]);
        assert!(f
            .instructions()
            .any(|(_, i)| matches!(f.inst(i), Inst::Store { .. })));
    }

    #[test]
    fn test_unreachable_functions_removed() {
        let mut module = Module::new();
        let helper = module.declare_function("helper", IrType::Void, vec![]);
        let orphan = module.declare_function("orphan", IrType::Void, vec![]);
        let main = module.declare_function("main", IrType::Void, vec![]);
        for id in [helper, orphan] {
            let mut b = FunctionBuilder::new(module.function_mut(id));
            b.ret(None);
            b.finish().unwrap();
        }
        let mut b = FunctionBuilder::new(module.function_mut(main));
        b.call(helper, &IrType::Void, vec![]);
        b.ret(None);
        b.finish().unwrap();

        let ctx = CompilerContext::default();
        let mut pass = FunctionRemovalPass::new();
        assert!(pass.run_global(&mut module, &ctx).unwrap());
        assert!(module.function_by_name("orphan").is_none());
        assert!(module.function_by_name("helper").is_some());
        assert!(module.function_by_name("printInt").is_some());
        assert!(!pass.run_global(&mut module, &ctx).unwrap());
    }
}
