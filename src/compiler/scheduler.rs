//! Pass scheduler for orchestrating the optimization fixpoint.
//!
//! The [`PassScheduler`] runs an ordered list of passes. Each pass is repeated
//! until it stops reporting changes (bounded by the per-pass limit), then the
//! next pass runs. The whole sequence repeats until a full sweep changes
//! nothing or the global iteration bound is reached.

use crate::{
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    ir::Module,
    Result,
};

/// Orchestrates SSA pass execution to a global fixpoint.
pub struct PassScheduler {
    /// Maximum iterations for the entire pass sequence.
    max_iterations: usize,
    /// Maximum consecutive runs of one pass before moving on.
    max_pass_iterations: usize,
    /// Passes in execution order.
    pub passes: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(64, 64)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum sweeps over the pass sequence.
    /// * `max_pass_iterations` - Maximum consecutive runs of a single pass.
    #[must_use]
    pub fn new(max_iterations: usize, max_pass_iterations: usize) -> Self {
        Self {
            max_iterations,
            max_pass_iterations,
            passes: Vec::new(),
        }
    }

    /// Appends a pass to the sequence.
    pub fn add(&mut self, pass: impl SsaPass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Names of the scheduled passes in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Returns `true` when every defined function has the single-exit shape.
    fn module_is_functional(module: &Module) -> bool {
        module
            .defined_functions()
            .into_iter()
            .all(|id| !module.function(id).is_not_functional())
    }

    /// Runs one pass to its local fixpoint.
    ///
    /// Returns `true` if any run made changes.
    fn pass_to_fixpoint(
        pass: &mut dyn SsaPass,
        module: &mut Module,
        ctx: &CompilerContext,
        max_pass_iterations: usize,
    ) -> Result<bool> {
        let mut any_changed = false;

        for _ in 0..max_pass_iterations {
            if !Self::run_pass_once(pass, module, ctx)? {
                break;
            }
            any_changed = true;
        }

        Ok(any_changed)
    }

    /// Runs a pass once over the module.
    ///
    /// A module containing an ill-shaped function is left untouched.
    fn run_pass_once(
        pass: &mut dyn SsaPass,
        module: &mut Module,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        if !Self::module_is_functional(module) {
            log::warn!("skipping {}: module is not in functional shape", pass.name());
            ctx.events
                .warn(format!("{} skipped: module is not in functional shape", pass.name()));
            return Ok(false);
        }

        pass.initialize(module, ctx)?;
        ctx.events.record(EventKind::PassStarted).pass(pass.name());

        let mut changed = false;
        if pass.is_global() {
            changed = pass.run_global(module, ctx)?;
        } else {
            for id in module.defined_functions() {
                if !pass.should_run(module.function(id), ctx) {
                    continue;
                }

                // The function leaves the module for the duration of the run.
                let mut func = module.take_function(id);
                let result = pass.run_on_function(&mut func, id, module, ctx);
                module.restore_function(id, func);

                if result? {
                    changed = true;
                }
            }
        }

        pass.finalize(ctx)?;
        ctx.events
            .record(EventKind::PassCompleted)
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });
        log::debug!(
            "{}: {}",
            pass.name(),
            if changed { "changed" } else { "no change" }
        );

        Ok(changed)
    }

    /// Runs the complete pass sequence to a global fixpoint.
    ///
    /// # Returns
    ///
    /// The number of sweeps completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if any pass fails during execution.
    pub fn run_pipeline(&mut self, module: &mut Module, ctx: &CompilerContext) -> Result<usize> {
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let mut iteration_changed = false;

            for pass in &mut self.passes {
                if Self::pass_to_fixpoint(pass.as_mut(), module, ctx, self.max_pass_iterations)? {
                    iteration_changed = true;
                }
            }

            log::debug!("optimization sweep {iterations}: changed = {iteration_changed}");
            if !iteration_changed {
                break;
            }
        }

        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::{
        compiler::{context::CompilerContext, pass::SsaPass, EventKind, PassScheduler},
        ir::{FuncId, Function, FunctionBuilder, IrType, Module},
        Result,
    };

    struct CountdownPass {
        name: &'static str,
        remaining: Cell<usize>,
    }

    impl CountdownPass {
        fn new(name: &'static str, changes: usize) -> Self {
            Self {
                name,
                remaining: Cell::new(changes),
            }
        }
    }

    impl SsaPass for CountdownPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_on_function(
            &self,
            func: &mut Function,
            _id: FuncId,
            _module: &Module,
            ctx: &CompilerContext,
        ) -> Result<bool> {
            let left = self.remaining.get();
            if left == 0 {
                return Ok(false);
            }
            self.remaining.set(left - 1);
            ctx.events
                .record(EventKind::ConstantFolded)
                .at(func.name(), left)
                .message("test");
            Ok(true)
        }
    }

    fn module_with_main() -> Module {
        let mut module = Module::new();
        let id = module.declare_function("main", IrType::Void, vec![]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        b.ret(None);
        b.finish().unwrap();
        module
    }

    #[test]
    fn test_runs_to_fixpoint() {
        let mut module = module_with_main();
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(10, 2);
        scheduler.add(CountdownPass::new("countdown", 5));

        let iterations = scheduler.run_pipeline(&mut module, &ctx).unwrap();
        assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 5);
        // 2 + 2 + 1 changes, then one quiet sweep.
        assert_eq!(iterations, 4);
    }

    #[test]
    fn test_iteration_bound() {
        let mut module = module_with_main();
        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::new(1, 1);
        scheduler.add(CountdownPass::new("countdown", 5));

        assert_eq!(scheduler.run_pipeline(&mut module, &ctx).unwrap(), 1);
        assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 1);
    }

    #[test]
    fn test_skips_ill_shaped_module() {
        let mut module = Module::new();
        let id = module.declare_function("broken", IrType::Void, vec![]);
        let f = module.function_mut(id);
        let bb = f.add_block("entry");
        f.set_entry(bb);
        f.set_exit(bb);

        let ctx = CompilerContext::default();
        let mut scheduler = PassScheduler::default();
        scheduler.add(CountdownPass::new("countdown", 1));
        assert_eq!(scheduler.run_pipeline(&mut module, &ctx).unwrap(), 1);
        assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 0);
        assert_eq!(ctx.events.warnings().count(), 1);
    }

    #[test]
    fn test_pass_names() {
        let mut scheduler = PassScheduler::default();
        scheduler.add(CountdownPass::new("pass1", 0));
        scheduler.add(CountdownPass::new("pass2", 0));
        assert_eq!(scheduler.pass_names(), vec!["pass1", "pass2"]);
    }
}
