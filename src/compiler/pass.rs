//! The pass trait implemented by every optimization.

use crate::{
    compiler::context::CompilerContext,
    ir::{FuncId, Function, Module},
    Result,
};

/// An optimization pass over SSA form.
///
/// Per-function passes receive the function they transform by exclusive
/// reference while the rest of the module stays readable. The scheduler takes
/// the function out of the module for the duration of the call, so a pass must
/// not look up the function it is transforming through `module`.
///
/// Global passes (inlining, function removal) instead receive the whole module
/// mutably through [`SsaPass::run_global`].
///
/// Every run reports whether it changed anything; the scheduler uses the
/// result to drive the fixpoint loop.
pub trait SsaPass {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Should this pass run on a specific function?
    ///
    /// Called before `run_on_function`. Override to skip functions that
    /// cannot benefit (for example, functions without loops).
    fn should_run(&self, _func: &Function, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Runs the pass on a single function.
    ///
    /// Returns `true` if any changes were made. Events should be recorded
    /// directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if a structural invariant of the function is broken.
    fn run_on_function(
        &self,
        func: &mut Function,
        id: FuncId,
        module: &Module,
        ctx: &CompilerContext,
    ) -> Result<bool>;

    /// Runs on the entire module (for interprocedural passes).
    ///
    /// # Errors
    ///
    /// Returns an error if a structural invariant of the module is broken.
    fn run_global(&mut self, _module: &mut Module, _ctx: &CompilerContext) -> Result<bool> {
        Ok(false)
    }

    /// Does this pass operate globally (across all functions)?
    fn is_global(&self) -> bool {
        false
    }

    /// Called before each sweep of the pass over the module.
    ///
    /// Whole-module analyses (side effects, points-to sets) are computed here
    /// so that every sweep sees the current state of the module.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis fails.
    fn initialize(&mut self, _module: &Module, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called after each sweep of the pass over the module.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }
}
