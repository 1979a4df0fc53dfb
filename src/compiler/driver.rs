//! The compiler driver: frontend IR in, RV32IM assembly out.
//!
//! # Pipeline
//!
//! 1. CFG simplification (removes unreachable blocks before dominators)
//! 2. Shape guard: every function must be in single-exit form
//! 3. SSA construction (dominators, phi placement, renaming)
//! 4. Optimization fixpoint over the enabled passes
//! 5. SSA destruction
//! 6. Per function: instruction selection, loop depths, register allocation,
//!    prologue and epilogue, peephole
//! 7. Emission

use crate::{
    backend::{
        assign_loop_depths, insert_prologue_epilogue, run_peephole, Assembly, InstructionSelector,
        RegisterAllocator, RegisterFile,
    },
    compiler::{
        config::{AllocatorConfig, PassFlags, PipelineConfig},
        context::CompilerContext,
        events::{EventKind, EventLog},
        passes::{
            CommonSubexpressionPass, ConstantPropagationPass, ControlFlowSimplificationPass,
            DeadCodeEliminationPass, FunctionRemovalPass, InliningPass, InstructionCombiningPass,
            LicmPass,
        },
        scheduler::PassScheduler,
    },
    ir::Module,
    ssa::{construct_ssa, destruct_ssa},
    Error, Result,
};

/// Compiles IR modules to assembly.
///
/// # Examples
///
/// ```rust,ignore
/// use ssaforge::{Compiler, compiler::PipelineConfig};
///
/// let compiler = Compiler::new(PipelineConfig::default().with_inline_threshold(60));
/// let assembly = compiler.compile(module)?;
/// println!("{assembly}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: PipelineConfig,
    allocator: AllocatorConfig,
    registers: RegisterFile,
}

impl Compiler {
    /// Creates a compiler with the given pipeline configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            allocator: AllocatorConfig::default(),
            registers: RegisterFile::rv32(),
        }
    }

    /// Replaces the register allocator configuration.
    #[must_use]
    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.allocator = allocator;
        self
    }

    /// The pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Compiles `module` to assembly.
    ///
    /// # Errors
    ///
    /// Returns an error on a broken IR invariant, a function outside the
    /// single-exit shape, or a register allocation that does not converge.
    pub fn compile(&self, module: Module) -> Result<Assembly> {
        self.compile_with_events(module).map(|(asm, _)| asm)
    }

    /// Compiles `module` and returns the events recorded along the way.
    ///
    /// # Errors
    ///
    /// See [`Compiler::compile`].
    pub fn compile_with_events(&self, mut module: Module) -> Result<(Assembly, EventLog)> {
        let ctx = CompilerContext::new(self.config.clone());
        self.optimize(&mut module, &ctx)?;
        let assembly = self.lower(&mut module, &ctx)?;
        log::debug!(
            "compiled {} functions in {:?}: {}",
            assembly.functions().len(),
            ctx.elapsed(),
            ctx.events.summary()
        );
        Ok((assembly, ctx.into_events()))
    }

    /// Runs the middle end: SSA construction and the optimization fixpoint.
    ///
    /// The module is left in SSA form. Returns the number of optimization
    /// sweeps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFunctional`] if a function fails the shape guard,
    /// or any error raised by SSA construction or a pass.
    pub fn optimize(&self, module: &mut Module, ctx: &CompilerContext) -> Result<usize> {
        let mut cleanup = PassScheduler::new(1, self.config.max_pass_iterations);
        cleanup.add(ControlFlowSimplificationPass::new());
        cleanup.run_pipeline(module, ctx)?;

        for id in module.defined_functions() {
            let func = module.function(id);
            if func.is_not_functional() {
                return Err(Error::NotFunctional(func.name().to_string()));
            }
        }

        for id in module.defined_functions() {
            let mut func = module.take_function(id);
            let result = construct_ssa(&mut func, &ctx.events);
            module.restore_function(id, func);
            result?;
        }

        let mut scheduler = self.scheduler();
        if scheduler.passes.is_empty() {
            return Ok(0);
        }
        log::debug!("optimizing with {:?}", scheduler.pass_names());
        scheduler.run_pipeline(module, ctx)
    }

    /// Builds the optimization sequence from the enabled passes.
    fn scheduler(&self) -> PassScheduler {
        let config = &self.config;
        let mut scheduler = PassScheduler::new(config.max_iterations, config.max_pass_iterations);
        if config.is_enabled(PassFlags::SCCP) {
            scheduler.add(ConstantPropagationPass::new());
        }
        if config.is_enabled(PassFlags::DCE) {
            scheduler.add(DeadCodeEliminationPass::new());
        }
        if config.is_enabled(PassFlags::CFG_SIMPLIFY) {
            scheduler.add(ControlFlowSimplificationPass::new());
        }
        if config.is_enabled(PassFlags::CSE) {
            scheduler.add(CommonSubexpressionPass::new());
        }
        if config.is_enabled(PassFlags::LICM) {
            scheduler.add(LicmPass::new());
        }
        if config.is_enabled(PassFlags::INLINE) {
            scheduler.add(InliningPass::new());
        }
        if config.is_enabled(PassFlags::COMBINE) {
            scheduler.add(InstructionCombiningPass::new());
        }
        if config.is_enabled(PassFlags::CFG_SIMPLIFY) {
            scheduler.add(ControlFlowSimplificationPass::new());
        }
        if config.is_enabled(PassFlags::FUNCTION_REMOVAL) {
            scheduler.add(FunctionRemovalPass::new());
        }
        scheduler
    }

    /// Runs the backend on an optimized module in SSA form.
    ///
    /// # Errors
    ///
    /// Returns an error if SSA destruction, instruction selection or register
    /// allocation fails.
    pub fn lower(&self, module: &mut Module, ctx: &CompilerContext) -> Result<Assembly> {
        for id in module.defined_functions() {
            let mut func = module.take_function(id);
            let result = destruct_ssa(&mut func, &ctx.events);
            module.restore_function(id, func);
            result?;
        }

        let mut assembly = Assembly::new(module);
        let selector = InstructionSelector::new(module, &self.registers);
        let allocator = RegisterAllocator::new(&self.registers, &self.allocator, &ctx.events);
        for id in module.defined_functions() {
            let mut mf = selector.select(id)?;
            assign_loop_depths(&mut mf, module.function(id))?;
            let stats = allocator.allocate(&mut mf)?;
            if stats.spilled > 0 {
                ctx.events
                    .record(EventKind::Info)
                    .function(mf.name.clone())
                    .message(format!(
                        "{} registers spilled over {} rounds",
                        stats.spilled, stats.rounds
                    ));
            }
            insert_prologue_epilogue(&mut mf);
            if self.config.is_enabled(PassFlags::PEEPHOLE) {
                run_peephole(&mut mf, &ctx.events);
            }
            assembly.push_function(mf);
        }
        Ok(assembly)
    }
}
