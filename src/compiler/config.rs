//! Configuration for the optimization pipeline and the register allocator.
//!
//! Both configuration types are plain values passed explicitly to
//! [`crate::Compiler`]; there is no global state.

use bitflags::bitflags;

bitflags! {
    /// Set of optimization passes enabled in the pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassFlags: u32 {
        /// Sparse conditional constant propagation.
        const SCCP = 0x0001;
        /// Common subexpression elimination.
        const CSE = 0x0002;
        /// Loop-invariant code motion.
        const LICM = 0x0004;
        /// Dead code elimination.
        const DCE = 0x0008;
        /// Function inlining, including bounded recursive unrolling.
        const INLINE = 0x0010;
        /// Branch folding, block merging and unreachable block removal.
        const CFG_SIMPLIFY = 0x0020;
        /// Algebraic instruction combining.
        const COMBINE = 0x0040;
        /// Removal of functions unreachable from the entry function.
        const FUNCTION_REMOVAL = 0x0080;
        /// Machine-level peephole optimization.
        const PEEPHOLE = 0x0100;
    }
}

impl Default for PassFlags {
    fn default() -> Self {
        PassFlags::all()
    }
}

/// Configuration for the optimization pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Callees with more instructions than this are not inlined (default: 120).
    pub inline_threshold: usize,

    /// Number of times a self-recursive call is unrolled (default: 3).
    pub recursive_inline_depth: usize,

    /// Maximum iterations of the whole optimization loop (default: 64).
    pub max_iterations: usize,

    /// Maximum consecutive runs of a single pass before moving on (default: 64).
    pub max_pass_iterations: usize,

    /// Passes that take part in the pipeline.
    pub passes: PassFlags,

    /// Name of the program entry function (default: `main`).
    pub entry_function: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inline_threshold: 120,
            recursive_inline_depth: 3,
            max_iterations: 64,
            max_pass_iterations: 64,
            passes: PassFlags::default(),
            entry_function: "main".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that runs no optimization pass at all.
    ///
    /// SSA construction, destruction and register allocation still run.
    #[must_use]
    pub fn unoptimized() -> Self {
        Self {
            passes: PassFlags::empty(),
            ..Self::default()
        }
    }

    /// Sets the inlining size threshold.
    #[must_use]
    pub fn with_inline_threshold(mut self, threshold: usize) -> Self {
        self.inline_threshold = threshold;
        self
    }

    /// Sets the recursive unrolling depth.
    #[must_use]
    pub fn with_recursive_inline_depth(mut self, depth: usize) -> Self {
        self.recursive_inline_depth = depth;
        self
    }

    /// Sets the iteration bound of the optimization loop.
    #[must_use]
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Sets the bound on consecutive runs of one pass.
    #[must_use]
    pub fn with_max_pass_iterations(mut self, iterations: usize) -> Self {
        self.max_pass_iterations = iterations;
        self
    }

    /// Replaces the set of enabled passes.
    #[must_use]
    pub fn with_passes(mut self, passes: PassFlags) -> Self {
        self.passes = passes;
        self
    }

    /// Disables the given passes.
    #[must_use]
    pub fn without(mut self, passes: PassFlags) -> Self {
        self.passes.remove(passes);
        self
    }

    /// Sets the entry function name.
    #[must_use]
    pub fn with_entry_function(mut self, name: impl Into<String>) -> Self {
        self.entry_function = name.into();
        self
    }

    /// Returns true if the given pass is enabled.
    #[must_use]
    pub fn is_enabled(&self, pass: PassFlags) -> bool {
        self.passes.contains(pass)
    }
}

/// Configuration for the graph-coloring register allocator.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Number of allocatable physical registers (default: 28).
    pub colors: usize,

    /// Maximum number of build-color-spill rounds (default: 64).
    pub max_spill_iterations: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            colors: crate::backend::RegisterFile::rv32().allocatable().len(),
            max_spill_iterations: 64,
        }
    }
}

impl AllocatorConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the number of colors, for testing spill behavior.
    ///
    /// The value is clamped to the size of the register file.
    #[must_use]
    pub fn with_colors(mut self, colors: usize) -> Self {
        self.colors = colors.min(crate::backend::RegisterFile::rv32().allocatable().len());
        self
    }

    /// Sets the spill round bound.
    #[must_use]
    pub fn with_max_spill_iterations(mut self, iterations: usize) -> Self {
        self.max_spill_iterations = iterations;
        self
    }
}
