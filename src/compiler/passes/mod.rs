//! Built-in SSA optimization passes.
//!
//! Each pass operates on functions in SSA form, records what it changed in the
//! [`EventLog`](crate::compiler::EventLog) and reports whether anything
//! changed so that the [`PassScheduler`](crate::compiler::PassScheduler) can
//! drive the set to a fixpoint.
//!
//! # Standard Pipeline
//!
//! [`Compiler`](crate::Compiler) schedules the passes in this order:
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`ConstantPropagationPass`] | Sparse conditional constant propagation |
//! | [`DeadCodeEliminationPass`] | Removes instructions without observable effect |
//! | [`ControlFlowSimplificationPass`] | Branch folding, block merging, unreachable block removal |
//! | [`CommonSubexpressionPass`] | Dominator-scoped reuse of computed values, alias-aware for loads |
//! | [`LicmPass`] | Hoists loop-invariant computations into preheaders |
//! | [`InliningPass`] | Inlines small functions and unrolls direct recursion |
//! | [`InstructionCombiningPass`] | Algebraic simplification |
//! | [`ControlFlowSimplificationPass`] | Cleans up after inlining and combining |
//! | [`FunctionRemovalPass`] | Deletes functions unreachable from the entry function |
//!
//! Every pass can be disabled through
//! [`PassFlags`](crate::compiler::PassFlags).
//!
//! # Analysis Integration
//!
//! Passes compute the analyses they need in
//! [`SsaPass::initialize`](crate::compiler::SsaPass::initialize) or at the start
//! of each function run, never reusing results across CFG edits:
//!
//! - **Points-to** ([`Andersen`](crate::analysis::Andersen)): load availability
//!   in CSE and load hoisting in LICM
//! - **Side effects** ([`SideEffectChecker`](crate::analysis::SideEffectChecker)):
//!   DCE roots, CSE and LICM call barriers
//! - **Loops** ([`LoopForest`](crate::analysis::LoopForest)): LICM
//! - **Call graph** ([`CallGraph`](crate::analysis::CallGraph)): inlining and
//!   function removal

mod algebraic;
mod constants;
mod controlflow;
mod cse;
mod deadcode;
mod inlining;
mod licm;
mod utils;

pub use algebraic::InstructionCombiningPass;
pub use constants::ConstantPropagationPass;
pub use controlflow::ControlFlowSimplificationPass;
pub use cse::CommonSubexpressionPass;
pub use deadcode::{DeadCodeEliminationPass, FunctionRemovalPass};
pub use inlining::InliningPass;
pub use licm::LicmPass;
