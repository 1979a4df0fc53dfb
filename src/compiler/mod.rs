//! Optimization pipeline and compiler driver.
//!
//! This module sits between the analyses and code generation:
//!
//! - [`crate::analysis`]: CFG, dominance, loops, call graph, points-to, side effects
//! - [`compiler`](self): SSA optimization passes, scheduling, the [`Compiler`] driver
//! - [`crate::backend`]: instruction selection, register allocation, emission
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Configuration and event log        │
//! │    ├─ PipelineConfig          (thresholds, pass toggles)         │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution                  │
//! │    ├─ each pass runs until it reports no change                  │
//! │    └─ the sequence repeats until a sweep changes nothing         │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │    ├─ run_on_function()       Per-function transformation        │
//! │    ├─ run_global()            Module-wide transformation         │
//! │    ├─ initialize()            Analyses computed before each run  │
//! │    └─ finalize()              Cleanup after each run             │
//! │                                                                  │
//! │  Passes                      Optimization transformations        │
//! │    ├─ Value: SCCP, CSE, instruction combining                    │
//! │    ├─ CFG: branch folding, block merging, unreachable blocks     │
//! │    ├─ Loops: LICM                                                │
//! │    └─ Interprocedural: inlining, DCE, function removal           │
//! │                                                                  │
//! │  Compiler                    Frontend IR → RV32IM assembly       │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod driver;
mod events;
mod pass;
mod passes;
mod scheduler;

pub use config::{AllocatorConfig, PassFlags, PipelineConfig};
pub use context::CompilerContext;
pub use driver::Compiler;
pub use events::{DerivedStats, Event, EventKind, EventLog};
pub use pass::SsaPass;
pub use passes::{
    CommonSubexpressionPass, ConstantPropagationPass, ControlFlowSimplificationPass,
    DeadCodeEliminationPass, FunctionRemovalPass, InliningPass, InstructionCombiningPass,
    LicmPass,
};
pub use scheduler::PassScheduler;
