//! RV32IM code generation.
//!
//! The backend turns optimized IR, after SSA destruction, into assembly text.
//!
//! # Architecture
//!
//! ```text
//! IR (no phis) ──► InstructionSelector ──► MFunction (virtual registers)
//!                                              │  assign_loop_depths
//!                                              ▼
//!                                     RegisterAllocator
//!                         (liveness, interference, coalescing, spilling)
//!                                              │
//!                                              ▼
//!                  insert_prologue_epilogue ──► run_peephole ──► Assembly
//! ```
//!
//! # Key Components
//!
//! - [`RegisterFile`] - register partitions of the ABI, built once and passed
//!   explicitly
//! - [`InstructionSelector`] - IR to machine IR lowering
//! - [`Liveness`] - block-level live-in/live-out sets
//! - [`RegisterAllocator`] - iterated graph coloring
//! - [`Frame`] - stack layout and the prologue/epilogue
//! - [`run_peephole`] - local cleanups on allocated code
//! - [`Assembly`] - the emitted program

mod emit;
mod frame;
mod isel;
mod liveness;
mod mir;
mod peephole;
mod regalloc;
mod target;

pub use emit::{Assembly, DataItem};
pub use frame::{insert_prologue_epilogue, Frame, STACK_ALIGN};
pub use isel::{assign_loop_depths, InstructionSelector};
pub use liveness::Liveness;
pub use mir::{
    is_imm12, Address, AluImmOp, AluOp, BranchOp, Imm, MBlock, MBlockId, MFunction, MInst, Reg,
    StackSlot, Width,
};
pub use peephole::run_peephole;
pub use regalloc::{AllocationStats, RegisterAllocator};
pub use target::{PhysReg, RegisterFile, ARG_REGS};
