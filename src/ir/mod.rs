//! Control-flow-graph intermediate representation.
//!
//! The IR is a typed, LLVM-flavoured three-address form organised as
//! [`Module`] → [`Function`] → basic blocks → [`Inst`]. It is used in two shapes:
//!
//! - **Memory form**, as produced by [`FunctionBuilder`]: locals are `alloca` slots
//!   accessed through `load`/`store`.
//! - **SSA form**, after [`crate::ssa::construct_ssa`]: every register has exactly one
//!   static definition and control-flow merges are expressed with `phi`.
//!
//! # Key Components
//!
//! - [`Inst`] - Instruction sum type with def/use accessors
//! - [`Operand`] - Registers, parameters, global addresses and constants
//! - [`Function`] - Arena of blocks, instructions and registers with edge maintenance
//! - [`Module`] - Functions, globals, structures and the runtime library declarations
//! - [`FunctionBuilder`] - Pre-SSA construction API with a merged exit block

mod builder;
mod display;
mod function;
mod instruction;
mod module;
mod types;
mod value;

pub use builder::FunctionBuilder;
pub use display::{escape, FunctionDisplay};
pub use function::{BlockData, Function, Param, RegData};
pub use instruction::{BinaryOp, IcmpCond, Inst};
pub use module::{GlobalInit, GlobalVariable, Module, IO_BUILTINS};
pub use types::{IrType, StructDef};
pub use value::{BlockId, Constant, FuncId, GlobalId, InstId, Operand, RegId, StructId};
