// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # ssaforge
//!
//! An SSA optimizer and RV32IM backend for a small typed, LLVM-flavoured IR.
//!
//! A frontend builds a [`ir::Module`] in memory form (locals in `alloca`
//! slots) through [`ir::FunctionBuilder`]. The [`Compiler`] promotes it to SSA,
//! optimizes it to a fixpoint, leaves SSA again and lowers it to RISC-V
//! assembly text.
//!
//! ## Features
//!
//! - **SSA construction** - Lengauer-Tarjan dominators, pruned phi placement,
//!   iterative renaming
//! - **Optimizations** - SCCP, DCE, CFG simplification, CSE, LICM, inlining,
//!   instruction combining and unreachable-function removal
//! - **Analyses** - natural loops, call graph, side effects and
//!   inclusion-based points-to sets
//! - **Backend** - instruction selection with immediate folding, iterated
//!   register coalescing, spilling, frame layout and a peephole pass
//! - **Event log** - every transformation is recorded for inspection
//!
//! ## Quick Start
//!
//! ```rust
//! use ssaforge::prelude::*;
//!
//! let mut module = Module::new();
//! let print = module.require_function("printlnInt")?;
//! let main = module.declare_function("main", IrType::I32, vec![]);
//!
//! let mut b = FunctionBuilder::new(module.function_mut(main));
//! let sum = b.binary(BinaryOp::Add, Operand::int(2), Operand::int(3));
//! b.call(print, &IrType::Void, vec![sum]);
//! b.ret(Some(Operand::int(0)));
//! b.finish()?;
//!
//! let assembly = Compiler::default().compile(module)?;
//! assert!(assembly.to_string().contains("call\tprintlnInt"));
//! # Ok::<(), ssaforge::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - instructions, functions, modules and the builder
//! - [`analysis`] - CFG views, dominance, loops, call graph, side effects, points-to
//! - [`ssa`] - construction, destruction and verification of SSA form
//! - [`compiler`] - passes, the fixpoint scheduler, configuration, events and the driver
//! - [`backend`] - machine IR, instruction selection, register allocation, emission
//! - [`utils`] - bit sets and generic graph algorithms
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Broken IR invariants surface as
//! [`Error::InvariantViolation`] carrying the source location that detected
//! them:
//!
//! ```rust,ignore
//! match Compiler::default().compile(module) {
//!     Ok(asm) => println!("{asm}"),
//!     Err(Error::NotFunctional(name)) => eprintln!("{name} has several exits"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
pub mod prelude;

pub mod analysis;
pub mod backend;
pub mod compiler;
pub mod ir;
pub mod ssa;
pub mod utils;

/// `ssaforge` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ssaforge` Error type
pub use error::Error;

/// Compiles a module to assembly. See [`compiler::Compiler`].
pub use compiler::Compiler;

/// Emitted assembly. See [`backend::Assembly`].
pub use backend::Assembly;
