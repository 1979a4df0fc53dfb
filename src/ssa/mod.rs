//! Entering and leaving SSA form.
//!
//! - [`construct_ssa`] promotes stack slots to registers and places phis at
//!   iterated dominance frontiers.
//! - [`destruct_ssa`] lowers phis to parallel copies on (split) incoming edges
//!   and sequentializes them into moves.
//! - [`verify_ssa`] checks single definitions, phi/predecessor agreement and
//!   that definitions dominate their uses.
//!
//! All three work on one [`crate::ir::Function`] at a time and require every
//! block to be reachable from the entry.

mod construct;
mod destruct;
mod verify;

pub use construct::construct_ssa;
pub use destruct::destruct_ssa;
pub use verify::verify_ssa;
