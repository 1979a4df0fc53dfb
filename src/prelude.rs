//! # ssaforge Prelude
//!
//! ```rust
//! use ssaforge::prelude::*;
//! ```

pub use crate::{Error, Result};

pub use crate::ir::{
    BinaryOp, BlockId, Constant, FuncId, FunctionBuilder, GlobalInit, IcmpCond, Inst, IrType,
    Module, Operand, Param,
};

pub use crate::ssa::{construct_ssa, destruct_ssa, verify_ssa};

pub use crate::analysis::{DominanceInfo, LoopForest};

pub use crate::compiler::{
    AllocatorConfig, Compiler, CompilerContext, EventKind, EventLog, PassFlags, PassScheduler,
    PipelineConfig, SsaPass,
};

pub use crate::backend::{Assembly, MFunction, RegisterFile};
