//! Handles and operands.
//!
//! All IR entities live in arenas owned by their [`crate::ir::Function`] or
//! [`crate::ir::Module`] and are referenced through small copyable handles. A
//! handle is only an index; membership (which block an instruction belongs to,
//! which function a block belongs to) is always a lookup in the owning arena.

use std::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Creates a handle from a raw arena index.
            #[must_use]
            #[inline]
            pub const fn new(index: usize) -> Self {
                $name(index)
            }

            /// Returns the raw arena index.
            #[must_use]
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Handle of a basic block within its function.
    BlockId,
    "bb"
);
define_handle!(
    /// Handle of an instruction within its function.
    InstId,
    "i"
);
define_handle!(
    /// Handle of an SSA register within its function.
    RegId,
    "r"
);
define_handle!(
    /// Handle of a function within its module.
    FuncId,
    "f"
);
define_handle!(
    /// Handle of a global variable within its module.
    GlobalId,
    "g"
);
define_handle!(
    /// Handle of a structure definition within its module.
    StructId,
    "s"
);

/// Compile-time constant operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constant {
    /// 32-bit integer (also used for `i8`).
    Int(i32),
    /// Boolean.
    Bool(bool),
    /// The null pointer.
    Null,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Null => write!(f, "null"),
        }
    }
}

/// A value read by an instruction.
///
/// String literals are not operands: they are globals with a string initializer and
/// are addressed through `getelementptr` on the global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operand {
    /// SSA register with exactly one static definition.
    Reg(RegId),
    /// Formal parameter by position.
    Param(usize),
    /// Address of a global variable.
    Global(GlobalId),
    /// Immediate constant.
    Const(Constant),
}

impl Operand {
    /// Integer constant operand.
    #[must_use]
    pub const fn int(value: i32) -> Self {
        Operand::Const(Constant::Int(value))
    }

    /// Boolean constant operand.
    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Operand::Const(Constant::Bool(value))
    }

    /// Null pointer operand.
    #[must_use]
    pub const fn null() -> Self {
        Operand::Const(Constant::Null)
    }

    /// Register handle, if this is a register.
    #[must_use]
    pub fn as_reg(self) -> Option<RegId> {
        match self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }

    /// Constant payload, if this is a constant.
    #[must_use]
    pub fn as_const(self) -> Option<Constant> {
        match self {
            Operand::Const(c) => Some(c),
            _ => None,
        }
    }

    /// Integer value of `Int` and `Bool` constants (`true` is 1).
    #[must_use]
    pub fn as_int(self) -> Option<i32> {
        match self {
            Operand::Const(Constant::Int(v)) => Some(v),
            Operand::Const(Constant::Bool(b)) => Some(i32::from(b)),
            _ => None,
        }
    }

    /// Returns `true` for immediate constants.
    #[must_use]
    pub fn is_const(self) -> bool {
        matches!(self, Operand::Const(_))
    }

    /// Returns `true` for the null pointer constant.
    #[must_use]
    pub fn is_null(self) -> bool {
        matches!(self, Operand::Const(Constant::Null))
    }
}

impl From<RegId> for Operand {
    fn from(reg: RegId) -> Self {
        Operand::Reg(reg)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Const(c)
    }
}
