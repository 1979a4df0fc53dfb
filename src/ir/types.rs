//! IR type system.
//!
//! The IR is typed in the LLVM style: every register, parameter and global has an
//! [`IrType`]. Structures are nominal and referenced through a [`StructId`] so that
//! self-referential layouts (linked lists, trees) can be expressed without cycles in
//! the type value itself. Sizes and member offsets are resolved by the owning
//! [`crate::ir::Module`], which holds the structure definitions.
//!
//! The target is 32-bit, so pointers and `i32` both occupy 4 bytes while `i1` and
//! `i8` occupy a single byte.

use std::fmt;

use crate::ir::{Constant, StructId};

/// A first-class IR type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IrType {
    /// No value (function results only).
    Void,
    /// Boolean.
    I1,
    /// Byte, used for string characters.
    I8,
    /// 32-bit two's complement integer.
    I32,
    /// Pointer to a value of the inner type.
    Pointer(Box<IrType>),
    /// Nominal structure defined in the module.
    Struct(StructId),
}

impl IrType {
    /// Builds a pointer type to `inner`.
    #[must_use]
    pub fn pointer_to(inner: IrType) -> Self {
        IrType::Pointer(Box::new(inner))
    }

    /// Returns `true` for pointer types.
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer(_))
    }

    /// Returns `true` for `i1`, `i8` and `i32`.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, IrType::I1 | IrType::I8 | IrType::I32)
    }

    /// Returns `true` for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    /// Returns the pointee of a pointer type.
    #[must_use]
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// The value an SSA local takes on a path where it was never assigned.
    ///
    /// Returns `None` for `void` and structures, which never live in registers.
    #[must_use]
    pub fn default_value(&self) -> Option<Constant> {
        match self {
            IrType::I1 => Some(Constant::Bool(false)),
            IrType::I8 | IrType::I32 => Some(Constant::Int(0)),
            IrType::Pointer(_) => Some(Constant::Null),
            IrType::Void | IrType::Struct(_) => None,
        }
    }

    /// Size in bytes of non-structure types.
    ///
    /// Structure sizes depend on the member list and are computed by
    /// [`crate::ir::Module::size_of`].
    #[must_use]
    pub fn scalar_size(&self) -> Option<u32> {
        match self {
            IrType::Void => Some(0),
            IrType::I1 | IrType::I8 => Some(1),
            IrType::I32 | IrType::Pointer(_) => Some(4),
            IrType::Struct(_) => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::I1 => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I32 => write!(f, "i32"),
            IrType::Pointer(inner) => write!(f, "{inner}*"),
            IrType::Struct(id) => write!(f, "%struct.{}", id.index()),
        }
    }
}

/// Named structure layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    /// Source-level name of the structure.
    pub name: String,
    /// Member types in declaration order.
    pub members: Vec<IrType>,
}

/// Rounds `offset` up to a multiple of `align`.
#[must_use]
pub(crate) fn align_to(offset: u32, align: u32) -> u32 {
    if align <= 1 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(IrType::I1.default_value(), Some(Constant::Bool(false)));
        assert_eq!(IrType::I32.default_value(), Some(Constant::Int(0)));
        assert_eq!(
            IrType::pointer_to(IrType::I8).default_value(),
            Some(Constant::Null)
        );
        assert_eq!(IrType::Void.default_value(), None);
    }

    #[test]
    fn test_display() {
        let ty = IrType::pointer_to(IrType::pointer_to(IrType::I32));
        assert_eq!(ty.to_string(), "i32**");
        assert_eq!(IrType::Struct(StructId::new(3)).to_string(), "%struct.3");
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 4), 0);
        assert_eq!(align_to(1, 4), 4);
        assert_eq!(align_to(5, 1), 5);
        assert_eq!(align_to(8, 4), 8);
    }
}
