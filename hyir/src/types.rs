//! Types module
//!
//! Structural types of values, globals and function signatures. Identified
//! struct types (`%struct.foo`) are referenced by name and resolved through
//! [`crate::module::Module::types`].
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Any type that may appear in a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    Void,

    /// Arbitrary-width integer (`i1`, `i32`, ...).
    Int(u32),

    Half,
    Float,
    Double,
    Fp128,

    /// Opaque pointer in the given address space.
    Ptr { addrspace: u32 },

    /// Fixed-size array `[N x T]`.
    Array { len: u64, elem: Box<Type> },

    /// Fixed-size vector `<N x T>`.
    Vector { len: u32, elem: Box<Type> },

    /// Literal structure `{ T, ... }` or packed `<{ T, ... }>`.
    Struct { fields: Vec<Type>, packed: bool },

    /// Identified structure type `%name`.
    Named(String),

    /// Basic-block label (only valid in branch/invoke targets).
    Label,
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);
    pub const PTR: Type = Type::Ptr { addrspace: 0 };

    pub fn ptr_in(addrspace: u32) -> Self {
        Type::Ptr { addrspace }
    }

    pub fn array(len: u64, elem: Type) -> Self {
        Type::Array {
            len,
            elem: Box::new(elem),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// Types that can be produced by instructions and passed as arguments.
    pub fn is_first_class(&self) -> bool {
        !matches!(self, Type::Void | Type::Label)
    }

    /// Types that survive signature reconstruction unchanged. Everything else
    /// is re-expressed as an opaque pointer.
    pub fn is_structurally_simple(&self) -> bool {
        matches!(
            self,
            Type::Void | Type::Int(_) | Type::Float | Type::Double | Type::Ptr { .. }
        )
    }
}

/// Signature of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub vararg: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_class_types() {
        assert!(Type::I32.is_first_class());
        assert!(Type::array(4, Type::I8).is_first_class());
        assert!(!Type::Void.is_first_class());
        assert!(!Type::Label.is_first_class());
    }

    #[test]
    fn structural_simplicity() {
        assert!(Type::ptr_in(3).is_structurally_simple());
        assert!(Type::Double.is_structurally_simple());
        assert!(!Type::Half.is_structurally_simple());
        assert!(!Type::Named("struct.foo".into()).is_structurally_simple());
    }
}
