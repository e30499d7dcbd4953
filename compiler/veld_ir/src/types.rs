//! Type, method and field classification data.

use crate::TypeId;
use smallvec::SmallVec;

/// Generic argument list. Most instantiations have arity 1 or 2.
pub type Instantiation = SmallVec<[TypeId; 4]>;

/// Shape classification of a type.
///
/// The field-layout dispatcher and the method-set builder both branch on
/// this; the order of the variants carries no meaning, dispatch priority
/// lives with the dispatcher.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeKind {
    /// Reference type with metadata-declared members.
    Class,
    /// Value type laid out from metadata.
    ValueType,
    /// Enum; underlying type is its single instance field.
    Enum,
    Interface,
    /// Delegate; invocation members are compiler-synthesized.
    Delegate,
    /// Single-dimensional, zero-based array.
    Array,
    /// Generic parameter (`T`), positional within its declaring type/method.
    GenericParam,
    /// The canonical-form marker type shared generic code is specialized on.
    Canon,
    /// 128-bit integer types with their own ABI-mandated layout.
    WideInteger,
    /// Fixed-size hardware SIMD vector (Vector64/128/256-style).
    HardwareVector,
    /// `Vector<T>`-style type whose width is target-dependent.
    VectorOfT,
    /// Aggregate expanded from a repeated-field (fixed-buffer) declaration.
    RepeatedFields,
}

impl TypeKind {
    /// True for types with value semantics.
    #[inline]
    pub fn is_value_type(self) -> bool {
        matches!(
            self,
            TypeKind::ValueType
                | TypeKind::Enum
                | TypeKind::WideInteger
                | TypeKind::HardwareVector
                | TypeKind::VectorOfT
                | TypeKind::RepeatedFields
        )
    }
}

bitflags::bitflags! {
    /// Auxiliary type attributes that are not captured by [`TypeKind`].
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeFlags: u8 {
        /// Derives from the attribute base class.
        const ATTRIBUTE = 1 << 0;
        /// Element type castable by size (integral types of equal width).
        const CASTABLE_BY_SIZE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Method attributes.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct MethodFlags: u8 {
        const VIRTUAL = 1 << 0;
        /// Compiler-synthesized (delegate invocation support).
        const SYNTHETIC = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Field attributes.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FieldFlags: u8 {
        const STATIC = 1 << 0;
        const THREAD_STATIC = 1 << 1;
    }
}
