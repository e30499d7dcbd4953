//! Compact handles for types, methods and fields.

use std::fmt;

/// Handle to a type in the [`TypeSystem`](crate::TypeSystem) registry.
///
/// Handle equality is structural equality: the registry deduplicates
/// instantiations, so two `TypeId`s compare equal exactly when they denote
/// the same type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TypeId(pub(crate) u32);

/// Handle to a method in the registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct MethodId(pub(crate) u32);

/// Handle to a field in the registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FieldId(pub(crate) u32);

impl TypeId {
    /// Get the raw index value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl MethodId {
    /// Get the raw index value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl FieldId {
    /// Get the raw index value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Debug for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodId({})", self.0)
    }
}

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldId({})", self.0)
    }
}

/// A canonical generic owner: the type or method whose dictionary is being
/// laid out, and the key the cycle detector counts against.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TypeSystemEntity {
    Type(TypeId),
    Method(MethodId),
}

impl TypeSystemEntity {
    /// Stable sort key for deterministic diagnostics output.
    pub fn sort_key(self) -> (u8, u32) {
        match self {
            TypeSystemEntity::Type(t) => (0, t.raw()),
            TypeSystemEntity::Method(m) => (1, m.raw()),
        }
    }
}

impl From<TypeId> for TypeSystemEntity {
    fn from(t: TypeId) -> Self {
        TypeSystemEntity::Type(t)
    }
}

impl From<MethodId> for TypeSystemEntity {
    fn from(m: MethodId) -> Self {
        TypeSystemEntity::Method(m)
    }
}
