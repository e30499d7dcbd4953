//! Field layout algorithm selection.
//!
//! The in-memory shape of a type is governed by exactly one algorithm,
//! selected by pure predicates checked in a fixed priority order:
//! runtime-determined > `Vector<T>` > hardware vector > wide integer >
//! repeated fields > ordinary metadata layout.

use veld_ir::{TargetDetails, TypeId, TypeKind, TypeSystem};

/// Computed in-memory shape of a type instance.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TypeLayout {
    pub size: u32,
    pub align: u32,
}

/// Which algorithm governs a type's layout.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FieldLayoutAlgorithmKind {
    RuntimeDetermined,
    VectorOfT,
    HardwareVector,
    WideInteger,
    RepeatedFields,
    Metadata,
}

/// One layout policy. Stateless; instances live on the context and are
/// shared by all threads.
pub trait FieldLayoutAlgorithm: Send + Sync {
    fn kind(&self) -> FieldLayoutAlgorithmKind;

    fn compute_layout(&self, types: &TypeSystem, ty: TypeId, target: &TargetDetails) -> TypeLayout;
}

/// Ordinary metadata-driven sequential layout.
pub(crate) struct MetadataFieldLayout;

impl MetadataFieldLayout {
    fn field_layout(&self, types: &TypeSystem, ty: TypeId, target: &TargetDetails) -> TypeLayout {
        let kind = types.kind(ty);
        if kind.is_value_type() {
            self.compute_layout(types, ty, target)
        } else {
            // Reference-typed fields are object pointers.
            TypeLayout {
                size: target.pointer_size,
                align: target.pointer_size,
            }
        }
    }
}

impl FieldLayoutAlgorithm for MetadataFieldLayout {
    fn kind(&self) -> FieldLayoutAlgorithmKind {
        FieldLayoutAlgorithmKind::Metadata
    }

    fn compute_layout(&self, types: &TypeSystem, ty: TypeId, target: &TargetDetails) -> TypeLayout {
        if let Some((size, align)) = types.explicit_size_align(ty) {
            return TypeLayout { size, align };
        }

        // Sequential layout: align each field, track the max alignment,
        // round the total up to it.
        let mut offset = 0u32;
        let mut align = 1u32;
        for field in types.fields_of(ty) {
            let fl = self.field_layout(types, types.field_type(field), target);
            align = align.max(fl.align);
            offset = offset.next_multiple_of(fl.align.max(1)) + fl.size;
        }
        TypeLayout {
            size: offset.next_multiple_of(align),
            align,
        }
    }
}

/// Layout of canonical/open types is not knowable at compile time; shared
/// code manipulates them by reference, so they report pointer shape.
pub(crate) struct RuntimeDeterminedFieldLayout;

impl FieldLayoutAlgorithm for RuntimeDeterminedFieldLayout {
    fn kind(&self) -> FieldLayoutAlgorithmKind {
        FieldLayoutAlgorithmKind::RuntimeDetermined
    }

    fn compute_layout(
        &self,
        _types: &TypeSystem,
        _ty: TypeId,
        target: &TargetDetails,
    ) -> TypeLayout {
        TypeLayout {
            size: target.pointer_size,
            align: target.pointer_size,
        }
    }
}

/// `Vector<T>`: width is a target property, not a metadata one.
pub(crate) struct VectorOfTFieldLayout;

impl FieldLayoutAlgorithm for VectorOfTFieldLayout {
    fn kind(&self) -> FieldLayoutAlgorithmKind {
        FieldLayoutAlgorithmKind::VectorOfT
    }

    fn compute_layout(
        &self,
        _types: &TypeSystem,
        _ty: TypeId,
        _target: &TargetDetails,
    ) -> TypeLayout {
        // 128-bit baseline; wider targets upgrade at codegen time.
        TypeLayout { size: 16, align: 16 }
    }
}

/// Fixed-width hardware vectors (Vector64/128/256-style).
pub(crate) struct HardwareVectorFieldLayout;

impl FieldLayoutAlgorithm for HardwareVectorFieldLayout {
    fn kind(&self) -> FieldLayoutAlgorithmKind {
        FieldLayoutAlgorithmKind::HardwareVector
    }

    fn compute_layout(
        &self,
        types: &TypeSystem,
        ty: TypeId,
        _target: &TargetDetails,
    ) -> TypeLayout {
        let (size, align) = types.explicit_size_align(ty).unwrap_or((16, 16));
        TypeLayout { size, align }
    }
}

/// 128-bit integers carry an ABI-mandated 16-byte alignment regardless of
/// what their two metadata fields would produce.
pub(crate) struct WideIntegerFieldLayout;

impl FieldLayoutAlgorithm for WideIntegerFieldLayout {
    fn kind(&self) -> FieldLayoutAlgorithmKind {
        FieldLayoutAlgorithmKind::WideInteger
    }

    fn compute_layout(
        &self,
        _types: &TypeSystem,
        _ty: TypeId,
        _target: &TargetDetails,
    ) -> TypeLayout {
        TypeLayout { size: 16, align: 16 }
    }
}

/// Aggregates expanded from repeated-field declarations: element layout
/// times the repetition count.
pub(crate) struct RepeatedFieldsFieldLayout;

impl FieldLayoutAlgorithm for RepeatedFieldsFieldLayout {
    fn kind(&self) -> FieldLayoutAlgorithmKind {
        FieldLayoutAlgorithmKind::RepeatedFields
    }

    fn compute_layout(&self, types: &TypeSystem, ty: TypeId, target: &TargetDetails) -> TypeLayout {
        match types.repeat_info(ty) {
            Some((element, count)) => {
                let inner = MetadataFieldLayout.compute_layout(types, element, target);
                TypeLayout {
                    size: inner.size.next_multiple_of(inner.align.max(1)) * count,
                    align: inner.align,
                }
            }
            None => MetadataFieldLayout.compute_layout(types, ty, target),
        }
    }
}

/// Select the algorithm kind for `ty` by the fixed priority order.
pub(crate) fn select_kind(types: &TypeSystem, ty: TypeId) -> FieldLayoutAlgorithmKind {
    if types.is_runtime_determined(ty) {
        FieldLayoutAlgorithmKind::RuntimeDetermined
    } else if types.kind(ty) == TypeKind::VectorOfT {
        FieldLayoutAlgorithmKind::VectorOfT
    } else if types.kind(ty) == TypeKind::HardwareVector {
        FieldLayoutAlgorithmKind::HardwareVector
    } else if types.kind(ty) == TypeKind::WideInteger {
        FieldLayoutAlgorithmKind::WideInteger
    } else if types.kind(ty) == TypeKind::RepeatedFields {
        FieldLayoutAlgorithmKind::RepeatedFields
    } else {
        FieldLayoutAlgorithmKind::Metadata
    }
}
