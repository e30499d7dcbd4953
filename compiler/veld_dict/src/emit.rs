//! Binary emission collaborators.
//!
//! A dictionary body is a flat pointer array: slot *i* lives at byte offset
//! *i* × pointer-size. The builder appends pointer-sized cells and records
//! a relocation per cell; the object writer patches the cells with final
//! addresses.

use veld_ir::{FieldId, MethodId, TargetDetails, TargetOs, TypeId, TypeSystemEntity};

/// Runtime artifact a dictionary cell points at.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum RelocTarget {
    TypeHandle(TypeId),
    NecessaryTypeHandle(TypeId),
    TypeSize(TypeId),
    DefaultConstructor(TypeId),
    ThreadStaticBase(TypeId),
    MethodHandle(MethodId),
    MethodEntry(MethodId),
    MethodDictionary(MethodId),
    FieldHandle(FieldId),
    FieldOffset(FieldId),
}

/// One recorded relocation: patch `size` bytes at `offset` with the address
/// of `target`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Reloc {
    pub offset: usize,
    pub size: u32,
    pub target: RelocTarget,
}

/// Object file section a dictionary is placed in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ObjectSection {
    /// Read-only data the linker may fold with identical content.
    FoldableReadOnlyData,
    /// Read-only data with identity (never folded).
    ReadOnlyData,
    /// Writable data.
    Data,
}

impl ObjectSection {
    /// Section placement for a dictionary owned by `owner`.
    ///
    /// Method dictionaries serve as an identity at runtime, so they are
    /// never foldable. Non-Windows targets use plain data sections.
    pub fn for_dictionary(target: &TargetDetails, owner: TypeSystemEntity) -> ObjectSection {
        if target.os == TargetOs::Windows {
            match owner {
                TypeSystemEntity::Type(_) => ObjectSection::FoldableReadOnlyData,
                TypeSystemEntity::Method(_) => ObjectSection::ReadOnlyData,
            }
        } else {
            ObjectSection::Data
        }
    }
}

/// Append-only builder for one emitted object blob.
pub struct ObjectDataBuilder {
    target: TargetDetails,
    bytes: Vec<u8>,
    relocs: Vec<Reloc>,
}

impl ObjectDataBuilder {
    pub fn new(target: TargetDetails) -> Self {
        ObjectDataBuilder {
            target,
            bytes: Vec::new(),
            relocs: Vec::new(),
        }
    }

    /// Current offset, in bytes.
    #[inline]
    pub fn count_bytes(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn target(&self) -> &TargetDetails {
        &self.target
    }

    /// Append one pointer-sized cell plus its relocation record.
    pub fn emit_pointer_reloc(&mut self, target: RelocTarget) {
        let offset = self.bytes.len();
        self.bytes.resize(offset + self.target.pointer_size as usize, 0);
        self.relocs.push(Reloc {
            offset,
            size: self.target.pointer_size,
            target,
        });
    }

    pub fn relocs(&self) -> &[Reloc] {
        &self.relocs
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the builder, yielding the raw bytes and relocations.
    pub fn into_parts(self) -> (Vec<u8>, Vec<Reloc>) {
        (self.bytes, self.relocs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veld_ir::{TypeFlags, TypeKind, TypeSystem};

    #[test]
    fn test_pointer_reloc_advances_by_pointer_size() {
        let ts = TypeSystem::new();
        let t = ts.define_type("T", TypeKind::Class, TypeFlags::empty());
        let mut builder = ObjectDataBuilder::new(TargetDetails::LP64);

        builder.emit_pointer_reloc(RelocTarget::TypeHandle(t));
        assert_eq!(builder.count_bytes(), 8);
        builder.emit_pointer_reloc(RelocTarget::NecessaryTypeHandle(t));
        assert_eq!(builder.count_bytes(), 16);

        assert_eq!(builder.relocs().len(), 2);
        assert_eq!(builder.relocs()[1].offset, 8);
        assert_eq!(builder.relocs()[1].size, 8);
    }

    #[test]
    fn test_method_dictionaries_are_not_foldable_on_windows() {
        let ts = TypeSystem::new();
        let t = ts.define_type("T", TypeKind::Class, TypeFlags::empty());
        let m = ts.define_method(t, "M", veld_ir::MethodFlags::empty());

        let ty_owner = TypeSystemEntity::Type(t);
        let method_owner = TypeSystemEntity::Method(m);
        assert_eq!(
            ObjectSection::for_dictionary(&TargetDetails::WIN64, ty_owner),
            ObjectSection::FoldableReadOnlyData
        );
        assert_eq!(
            ObjectSection::for_dictionary(&TargetDetails::WIN64, method_owner),
            ObjectSection::ReadOnlyData
        );
        assert_eq!(
            ObjectSection::for_dictionary(&TargetDetails::LP64, ty_owner),
            ObjectSection::Data
        );
    }
}
