//! Generic lookup results: the facts a dictionary slot can hold.

use std::fmt;

use veld_ir::{FieldId, MethodId, TypeId, TypeSystem, TypeSystemEntity};

use crate::emit::{ObjectDataBuilder, RelocTarget};

/// One resolvable runtime fact occupying a dictionary slot.
///
/// Values are immutable and structurally compared: registering the same
/// fact twice collapses to one slot. The derived ordering (variant first,
/// payload handle second) is the total order dictionary layouts are sorted
/// by, which makes slot assignment reproducible regardless of registration
/// order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum GenericLookupResult {
    /// Constructed type handle: usable for allocation and casting.
    TypeHandle(TypeId),
    /// Necessary type handle: identity only, no constructed dependencies.
    NecessaryTypeHandle(TypeId),
    /// Boxed size of a type.
    TypeSize(TypeId),
    /// Entry point of a type's parameterless constructor.
    DefaultConstructor(TypeId),
    /// Thread-static storage base of a type.
    ThreadStaticBase(TypeId),
    /// Runtime method handle.
    MethodHandle(MethodId),
    /// Callable entry point of a method.
    MethodEntry(MethodId),
    /// Dictionary of a shared generic method.
    MethodDictionary(MethodId),
    /// Runtime field handle.
    FieldHandle(FieldId),
    /// Byte offset of an instance field.
    FieldOffset(FieldId),
}

impl GenericLookupResult {
    /// Short noun phrase for diagnostics.
    pub fn kind_name(self) -> &'static str {
        match self {
            GenericLookupResult::TypeHandle(_) => "type handle",
            GenericLookupResult::NecessaryTypeHandle(_) => "necessary type handle",
            GenericLookupResult::TypeSize(_) => "type size",
            GenericLookupResult::DefaultConstructor(_) => "default constructor",
            GenericLookupResult::ThreadStaticBase(_) => "thread-static base",
            GenericLookupResult::MethodHandle(_) => "method handle",
            GenericLookupResult::MethodEntry(_) => "method entry point",
            GenericLookupResult::MethodDictionary(_) => "method dictionary",
            GenericLookupResult::FieldHandle(_) => "field handle",
            GenericLookupResult::FieldOffset(_) => "field offset",
        }
    }

    /// The entity this lookup is about, before substitution.
    ///
    /// Field lookups resolve to their owning type; this is the referent the
    /// cycle detector counts an expansion edge against.
    pub fn subject(self, types: &TypeSystem) -> TypeSystemEntity {
        match self {
            GenericLookupResult::TypeHandle(t)
            | GenericLookupResult::NecessaryTypeHandle(t)
            | GenericLookupResult::TypeSize(t)
            | GenericLookupResult::DefaultConstructor(t)
            | GenericLookupResult::ThreadStaticBase(t) => TypeSystemEntity::Type(t),
            GenericLookupResult::MethodHandle(m)
            | GenericLookupResult::MethodEntry(m)
            | GenericLookupResult::MethodDictionary(m) => TypeSystemEntity::Method(m),
            GenericLookupResult::FieldHandle(f) | GenericLookupResult::FieldOffset(f) => {
                TypeSystemEntity::Type(types.field_owner(f))
            }
        }
    }

    /// Resolve this lookup against a concrete instantiation, yielding the
    /// relocation the dictionary slot holds.
    pub fn resolve(self, types: &TypeSystem, ctx: &GenericLookupContext) -> RelocTarget {
        match self {
            GenericLookupResult::TypeHandle(t) => {
                RelocTarget::TypeHandle(ctx.substitute_type(types, t))
            }
            GenericLookupResult::NecessaryTypeHandle(t) => {
                RelocTarget::NecessaryTypeHandle(ctx.substitute_type(types, t))
            }
            GenericLookupResult::TypeSize(t) => {
                RelocTarget::TypeSize(ctx.substitute_type(types, t))
            }
            GenericLookupResult::DefaultConstructor(t) => {
                RelocTarget::DefaultConstructor(ctx.substitute_type(types, t))
            }
            GenericLookupResult::ThreadStaticBase(t) => {
                RelocTarget::ThreadStaticBase(ctx.substitute_type(types, t))
            }
            GenericLookupResult::MethodHandle(m) => {
                RelocTarget::MethodHandle(ctx.substitute_method(types, m))
            }
            GenericLookupResult::MethodEntry(m) => {
                RelocTarget::MethodEntry(ctx.substitute_method(types, m))
            }
            GenericLookupResult::MethodDictionary(m) => {
                RelocTarget::MethodDictionary(ctx.substitute_method(types, m))
            }
            GenericLookupResult::FieldHandle(f) => RelocTarget::FieldHandle(f),
            GenericLookupResult::FieldOffset(f) => RelocTarget::FieldOffset(f),
        }
    }

    /// Emit this slot's value: exactly one pointer-sized relocation.
    pub fn emit(
        self,
        builder: &mut ObjectDataBuilder,
        types: &TypeSystem,
        ctx: &GenericLookupContext,
    ) {
        let target = self.resolve(types, ctx);
        builder.emit_pointer_reloc(target);
    }

    /// Runtime support this lookup requires beyond its slot relocation.
    ///
    /// Reported as unconditional dependency edges when the slot is fixed.
    pub fn dependencies(self) -> Vec<DependencyEdge> {
        match self {
            // A constructed handle means the type must actually be built.
            GenericLookupResult::TypeHandle(t)
            | GenericLookupResult::DefaultConstructor(t)
            | GenericLookupResult::ThreadStaticBase(t) => vec![DependencyEdge {
                target: DependencyTarget::ConstructedType(t),
                reason: "GenericLookupResultDependency",
            }],
            GenericLookupResult::MethodEntry(m) => vec![DependencyEdge {
                target: DependencyTarget::CompiledMethod(m),
                reason: "GenericLookupResultDependency",
            }],
            GenericLookupResult::MethodDictionary(m) => vec![DependencyEdge {
                target: DependencyTarget::MethodDictionary(m),
                reason: "GenericLookupResultDependency",
            }],
            // Identity-only lookups resolve from metadata alone.
            GenericLookupResult::NecessaryTypeHandle(_)
            | GenericLookupResult::TypeSize(_)
            | GenericLookupResult::MethodHandle(_)
            | GenericLookupResult::FieldHandle(_)
            | GenericLookupResult::FieldOffset(_) => Vec::new(),
        }
    }

    /// Projection consumed by the universal-generics loader.
    ///
    /// The loader rebuilds dictionaries for instantiations unseen at compile
    /// time from the template layout, so template entries mirror the slot's
    /// meaning one-for-one in slot order.
    pub fn template_entry(self) -> TemplateEntry {
        TemplateEntry(self)
    }

    /// Render with resolved names, for diagnostics.
    pub fn describe(self, types: &TypeSystem) -> String {
        let subject = match self {
            GenericLookupResult::FieldHandle(f) | GenericLookupResult::FieldOffset(f) => {
                format!(
                    "{}.{}",
                    types.display_type(types.field_owner(f)),
                    types.name_str(types.field_name(f))
                )
            }
            GenericLookupResult::MethodHandle(m)
            | GenericLookupResult::MethodEntry(m)
            | GenericLookupResult::MethodDictionary(m) => types.display_method(m),
            GenericLookupResult::TypeHandle(t)
            | GenericLookupResult::NecessaryTypeHandle(t)
            | GenericLookupResult::TypeSize(t)
            | GenericLookupResult::DefaultConstructor(t)
            | GenericLookupResult::ThreadStaticBase(t) => types.display_type(t),
        };
        format!("{} for {subject}", self.kind_name())
    }
}

impl fmt::Display for GenericLookupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.kind_name(), self.subject_raw())
    }
}

impl GenericLookupResult {
    fn subject_raw(self) -> u32 {
        match self {
            GenericLookupResult::TypeHandle(t)
            | GenericLookupResult::NecessaryTypeHandle(t)
            | GenericLookupResult::TypeSize(t)
            | GenericLookupResult::DefaultConstructor(t)
            | GenericLookupResult::ThreadStaticBase(t) => t.raw(),
            GenericLookupResult::MethodHandle(m)
            | GenericLookupResult::MethodEntry(m)
            | GenericLookupResult::MethodDictionary(m) => m.raw(),
            GenericLookupResult::FieldHandle(f) | GenericLookupResult::FieldOffset(f) => f.raw(),
        }
    }
}

/// Template-layout entry for one slot, in slot order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TemplateEntry(pub GenericLookupResult);

/// The concrete instantiation a dictionary body is emitted for.
#[derive(Clone, Debug)]
pub struct GenericLookupContext {
    pub owner: TypeSystemEntity,
    pub type_args: Vec<TypeId>,
    pub method_args: Vec<TypeId>,
}

impl GenericLookupContext {
    /// Context for a concrete instantiated type.
    pub fn for_type(types: &TypeSystem, ty: TypeId) -> Self {
        GenericLookupContext {
            owner: TypeSystemEntity::Type(ty),
            type_args: types.instantiation(ty).to_vec(),
            method_args: Vec::new(),
        }
    }

    /// Context for a concrete instantiated method.
    pub fn for_method(types: &TypeSystem, method: MethodId) -> Self {
        GenericLookupContext {
            owner: TypeSystemEntity::Method(method),
            type_args: types.instantiation(types.method_owner(method)).to_vec(),
            method_args: types.method_instantiation(method).to_vec(),
        }
    }

    fn substitute_type(&self, types: &TypeSystem, ty: TypeId) -> TypeId {
        types.substitute(ty, &self.type_args, &self.method_args)
    }

    fn substitute_method(&self, types: &TypeSystem, method: MethodId) -> MethodId {
        types.substitute_method(method, &self.type_args, &self.method_args)
    }
}

/// An unconditional dependency edge reported to the dependency graph.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DependencyEdge {
    pub target: DependencyTarget,
    pub reason: &'static str,
}

/// A dependency edge that only materializes once `condition` is marked.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConditionalDependencyEdge {
    pub target: DependencyTarget,
    pub condition: DependencyTarget,
    pub reason: &'static str,
}

/// Nodes of the surrounding dependency graph this core can point at.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DependencyTarget {
    /// The type must be constructed (vtable, GC layout) in the output.
    ConstructedType(TypeId),
    /// The method body must be compiled.
    CompiledMethod(MethodId),
    /// The method's own dictionary must exist.
    MethodDictionary(MethodId),
    /// The owner's template layout, consumed by the universal-generics
    /// loader.
    TemplateLayout(TypeSystemEntity),
    /// One template entry of a template layout.
    TemplateEntry(TemplateEntry),
}
