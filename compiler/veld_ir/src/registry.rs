//! Append-only type system registry.
//!
//! The registry owns every type, method and field record the compilation
//! knows about and deduplicates structurally identical generic
//! instantiations, so `TypeId` equality is type identity. All descriptors
//! are pre-validated by the frontend; queries here never fail.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::{
    FieldFlags, FieldId, Instantiation, MethodFlags, MethodId, Name, StringInterner, TypeFlags,
    TypeId, TypeKind, TypeSystemEntity,
};

#[derive(Clone, Debug)]
struct TypeRecord {
    name: Name,
    kind: TypeKind,
    flags: TypeFlags,
    /// `Some` for instantiated types; points at the generic definition.
    definition: Option<TypeId>,
    instantiation: Instantiation,
    /// Element type for arrays.
    element: Option<TypeId>,
    /// Position for generic parameters.
    param_index: u32,
    param_from_method: bool,
    /// Interface definitions implemented by this definition.
    interfaces: Vec<TypeId>,
    /// Instance fields declared on this definition, in declaration order.
    fields: Vec<FieldId>,
    /// Explicit size/alignment for primitives.
    size_align: Option<(u32, u32)>,
    /// Element repetition count for repeated-field aggregates.
    repeat_count: u32,
}

impl TypeRecord {
    fn named(name: Name, kind: TypeKind, flags: TypeFlags) -> Self {
        TypeRecord {
            name,
            kind,
            flags,
            definition: None,
            instantiation: Instantiation::new(),
            element: None,
            param_index: 0,
            param_from_method: false,
            interfaces: Vec::new(),
            fields: Vec::new(),
            size_align: None,
            repeat_count: 0,
        }
    }
}

#[derive(Clone, Debug)]
struct MethodRecord {
    name: Name,
    owner: TypeId,
    /// `Some` for specialized methods; points at the metadata definition.
    definition: Option<MethodId>,
    instantiation: Instantiation,
    flags: MethodFlags,
}

#[derive(Clone, Debug)]
struct FieldRecord {
    name: Name,
    owner: TypeId,
    ty: TypeId,
    flags: FieldFlags,
}

/// Deduplication key for derived types.
#[derive(Clone, Eq, PartialEq, Hash)]
enum TypeKey {
    Instantiated(TypeId, Instantiation),
    Array(TypeId),
    Param(u32, bool),
}

/// Deduplication key for specialized methods.
#[derive(Clone, Eq, PartialEq, Hash)]
struct MethodKey {
    definition: MethodId,
    owner: TypeId,
    instantiation: Instantiation,
}

#[derive(Default)]
struct Registry {
    types: Vec<TypeRecord>,
    type_dedup: FxHashMap<TypeKey, TypeId>,
    methods: Vec<MethodRecord>,
    method_dedup: FxHashMap<MethodKey, MethodId>,
    fields: Vec<FieldRecord>,
}

impl Registry {
    fn push_type(&mut self, record: TypeRecord) -> TypeId {
        let id = u32::try_from(self.types.len())
            .unwrap_or_else(|_| panic!("type registry exceeded u32::MAX entries"));
        self.types.push(record);
        TypeId(id)
    }

    fn push_method(&mut self, record: MethodRecord) -> MethodId {
        let id = u32::try_from(self.methods.len())
            .unwrap_or_else(|_| panic!("method registry exceeded u32::MAX entries"));
        self.methods.push(record);
        MethodId(id)
    }
}

/// The type system registry.
///
/// # Thread Safety
/// A single `RwLock` guards the tables. Creation paths double-check the
/// dedup maps under the write lock, so racing work items converge on one
/// handle per structural identity. Locks are never held across calls back
/// into the registry.
pub struct TypeSystem {
    names: StringInterner,
    inner: RwLock<Registry>,
    canon: TypeId,
}

impl TypeSystem {
    /// Create a registry with the canonical-form marker pre-defined.
    pub fn new() -> Self {
        let names = StringInterner::new();
        let canon_name = names.intern("__Canon");
        let mut registry = Registry::default();
        let canon = registry.push_type(TypeRecord::named(
            canon_name,
            TypeKind::Canon,
            TypeFlags::empty(),
        ));
        TypeSystem {
            names,
            inner: RwLock::new(registry),
            canon,
        }
    }

    /// The canonical-form marker type (`__Canon`).
    #[inline]
    pub fn canon_type(&self) -> TypeId {
        self.canon
    }

    /// Intern an identifier.
    pub fn intern_name(&self, s: &str) -> Name {
        self.names.intern(s)
    }

    /// Resolve an interned identifier.
    pub fn name_str(&self, name: Name) -> String {
        self.names.resolve(name)
    }

    // ---- definitions ------------------------------------------------------

    /// Define a new (possibly generic) type.
    pub fn define_type(&self, name: &str, kind: TypeKind, flags: TypeFlags) -> TypeId {
        let name = self.names.intern(name);
        self.inner
            .write()
            .push_type(TypeRecord::named(name, kind, flags))
    }

    /// Define a primitive value type with an explicit size and alignment.
    pub fn define_primitive(&self, name: &str, size: u32, align: u32) -> TypeId {
        let name = self.names.intern(name);
        let mut record = TypeRecord::named(name, TypeKind::ValueType, TypeFlags::empty());
        record.size_align = Some((size, align));
        self.inner.write().push_type(record)
    }

    /// Define an aggregate expanded from a repeated-field declaration:
    /// `count` consecutive copies of `element`.
    pub fn define_repeated_field_type(&self, name: &str, element: TypeId, count: u32) -> TypeId {
        let name = self.names.intern(name);
        let mut record = TypeRecord::named(name, TypeKind::RepeatedFields, TypeFlags::empty());
        record.element = Some(element);
        record.repeat_count = count;
        self.inner.write().push_type(record)
    }

    /// Element type and repetition count of a repeated-field aggregate.
    pub fn repeat_info(&self, ty: TypeId) -> Option<(TypeId, u32)> {
        let record = self.inner.read().types[ty.0 as usize].clone();
        match (record.kind, record.element) {
            (TypeKind::RepeatedFields, Some(element)) => Some((element, record.repeat_count)),
            _ => None,
        }
    }

    /// Set the interface definitions a type definition implements.
    pub fn set_interfaces(&self, definition: TypeId, interfaces: Vec<TypeId>) {
        self.inner.write().types[definition.0 as usize].interfaces = interfaces;
    }

    /// Declare a field on a type definition.
    pub fn define_field(&self, owner: TypeId, name: &str, ty: TypeId, flags: FieldFlags) -> FieldId {
        let name = self.names.intern(name);
        let mut guard = self.inner.write();
        let id = u32::try_from(guard.fields.len())
            .unwrap_or_else(|_| panic!("field registry exceeded u32::MAX entries"));
        guard.fields.push(FieldRecord {
            name,
            owner,
            ty,
            flags,
        });
        let field = FieldId(id);
        guard.types[owner.0 as usize].fields.push(field);
        field
    }

    /// Declare a method on a type definition.
    pub fn define_method(&self, owner: TypeId, name: &str, flags: MethodFlags) -> MethodId {
        let name = self.names.intern(name);
        self.inner.write().push_method(MethodRecord {
            name,
            owner,
            definition: None,
            instantiation: Instantiation::new(),
            flags,
        })
    }

    // ---- derived types ----------------------------------------------------

    /// Instantiate a generic definition over concrete (or canonical)
    /// arguments. Structurally identical instantiations share one handle.
    pub fn instantiate(&self, definition: TypeId, args: &[TypeId]) -> TypeId {
        let instantiation: Instantiation = args.iter().copied().collect();
        let key = TypeKey::Instantiated(definition, instantiation.clone());
        let mut guard = self.inner.write();
        if let Some(&existing) = guard.type_dedup.get(&key) {
            return existing;
        }
        let def_record = guard.types[definition.0 as usize].clone();
        let mut record = TypeRecord::named(def_record.name, def_record.kind, def_record.flags);
        record.definition = Some(definition);
        record.instantiation = instantiation;
        let id = guard.push_type(record);
        guard.type_dedup.insert(key, id);
        id
    }

    /// Single-dimensional array of `element`.
    pub fn array_of(&self, element: TypeId) -> TypeId {
        let key = TypeKey::Array(element);
        let mut guard = self.inner.write();
        if let Some(&existing) = guard.type_dedup.get(&key) {
            return existing;
        }
        let name = guard.types[element.0 as usize].name;
        let mut record = TypeRecord::named(name, TypeKind::Array, TypeFlags::empty());
        record.element = Some(element);
        let id = guard.push_type(record);
        guard.type_dedup.insert(key, id);
        id
    }

    /// Positional generic parameter (`T0`, `T1`, ... / `M0`, `M1`, ...).
    pub fn generic_param(&self, index: u32, from_method: bool) -> TypeId {
        let key = TypeKey::Param(index, from_method);
        {
            let guard = self.inner.read();
            if let Some(&existing) = guard.type_dedup.get(&key) {
                return existing;
            }
        }
        let prefix = if from_method { "M" } else { "T" };
        let name = self.names.intern(&format!("{prefix}{index}"));
        let mut guard = self.inner.write();
        if let Some(&existing) = guard.type_dedup.get(&key) {
            return existing;
        }
        let mut record = TypeRecord::named(name, TypeKind::GenericParam, TypeFlags::empty());
        record.param_index = index;
        record.param_from_method = from_method;
        let id = guard.push_type(record);
        guard.type_dedup.insert(key, id);
        id
    }

    /// Instantiate a generic method definition.
    pub fn instantiate_method(&self, definition: MethodId, args: &[TypeId]) -> MethodId {
        let owner = self.inner.read().methods[definition.0 as usize].owner;
        self.specialize_method(definition, owner, args)
    }

    /// Specialize a method definition for an instantiated owner type.
    pub fn method_on_type(&self, definition: MethodId, owner: TypeId) -> MethodId {
        let instantiation = self.inner.read().methods[definition.0 as usize]
            .instantiation
            .clone();
        self.specialize_method(definition, owner, &instantiation)
    }

    fn specialize_method(&self, definition: MethodId, owner: TypeId, args: &[TypeId]) -> MethodId {
        let instantiation: Instantiation = args.iter().copied().collect();
        let key = MethodKey {
            definition,
            owner,
            instantiation: instantiation.clone(),
        };
        let mut guard = self.inner.write();
        if let Some(&existing) = guard.method_dedup.get(&key) {
            return existing;
        }
        let def_record = guard.methods[definition.0 as usize].clone();
        let id = guard.push_method(MethodRecord {
            name: def_record.name,
            owner,
            definition: Some(definition),
            instantiation,
            flags: def_record.flags,
        });
        guard.method_dedup.insert(key, id);
        id
    }

    // ---- queries ----------------------------------------------------------

    pub fn kind(&self, ty: TypeId) -> TypeKind {
        self.inner.read().types[ty.0 as usize].kind
    }

    pub fn flags(&self, ty: TypeId) -> TypeFlags {
        self.inner.read().types[ty.0 as usize].flags
    }

    pub fn type_name(&self, ty: TypeId) -> Name {
        self.inner.read().types[ty.0 as usize].name
    }

    /// The generic definition of an instantiated type, or the type itself.
    pub fn definition(&self, ty: TypeId) -> TypeId {
        self.inner.read().types[ty.0 as usize]
            .definition
            .unwrap_or(ty)
    }

    pub fn instantiation(&self, ty: TypeId) -> Instantiation {
        self.inner.read().types[ty.0 as usize].instantiation.clone()
    }

    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        self.inner.read().types[ty.0 as usize].element
    }

    /// Interface definitions implemented by the definition of `ty`.
    pub fn interfaces_of(&self, ty: TypeId) -> Vec<TypeId> {
        let definition = self.definition(ty);
        self.inner.read().types[definition.0 as usize]
            .interfaces
            .clone()
    }

    /// Instance fields declared on the definition of `ty`.
    pub fn fields_of(&self, ty: TypeId) -> Vec<FieldId> {
        let definition = self.definition(ty);
        self.inner.read().types[definition.0 as usize].fields.clone()
    }

    /// Metadata-declared methods of `ty`, specialized for its
    /// instantiation when `ty` is an instantiated type.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "method count is bounded by the u32 check in push_method"
    )]
    pub fn methods_of(&self, ty: TypeId) -> Vec<MethodId> {
        let definition = self.definition(ty);
        let declared: Vec<MethodId> = {
            let guard = self.inner.read();
            guard
                .methods
                .iter()
                .enumerate()
                .filter(|(_, m)| m.owner == definition && m.definition.is_none())
                .map(|(i, _)| MethodId(i as u32))
                .collect()
        };
        if definition == ty {
            return declared;
        }
        declared
            .into_iter()
            .map(|m| self.method_on_type(m, ty))
            .collect()
    }

    pub fn method_name(&self, method: MethodId) -> Name {
        self.inner.read().methods[method.0 as usize].name
    }

    pub fn method_owner(&self, method: MethodId) -> TypeId {
        self.inner.read().methods[method.0 as usize].owner
    }

    /// The metadata definition of a specialized method, or the method itself.
    pub fn method_definition(&self, method: MethodId) -> MethodId {
        self.inner.read().methods[method.0 as usize]
            .definition
            .unwrap_or(method)
    }

    pub fn method_instantiation(&self, method: MethodId) -> Instantiation {
        self.inner.read().methods[method.0 as usize]
            .instantiation
            .clone()
    }

    pub fn method_flags(&self, method: MethodId) -> MethodFlags {
        self.inner.read().methods[method.0 as usize].flags
    }

    pub fn field_name(&self, field: FieldId) -> Name {
        self.inner.read().fields[field.0 as usize].name
    }

    pub fn field_owner(&self, field: FieldId) -> TypeId {
        self.inner.read().fields[field.0 as usize].owner
    }

    pub fn field_type(&self, field: FieldId) -> TypeId {
        self.inner.read().fields[field.0 as usize].ty
    }

    pub fn field_flags(&self, field: FieldId) -> FieldFlags {
        self.inner.read().fields[field.0 as usize].flags
    }

    /// Explicit size/alignment for primitives.
    pub fn explicit_size_align(&self, ty: TypeId) -> Option<(u32, u32)> {
        self.inner.read().types[ty.0 as usize].size_align
    }

    // ---- canonical-form queries -------------------------------------------

    /// True if `ty` is, or is instantiated over, the canonical marker.
    pub fn is_canonical_subtype(&self, ty: TypeId) -> bool {
        let record = self.inner.read().types[ty.0 as usize].clone();
        if record.kind == TypeKind::Canon {
            return true;
        }
        if let Some(element) = record.element {
            return self.is_canonical_subtype(element);
        }
        record
            .instantiation
            .iter()
            .any(|&arg| self.is_canonical_subtype(arg))
    }

    /// True if `ty` mentions a generic parameter anywhere.
    pub fn contains_generic_param(&self, ty: TypeId) -> bool {
        let record = self.inner.read().types[ty.0 as usize].clone();
        if record.kind == TypeKind::GenericParam {
            return true;
        }
        if let Some(element) = record.element {
            return self.contains_generic_param(element);
        }
        record
            .instantiation
            .iter()
            .any(|&arg| self.contains_generic_param(arg))
    }

    /// True if the in-memory shape of `ty` depends on the generic context it
    /// runs under.
    pub fn is_runtime_determined(&self, ty: TypeId) -> bool {
        self.contains_generic_param(ty) || self.is_canonical_subtype(ty)
    }

    /// True if `method` compiles once and is reused across instantiations
    /// through its dictionary.
    pub fn is_shared_by_generic_instantiations(&self, method: MethodId) -> bool {
        let owner = self.method_owner(method);
        self.method_instantiation(method)
            .iter()
            .any(|&arg| self.is_runtime_determined(arg))
            || self.is_runtime_determined(owner)
    }

    /// True if `entity` is a valid canonical dictionary owner.
    pub fn is_canonical_owner(&self, entity: TypeSystemEntity) -> bool {
        match entity {
            TypeSystemEntity::Type(t) => self.is_canonical_subtype(t),
            TypeSystemEntity::Method(m) => self.is_shared_by_generic_instantiations(m),
        }
    }

    // ---- substitution -----------------------------------------------------

    /// Replace generic parameters in `ty` with the given concrete arguments.
    pub fn substitute(&self, ty: TypeId, type_args: &[TypeId], method_args: &[TypeId]) -> TypeId {
        let record = self.inner.read().types[ty.0 as usize].clone();
        match record.kind {
            TypeKind::GenericParam => {
                let args = if record.param_from_method {
                    method_args
                } else {
                    type_args
                };
                args.get(record.param_index as usize).copied().unwrap_or(ty)
            }
            TypeKind::Array => match record.element {
                Some(element) => self.array_of(self.substitute(element, type_args, method_args)),
                None => ty,
            },
            _ => match record.definition {
                Some(definition) => {
                    let substituted: Vec<TypeId> = record
                        .instantiation
                        .iter()
                        .map(|&arg| self.substitute(arg, type_args, method_args))
                        .collect();
                    self.instantiate(definition, &substituted)
                }
                None => ty,
            },
        }
    }

    /// Replace generic parameters in a method's owner and instantiation.
    pub fn substitute_method(
        &self,
        method: MethodId,
        type_args: &[TypeId],
        method_args: &[TypeId],
    ) -> MethodId {
        let definition = self.method_definition(method);
        let owner = self.substitute(self.method_owner(method), type_args, method_args);
        let substituted: Vec<TypeId> = self
            .method_instantiation(method)
            .iter()
            .map(|&arg| self.substitute(arg, type_args, method_args))
            .collect();
        self.specialize_method(definition, owner, &substituted)
    }

    // ---- display ----------------------------------------------------------

    /// Human-readable rendering of a type, for diagnostics.
    pub fn display_type(&self, ty: TypeId) -> String {
        let record = self.inner.read().types[ty.0 as usize].clone();
        match record.kind {
            TypeKind::Array => match record.element {
                Some(element) => format!("{}[]", self.display_type(element)),
                None => self.names.resolve(record.name),
            },
            _ if record.instantiation.is_empty() => self.names.resolve(record.name),
            _ => {
                let args: Vec<String> = record
                    .instantiation
                    .iter()
                    .map(|&arg| self.display_type(arg))
                    .collect();
                format!("{}<{}>", self.names.resolve(record.name), args.join(", "))
            }
        }
    }

    /// Human-readable rendering of a method, for diagnostics.
    pub fn display_method(&self, method: MethodId) -> String {
        let record = self.inner.read().methods[method.0 as usize].clone();
        let owner = self.display_type(record.owner);
        let name = self.names.resolve(record.name);
        if record.instantiation.is_empty() {
            format!("{owner}::{name}")
        } else {
            let args: Vec<String> = record
                .instantiation
                .iter()
                .map(|&arg| self.display_type(arg))
                .collect();
            format!("{owner}::{name}<{}>", args.join(", "))
        }
    }

    /// Human-readable rendering of a dictionary owner.
    pub fn display_entity(&self, entity: TypeSystemEntity) -> String {
        match entity {
            TypeSystemEntity::Type(t) => self.display_type(t),
            TypeSystemEntity::Method(m) => self.display_method(m),
        }
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared type system handle for concurrent compilation phases.
///
/// This newtype enforces that all cross-thread sharing of the registry goes
/// through one handle type rather than ad-hoc `Arc<TypeSystem>` plumbing.
#[derive(Clone)]
pub struct SharedTypeSystem(Arc<TypeSystem>);

impl SharedTypeSystem {
    pub fn new() -> Self {
        SharedTypeSystem(Arc::new(TypeSystem::new()))
    }
}

impl Default for SharedTypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for SharedTypeSystem {
    type Target = TypeSystem;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for SharedTypeSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTypeSystem").finish_non_exhaustive()
    }
}
