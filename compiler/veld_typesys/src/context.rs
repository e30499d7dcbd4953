//! Compilation-wide type system context.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use veld_dict::{
    DictionaryLayout, GenericLookupResult, LazilyBuiltDictionaryLayout, PrecomputedDictionaryLayout,
};
use veld_diagnostic::Warning;
use veld_ir::{
    MethodFlags, MethodId, SharedTypeSystem, TargetDetails, TypeFlags, TypeId, TypeKind,
    TypeSystemEntity,
};

use crate::cycle::{CycleDetectorStats, ExpansionVerdict, GenericCycleDetector};
use crate::field_layout::{
    select_kind, FieldLayoutAlgorithm, FieldLayoutAlgorithmKind, HardwareVectorFieldLayout,
    MetadataFieldLayout, RepeatedFieldsFieldLayout, RuntimeDeterminedFieldLayout, TypeLayout,
    VectorOfTFieldLayout, WideIntegerFieldLayout,
};

/// How generic code sharing is compiled.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SharedGenericsMode {
    /// Reference-type instantiations share one canonical body and carry a
    /// generic dictionary. The normal AOT configuration.
    CanonicalReferenceTypes,
    /// Every instantiation gets its own body. No dictionaries exist.
    Disabled,
}

bitflags::bitflags! {
    /// Optional members synthesized onto delegate types.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct DelegateFeatures: u8 {
        /// `BeginInvoke`/`EndInvoke` pair alongside `Invoke`.
        const ASYNC_INVOKE = 1 << 0;
    }
}

/// Well-known types the context needs to recognize structurally.
#[derive(Copy, Clone, Debug)]
pub struct CoreTypes {
    /// The generic array definition; its interface list is the source of
    /// the array-covariance interface set.
    pub array_of_t: TypeId,
    /// Definition of the array enumerator type.
    pub array_enumerator_of_t: TypeId,
    /// Root attribute type, when the module defines one.
    pub attribute: Option<TypeId>,
}

/// Whole-program scan results: fixed dictionary layouts per canonical
/// owner, plus the entries the scan chose to discard.
#[derive(Default)]
pub struct PrecomputedLayoutProvider {
    layouts: FxHashMap<TypeSystemEntity, PrecomputedEntries>,
}

struct PrecomputedEntries {
    entries: Vec<GenericLookupResult>,
    discarded: Vec<GenericLookupResult>,
}

impl PrecomputedLayoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        owner: TypeSystemEntity,
        entries: Vec<GenericLookupResult>,
        discarded: Vec<GenericLookupResult>,
    ) {
        self.layouts
            .insert(owner, PrecomputedEntries { entries, discarded });
    }
}

struct LayoutAlgorithms {
    runtime_determined: RuntimeDeterminedFieldLayout,
    vector_of_t: VectorOfTFieldLayout,
    hardware_vector: HardwareVectorFieldLayout,
    wide_integer: WideIntegerFieldLayout,
    repeated_fields: RepeatedFieldsFieldLayout,
    metadata: MetadataFieldLayout,
}

/// The registrar the rest of the compiler talks to.
///
/// One context exists per compilation. All caches on it are published
/// through concurrent maps or `OnceLock` slots; racing threads may compute
/// redundantly but always converge on one shared value.
pub struct TypeSystemContext {
    types: SharedTypeSystem,
    target: TargetDetails,
    mode: SharedGenericsMode,
    core: CoreTypes,
    delegate_features: DelegateFeatures,
    cycle_detector: GenericCycleDetector,
    algorithms: LayoutAlgorithms,

    precomputed: Option<PrecomputedLayoutProvider>,
    layouts: DashMap<TypeSystemEntity, Arc<dyn DictionaryLayout>, FxBuildHasher>,
    delegate_info: DashMap<TypeId, Arc<[MethodId]>, FxBuildHasher>,

    array_interface_defs: OnceLock<Arc<[TypeId]>>,
    array_enumerator_interface_defs: OnceLock<Arc<[TypeId]>>,
}

impl TypeSystemContext {
    pub fn new(
        types: SharedTypeSystem,
        target: TargetDetails,
        mode: SharedGenericsMode,
        core: CoreTypes,
        delegate_features: DelegateFeatures,
    ) -> Self {
        TypeSystemContext {
            types,
            target,
            mode,
            core,
            delegate_features,
            cycle_detector: GenericCycleDetector::new(),
            algorithms: LayoutAlgorithms {
                runtime_determined: RuntimeDeterminedFieldLayout,
                vector_of_t: VectorOfTFieldLayout,
                hardware_vector: HardwareVectorFieldLayout,
                wide_integer: WideIntegerFieldLayout,
                repeated_fields: RepeatedFieldsFieldLayout,
                metadata: MetadataFieldLayout,
            },
            precomputed: None,
            layouts: DashMap::with_hasher(FxBuildHasher),
            delegate_info: DashMap::with_hasher(FxBuildHasher),
            array_interface_defs: OnceLock::new(),
            array_enumerator_interface_defs: OnceLock::new(),
        }
    }

    /// Install whole-program scan results. Must happen before the first
    /// `dictionary_layout` query; every owner from here on gets a fixed
    /// precomputed node instead of a lazily built one.
    pub fn with_precomputed_layouts(mut self, provider: PrecomputedLayoutProvider) -> Self {
        debug_assert!(
            self.layouts.is_empty(),
            "precomputed layouts installed after layout queries began"
        );
        self.precomputed = Some(provider);
        self
    }

    pub fn types(&self) -> &SharedTypeSystem {
        &self.types
    }

    pub fn target(&self) -> &TargetDetails {
        &self.target
    }

    pub fn shared_generics_mode(&self) -> SharedGenericsMode {
        self.mode
    }

    // ---- dictionary layouts -----------------------------------------------

    /// The unique dictionary layout node for a canonical generic owner.
    /// Everyone asking for the same owner gets the same node for the
    /// lifetime of the compilation.
    pub fn dictionary_layout(&self, owner: TypeSystemEntity) -> Arc<dyn DictionaryLayout> {
        debug_assert!(
            self.mode == SharedGenericsMode::CanonicalReferenceTypes,
            "dictionary layout requested with shared generics disabled"
        );
        let entry = self
            .layouts
            .entry(owner)
            .or_insert_with(|| self.build_layout(owner));
        Arc::clone(entry.value())
    }

    fn build_layout(&self, owner: TypeSystemEntity) -> Arc<dyn DictionaryLayout> {
        match &self.precomputed {
            Some(provider) => {
                // Owners the scan never reached get an empty fixed layout.
                let (entries, discarded) = provider
                    .layouts
                    .get(&owner)
                    .map_or((Vec::new(), Vec::new()), |p| {
                        (p.entries.clone(), p.discarded.clone())
                    });
                Arc::new(PrecomputedDictionaryLayout::new(
                    &self.types,
                    owner,
                    entries,
                    discarded,
                ))
            }
            None => Arc::new(LazilyBuiltDictionaryLayout::new(&self.types, owner)),
        }
    }

    // ---- field layout -----------------------------------------------------

    /// The algorithm governing a type's in-memory shape.
    pub fn layout_algorithm_for(&self, ty: TypeId) -> &dyn FieldLayoutAlgorithm {
        match select_kind(&self.types, ty) {
            FieldLayoutAlgorithmKind::RuntimeDetermined => &self.algorithms.runtime_determined,
            FieldLayoutAlgorithmKind::VectorOfT => &self.algorithms.vector_of_t,
            FieldLayoutAlgorithmKind::HardwareVector => &self.algorithms.hardware_vector,
            FieldLayoutAlgorithmKind::WideInteger => &self.algorithms.wide_integer,
            FieldLayoutAlgorithmKind::RepeatedFields => &self.algorithms.repeated_fields,
            FieldLayoutAlgorithmKind::Metadata => &self.algorithms.metadata,
        }
    }

    pub fn compute_layout(&self, ty: TypeId) -> TypeLayout {
        self.layout_algorithm_for(ty)
            .compute_layout(&self.types, ty, &self.target)
    }

    // ---- array covariance -------------------------------------------------

    /// Whether casting to `ty` may succeed through array covariance: arrays,
    /// the array enumerator, and the generic array interfaces, provided the
    /// element is a reference type or is castable by size.
    pub fn is_array_variant_castable(&self, ty: TypeId) -> bool {
        let element = if self.types.kind(ty) == TypeKind::Array {
            self.types.element_type(ty)
        } else if self.is_generic_array_interface_type(ty)
            || self.is_generic_array_enumerator_interface_type(ty)
            || self.types.definition(ty) == self.core.array_enumerator_of_t
        {
            self.types.instantiation(ty).first().copied()
        } else {
            None
        };
        let Some(element) = element else {
            return false;
        };
        !self.types.kind(element).is_value_type()
            || self
                .types
                .flags(element)
                .contains(TypeFlags::CASTABLE_BY_SIZE)
    }

    /// Instantiation of one of the interfaces arrays implement
    /// (`ICollection<T>` and friends).
    pub fn is_generic_array_interface_type(&self, ty: TypeId) -> bool {
        let defs = self.array_interface_defs.get_or_init(|| {
            self.interface_definitions_of(self.core.array_of_t)
        });
        !self.types.instantiation(ty).is_empty() && defs.contains(&self.types.definition(ty))
    }

    /// Instantiation of one of the interfaces the array enumerator
    /// implements.
    pub fn is_generic_array_enumerator_interface_type(&self, ty: TypeId) -> bool {
        let defs = self.array_enumerator_interface_defs.get_or_init(|| {
            self.interface_definitions_of(self.core.array_enumerator_of_t)
        });
        !self.types.instantiation(ty).is_empty() && defs.contains(&self.types.definition(ty))
    }

    fn interface_definitions_of(&self, ty: TypeId) -> Arc<[TypeId]> {
        self.types
            .interfaces_of(ty)
            .into_iter()
            .map(|i| self.types.definition(i))
            .collect()
    }

    pub fn is_attribute_type(&self, ty: TypeId) -> bool {
        let definition = self.types.definition(ty);
        self.types.flags(definition).contains(TypeFlags::ATTRIBUTE)
            || Some(definition) == self.core.attribute
    }

    // ---- method sets ------------------------------------------------------

    /// All members of `ty`, synthesized ones included.
    ///
    /// Dispatch is by category, in a fixed priority order: delegate, enum,
    /// value type, attribute-derived, then the metadata default. A delegate
    /// that also derives from the attribute root is still a delegate.
    pub fn all_methods(&self, ty: TypeId) -> Vec<MethodId> {
        let kind = self.types.kind(ty);
        if kind == TypeKind::Delegate {
            self.delegate_methods(ty)
        } else if kind == TypeKind::Enum {
            self.enum_methods(ty)
        } else if kind.is_value_type() {
            self.value_type_methods(ty)
        } else if self.is_attribute_type(ty) {
            self.attribute_methods(ty)
        } else {
            self.types.methods_of(ty)
        }
    }

    pub fn all_virtual_methods(&self, ty: TypeId) -> Vec<MethodId> {
        self.all_methods(ty)
            .into_iter()
            .filter(|&m| self.types.method_flags(m).contains(MethodFlags::VIRTUAL))
            .collect()
    }

    /// Enums carry only their metadata-declared members.
    fn enum_methods(&self, ty: TypeId) -> Vec<MethodId> {
        self.types.methods_of(ty)
    }

    /// Value types carry only their metadata-declared members; boxing
    /// thunks are a codegen concern, not a member-set one.
    fn value_type_methods(&self, ty: TypeId) -> Vec<MethodId> {
        self.types.methods_of(ty)
    }

    /// Attribute-derived types carry only their metadata-declared members.
    fn attribute_methods(&self, ty: TypeId) -> Vec<MethodId> {
        self.types.methods_of(ty)
    }

    fn delegate_methods(&self, ty: TypeId) -> Vec<MethodId> {
        let definition = self.types.definition(ty);
        let synthetic = Arc::clone(
            self.delegate_info
                .entry(definition)
                .or_insert_with(|| self.synthesize_delegate_methods(definition))
                .value(),
        );
        let mut methods: Vec<MethodId> = if ty == definition {
            synthetic.to_vec()
        } else {
            synthetic
                .iter()
                .map(|&m| self.types.method_on_type(m, ty))
                .collect()
        };
        // Synthesized members land in the registry too; chain only the
        // metadata-declared remainder behind them.
        methods.extend(self.types.methods_of(ty).into_iter().filter(|&m| {
            !self.types.method_flags(m).contains(MethodFlags::SYNTHETIC)
        }));
        methods
    }

    fn synthesize_delegate_methods(&self, definition: TypeId) -> Arc<[MethodId]> {
        let mut methods = vec![self.types.define_method(
            definition,
            "Invoke",
            MethodFlags::VIRTUAL | MethodFlags::SYNTHETIC,
        )];
        if self.delegate_features.contains(DelegateFeatures::ASYNC_INVOKE) {
            methods.push(self.types.define_method(
                definition,
                "BeginInvoke",
                MethodFlags::VIRTUAL | MethodFlags::SYNTHETIC,
            ));
            methods.push(self.types.define_method(
                definition,
                "EndInvoke",
                MethodFlags::VIRTUAL | MethodFlags::SYNTHETIC,
            ));
        }
        Arc::from(methods)
    }

    // ---- cycle detection --------------------------------------------------

    /// Route a generic-expansion edge through the cycle detector.
    pub fn detect_generic_cycles(
        &self,
        owner: TypeSystemEntity,
        referent: TypeSystemEntity,
    ) -> ExpansionVerdict {
        self.cycle_detector.detect(&self.types, owner, referent)
    }

    pub fn cycle_detector_stats(&self) -> CycleDetectorStats {
        self.cycle_detector.stats()
    }

    /// Materialize the deferred cycle warnings. Call once at the end of
    /// compilation; later reports are dropped.
    pub fn log_warnings(&self) -> Vec<Warning> {
        let warnings = self.cycle_detector.warnings().flush();
        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        warnings
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veld_ir::TypeSystem;

    struct Fixture {
        ctx: TypeSystemContext,
    }

    impl Fixture {
        fn new(features: DelegateFeatures) -> Self {
            let types = SharedTypeSystem::new();
            let t0 = types.generic_param(0, false);

            let array = types.define_type("Array", TypeKind::Class, TypeFlags::empty());
            let enumerator =
                types.define_type("ArrayEnumerator", TypeKind::Class, TypeFlags::empty());
            let icollection =
                types.define_type("ICollection", TypeKind::Interface, TypeFlags::empty());
            let ienumerator =
                types.define_type("IEnumerator", TypeKind::Interface, TypeFlags::empty());
            types.set_interfaces(array, vec![types.instantiate(icollection, &[t0])]);
            types.set_interfaces(enumerator, vec![types.instantiate(ienumerator, &[t0])]);

            let attribute = types.define_type("Attribute", TypeKind::Class, TypeFlags::empty());
            let core = CoreTypes {
                array_of_t: array,
                array_enumerator_of_t: enumerator,
                attribute: Some(attribute),
            };
            let ctx = TypeSystemContext::new(
                types,
                TargetDetails::LP64,
                SharedGenericsMode::CanonicalReferenceTypes,
                core,
                features,
            );
            Fixture { ctx }
        }

        fn types(&self) -> &TypeSystem {
            &self.ctx.types
        }
    }

    #[test]
    fn test_dictionary_layout_is_cached_per_owner() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let node = types.define_type("Node", TypeKind::Class, TypeFlags::empty());
        let owner = TypeSystemEntity::from(types.instantiate(node, &[types.canon_type()]));

        let first = f.ctx.dictionary_layout(owner);
        let second = f.ctx.dictionary_layout(owner);
        assert!(Arc::ptr_eq(&first, &second));

        // Lazily built by default.
        assert!(!first.has_fixed_slots());
        let entry = GenericLookupResult::TypeHandle(types.generic_param(0, false));
        first.ensure_entry(entry);
        assert_eq!(second.slot_for_entry(entry).unwrap(), Some(0));
    }

    #[test]
    fn test_precomputed_provider_builds_fixed_layouts() {
        let f = Fixture::new(DelegateFeatures::empty());
        let (owner, entry) = {
            let types = f.types();
            let node = types.define_type("Node", TypeKind::Class, TypeFlags::empty());
            let owner = TypeSystemEntity::from(types.instantiate(node, &[types.canon_type()]));
            let entry = GenericLookupResult::TypeHandle(types.generic_param(0, false));
            (owner, entry)
        };

        let mut provider = PrecomputedLayoutProvider::new();
        provider.insert(owner, vec![entry], Vec::new());
        let ctx = f.ctx.with_precomputed_layouts(provider);

        let layout = ctx.dictionary_layout(owner);
        assert!(layout.has_fixed_slots());
        assert_eq!(layout.slot_for_entry(entry).unwrap(), Some(0));

        // Unknown owners resolve to an empty fixed layout, not a lazy one.
        let other = {
            let types = ctx.types();
            let other = types.define_type("Other", TypeKind::Class, TypeFlags::empty());
            TypeSystemEntity::from(types.instantiate(other, &[types.canon_type()]))
        };
        let empty = ctx.dictionary_layout(other);
        assert!(empty.is_empty());
        assert!(empty.has_fixed_slots());
    }

    #[test]
    fn test_array_variant_castable() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let object = types.define_type("Object", TypeKind::Class, TypeFlags::empty());
        let int = types.define_primitive("int", 4, 4);
        let uint = types.define_type(
            "uint",
            TypeKind::ValueType,
            TypeFlags::CASTABLE_BY_SIZE,
        );

        assert!(f.ctx.is_array_variant_castable(types.array_of(object)));
        assert!(!f.ctx.is_array_variant_castable(types.array_of(int)));
        // Same-size primitives stay castable through covariance.
        assert!(f.ctx.is_array_variant_castable(types.array_of(uint)));
        assert!(!f.ctx.is_array_variant_castable(object));
    }

    #[test]
    fn test_generic_array_interfaces_are_variant_castable() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let object = types.define_type("Object", TypeKind::Class, TypeFlags::empty());
        let icollection_def = types.definition(
            types.interfaces_of(f.ctx.core.array_of_t)[0],
        );
        let icollection_object = types.instantiate(icollection_def, &[object]);

        assert!(f.ctx.is_generic_array_interface_type(icollection_object));
        assert!(!f.ctx.is_generic_array_interface_type(icollection_def));
        assert!(f.ctx.is_array_variant_castable(icollection_object));
    }

    #[test]
    fn test_delegate_methods_chain_synthetic_before_metadata() {
        let f = Fixture::new(DelegateFeatures::ASYNC_INVOKE);
        let types = f.types();
        let action = types.define_type("Action", TypeKind::Delegate, TypeFlags::empty());
        types.define_method(action, "ToString", MethodFlags::VIRTUAL);

        let names: Vec<String> = f
            .ctx
            .all_methods(action)
            .into_iter()
            .map(|m| types.name_str(types.method_name(m)))
            .collect();
        assert_eq!(names, ["Invoke", "BeginInvoke", "EndInvoke", "ToString"]);

        // Second query reuses the synthesized members.
        assert_eq!(f.ctx.all_methods(action), f.ctx.all_methods(action));
    }

    #[test]
    fn test_method_dispatch_consults_categories_in_priority_order() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();

        // Attribute-derived class: metadata members through the attribute
        // arm, recognized by flag or by descent from the attribute root.
        let marker = types.define_type("Obsolete", TypeKind::Class, TypeFlags::ATTRIBUTE);
        let decl = types.define_method(marker, "Message", MethodFlags::empty());
        assert!(f.ctx.is_attribute_type(marker));
        assert!(f.ctx.is_attribute_type(f.ctx.core.attribute.unwrap()));
        assert!(!f.ctx.is_attribute_type(f.ctx.core.array_of_t));
        assert_eq!(f.ctx.all_methods(marker), vec![decl]);

        // Enums and value types resolve to their metadata members.
        let color = types.define_type("Color", TypeKind::Enum, TypeFlags::empty());
        let point = types.define_type("Point", TypeKind::ValueType, TypeFlags::empty());
        let pm = types.define_method(point, "Offset", MethodFlags::empty());
        assert!(f.ctx.all_methods(color).is_empty());
        assert_eq!(f.ctx.all_methods(point), vec![pm]);

        // The delegate arm wins over the attribute predicate.
        let handler =
            types.define_type("Handler", TypeKind::Delegate, TypeFlags::ATTRIBUTE);
        let names: Vec<String> = f
            .ctx
            .all_methods(handler)
            .into_iter()
            .map(|m| types.name_str(types.method_name(m)))
            .collect();
        assert_eq!(names, ["Invoke"]);
    }

    #[test]
    fn test_delegate_methods_without_async_invoke() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let action = types.define_type("Action", TypeKind::Delegate, TypeFlags::empty());

        let names: Vec<String> = f
            .ctx
            .all_methods(action)
            .into_iter()
            .map(|m| types.name_str(types.method_name(m)))
            .collect();
        assert_eq!(names, ["Invoke"]);
    }

    #[test]
    fn test_instantiated_delegate_methods_are_specialized() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let func = types.define_type("Func", TypeKind::Delegate, TypeFlags::empty());
        let int = types.define_primitive("int", 4, 4);
        let func_int = types.instantiate(func, &[int]);

        let methods = f.ctx.all_methods(func_int);
        assert_eq!(methods.len(), 1);
        assert_eq!(types.method_owner(methods[0]), func_int);
        assert!(types
            .method_flags(methods[0])
            .contains(MethodFlags::VIRTUAL | MethodFlags::SYNTHETIC));
    }

    #[test]
    fn test_layout_algorithm_dispatch_priority() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let wide = types.define_type("Int128", TypeKind::WideInteger, TypeFlags::empty());
        assert_eq!(
            f.ctx.layout_algorithm_for(wide).kind(),
            FieldLayoutAlgorithmKind::WideInteger
        );
        assert_eq!(f.ctx.compute_layout(wide), TypeLayout { size: 16, align: 16 });

        let node = types.define_type("Node", TypeKind::Class, TypeFlags::empty());
        let canon_node = types.instantiate(node, &[types.canon_type()]);
        assert_eq!(
            f.ctx.layout_algorithm_for(canon_node).kind(),
            FieldLayoutAlgorithmKind::RuntimeDetermined
        );
        assert_eq!(
            f.ctx.compute_layout(canon_node),
            TypeLayout { size: 8, align: 8 }
        );
    }

    #[test]
    fn test_log_warnings_flushes_once() {
        let f = Fixture::new(DelegateFeatures::empty());
        let types = f.types();
        let node = types.define_type("Node", TypeKind::Class, TypeFlags::empty());
        let mut owner = TypeSystemEntity::from(types.instantiate(node, &[types.canon_type()]));
        let mut inst = types.instantiate(node, &[types.canon_type()]);
        for _ in 0..8 {
            inst = types.instantiate(node, &[inst]);
            let referent = TypeSystemEntity::from(inst);
            let _ = f.ctx.detect_generic_cycles(owner, referent);
            owner = referent;
        }

        let warnings = f.ctx.log_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(f.ctx.log_warnings().is_empty());
    }
}
