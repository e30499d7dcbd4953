//! Dictionary layout nodes: the lookup-result-to-slot mapping for one
//! canonical generic owner.

use dashmap::DashSet;
use rustc_hash::{FxBuildHasher, FxHashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use veld_ir::{TargetDetails, TypeSystem, TypeSystemEntity};

use crate::emit::{ObjectDataBuilder, ObjectSection};
use crate::lookup::{
    ConditionalDependencyEdge, DependencyEdge, DependencyTarget, GenericLookupContext,
    GenericLookupResult,
};

/// Fatal layout inconsistency.
///
/// A slot miss with no fallback means other emitted code references a byte
/// offset this dictionary does not have — tolerating it would produce
/// memory-unsafe output, so the compilation aborts.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum DictionaryError {
    /// The scan and the compile phase disagreed about a slot.
    InconsistentLayout {
        owner: TypeSystemEntity,
        entry: GenericLookupResult,
    },
}

impl fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictionaryError::InconsistentLayout { owner, entry } => write!(
                f,
                "dictionary layout for {owner:?} has no slot for {entry}"
            ),
        }
    }
}

impl std::error::Error for DictionaryError {}

/// The slot-assignment contract for one canonical generic owner.
///
/// Exactly one layout node exists per owner, created once and cached for
/// the compilation's lifetime. Slot indices are permanent once handed out.
pub trait DictionaryLayout: Send + Sync {
    /// The canonical type or method this dictionary belongs to.
    fn owner(&self) -> TypeSystemEntity;

    /// Register a required lookup result.
    ///
    /// Only legal while the layout still has unfixed slots; precomputed
    /// layouts and frozen lazy layouts treat a call as a compiler
    /// phase-ordering bug.
    fn ensure_entry(&self, entry: GenericLookupResult);

    /// Slot index for `entry`.
    ///
    /// `Ok(None)` means the entry was deliberately discarded by the scanner
    /// and the caller must fall back to a slow-path lookup. A miss with no
    /// discard record is fatal.
    fn slot_for_entry(&self, entry: GenericLookupResult)
        -> Result<Option<u32>, DictionaryError>;

    /// All entries in slot order. Freezes lazily built layouts.
    fn entries(&self) -> Arc<[GenericLookupResult]>;

    /// Entries whose slots are known before freezing; used for
    /// conditional-dependency reporting.
    fn fixed_entries(&self) -> Arc<[GenericLookupResult]>;

    /// True once it is known the dictionary has no entries.
    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// True if slot assignment was determined at node creation time.
    fn has_fixed_slots(&self) -> bool;

    fn has_unfixed_slots(&self) -> bool {
        !self.has_fixed_slots()
    }

    /// Emit the dictionary body for one concrete instantiation: one
    /// pointer-sized cell per entry, in slot order.
    fn emit_dictionary_data(
        &self,
        builder: &mut ObjectDataBuilder,
        types: &TypeSystem,
        ctx: &GenericLookupContext,
        fixed_layout_only: bool,
    ) {
        let entries = if fixed_layout_only {
            self.fixed_entries()
        } else {
            self.entries()
        };
        for entry in entries.iter() {
            let offset_before = builder.count_bytes();
            entry.emit(builder, types, ctx);
            debug_assert_eq!(
                builder.count_bytes() - offset_before,
                builder.target().pointer_size as usize,
                "dictionary entry must emit exactly one pointer"
            );
        }
    }

    /// Unconditional dependency edges. Fixed-slot layouts pin the runtime
    /// support every fixed entry needs; unfixed layouts report nothing
    /// (their entries are runtime-determined).
    fn static_dependencies(&self) -> Vec<DependencyEdge> {
        if !self.has_fixed_slots() {
            return Vec::new();
        }
        let mut edges = Vec::new();
        for entry in self.fixed_entries().iter() {
            edges.extend(entry.dependencies());
        }
        edges
    }

    /// Conditional dependency edges: each fixed entry's template projection,
    /// conditioned on the owner's template layout being needed by the
    /// universal-generics loader. Only fixed-slot layouts have this edge,
    /// since template order must mirror the precomputed order exactly.
    fn conditional_dependencies(&self) -> Vec<ConditionalDependencyEdge> {
        debug_assert!(self.has_fixed_slots());
        let condition = DependencyTarget::TemplateLayout(self.owner());
        self.fixed_entries()
            .iter()
            .map(|entry| ConditionalDependencyEdge {
                target: DependencyTarget::TemplateEntry(entry.template_entry()),
                condition,
                reason: "Type loader template",
            })
            .collect()
    }

    /// Object section the emitted dictionary is placed in.
    fn section(&self, target: &TargetDetails) -> ObjectSection {
        ObjectSection::for_dictionary(target, self.owner())
    }
}

fn validate_owner(types: &TypeSystem, owner: TypeSystemEntity) {
    debug_assert!(
        types.is_canonical_owner(owner),
        "dictionary owner must be canonical: {owner:?}"
    );
}

/// Layout fixed at construction from a prior whole-program scan.
///
/// The scanner supplies the slot array and the set of lookups it decided to
/// discard; both are immutable from then on.
pub struct PrecomputedDictionaryLayout {
    owner: TypeSystemEntity,
    layout: Arc<[GenericLookupResult]>,
    discarded: FxHashSet<GenericLookupResult>,
}

impl PrecomputedDictionaryLayout {
    pub fn new(
        types: &TypeSystem,
        owner: TypeSystemEntity,
        layout: Vec<GenericLookupResult>,
        discarded: Vec<GenericLookupResult>,
    ) -> Self {
        validate_owner(types, owner);
        PrecomputedDictionaryLayout {
            owner,
            layout: layout.into(),
            discarded: discarded.into_iter().collect(),
        }
    }
}

impl DictionaryLayout for PrecomputedDictionaryLayout {
    fn owner(&self) -> TypeSystemEntity {
        self.owner
    }

    fn ensure_entry(&self, entry: GenericLookupResult) {
        panic!(
            "EnsureEntry on precomputed dictionary layout for {:?}: {entry}",
            self.owner
        );
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot counts are far below u32::MAX"
    )]
    fn slot_for_entry(
        &self,
        entry: GenericLookupResult,
    ) -> Result<Option<u32>, DictionaryError> {
        if let Some(slot) = self.layout.iter().position(|&e| e == entry) {
            return Ok(Some(slot as u32));
        }

        // A necessary type handle is always satisfiable by a stronger
        // constructed handle for the same type: deliberate widening.
        if let GenericLookupResult::NecessaryTypeHandle(ty) = entry {
            let widened = GenericLookupResult::TypeHandle(ty);
            if let Some(slot) = self.layout.iter().position(|&e| e == widened) {
                return Ok(Some(slot as u32));
            }
        }

        // A slot the scanner deliberately discarded: not present, no error.
        if self.discarded.contains(&entry) {
            return Ok(None);
        }

        // The scanner didn't see the need for this entry but the compile
        // phase did: a scan/compile discrepancy, fatal to prevent bad
        // codegen.
        Err(DictionaryError::InconsistentLayout {
            owner: self.owner,
            entry,
        })
    }

    fn entries(&self) -> Arc<[GenericLookupResult]> {
        Arc::clone(&self.layout)
    }

    fn fixed_entries(&self) -> Arc<[GenericLookupResult]> {
        Arc::clone(&self.layout)
    }

    fn has_fixed_slots(&self) -> bool {
        true
    }
}

/// Layout accumulated during code generation and frozen on first query.
///
/// Used when compilation runs without a prior scan, and for non-shared
/// per-method dictionaries. Registration is a concurrent insert-if-absent;
/// the first slot query sorts the accumulated set by the
/// [`GenericLookupResult`] total order and publishes it irrevocably.
pub struct LazilyBuiltDictionaryLayout {
    owner: TypeSystemEntity,
    pending: DashSet<GenericLookupResult, FxBuildHasher>,
    frozen: OnceLock<Arc<[GenericLookupResult]>>,
}

impl LazilyBuiltDictionaryLayout {
    pub fn new(types: &TypeSystem, owner: TypeSystemEntity) -> Self {
        validate_owner(types, owner);
        LazilyBuiltDictionaryLayout {
            owner,
            pending: DashSet::with_hasher(FxBuildHasher),
            frozen: OnceLock::new(),
        }
    }

    /// Sort and publish the accumulated set. Redundant racing computations
    /// all produce identical arrays (the order is total and the set no
    /// longer changes), so whichever publication wins is indistinguishable
    /// from the others.
    fn freeze(&self) -> &Arc<[GenericLookupResult]> {
        self.frozen.get_or_init(|| {
            let mut layout: Vec<GenericLookupResult> =
                self.pending.iter().map(|entry| *entry).collect();
            layout.sort_unstable();
            tracing::debug!(
                owner = ?self.owner,
                slots = layout.len(),
                "froze lazily built dictionary layout"
            );
            layout.into()
        })
    }
}

impl DictionaryLayout for LazilyBuiltDictionaryLayout {
    fn owner(&self) -> TypeSystemEntity {
        self.owner
    }

    fn ensure_entry(&self, entry: GenericLookupResult) {
        debug_assert!(
            self.frozen.get().is_none(),
            "entry registered after dictionary layout for {:?} was frozen",
            self.owner
        );
        self.pending.insert(entry);
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot counts are far below u32::MAX"
    )]
    fn slot_for_entry(
        &self,
        entry: GenericLookupResult,
    ) -> Result<Option<u32>, DictionaryError> {
        // Registration is complete by the first query, so a miss can only
        // mean EnsureEntry was never called for this requirement.
        match self.freeze().binary_search(&entry) {
            Ok(slot) => Ok(Some(slot as u32)),
            Err(_) => Err(DictionaryError::InconsistentLayout {
                owner: self.owner,
                entry,
            }),
        }
    }

    fn entries(&self) -> Arc<[GenericLookupResult]> {
        Arc::clone(self.freeze())
    }

    fn fixed_entries(&self) -> Arc<[GenericLookupResult]> {
        // Nothing is known before freezing.
        Arc::from(Vec::new())
    }

    fn has_fixed_slots(&self) -> bool {
        false
    }
}
