//! Bounding recursive generic expansion.
//!
//! Walking "what must a shared instantiation's dictionary reference" can
//! diverge: a recursive generic wrapper instantiated over itself is a valid
//! but infinite family. The detector bounds the walk with two per-owner
//! counters and turns cutoff exceedance into a conservative fallback plus a
//! deferred warning, never an error.

use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use veld_diagnostic::DeferredWarnings;
use veld_ir::{TypeSystem, TypeSystemEntity};

/// Chosen rather arbitrarily. For the app that was being profiled, a cutoff
/// point of 7 compiled for more than 10 minutes; 5 produced a 1.7 GB object
/// file, 4 an 830 MB one, 3 a 470 MB one. High enough not to cut off real
/// code too early, low enough that recursion that also expands laterally
/// through the generic code it calls into stays tractable.
pub const DEFAULT_DEPTH_CUTOFF: u32 = 4;

pub const DEFAULT_BREADTH_CUTOFF: usize = 10;

/// Whether the caller may keep expanding along an edge.
///
/// On `Suppress` the caller substitutes the conservative canonical
/// representation for the referent instead of expanding it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[must_use]
pub enum ExpansionVerdict {
    Expand,
    Suppress,
}

/// Counter totals, read out for end-of-run diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct CycleDetectorStats {
    /// Entities ever reached through an expansion edge.
    pub entities_tracked: usize,
    /// Edges suppressed by either cutoff.
    pub suppressed_edges: usize,
}

/// Per-owner depth/breadth counters bounding generic expansion.
///
/// State persists for the whole compilation. Counters for one owner are
/// only touched by whichever thread expands that owner; no cross-owner
/// synchronization exists beyond the sharded maps.
pub struct GenericCycleDetector {
    depth_cutoff: u32,
    breadth_cutoff: usize,
    /// Chain position an entity was first reached at. Entities never seen
    /// as a referent sit at position 0.
    positions: DashMap<TypeSystemEntity, u32, FxBuildHasher>,
    /// Distinct referents reached from one owner at one chain position.
    breadth: DashMap<(TypeSystemEntity, u32), FxHashSet<TypeSystemEntity>, FxBuildHasher>,
    warnings: DeferredWarnings,
    suppressed: AtomicUsize,
}

impl GenericCycleDetector {
    pub fn new() -> Self {
        Self::with_cutoffs(DEFAULT_DEPTH_CUTOFF, DEFAULT_BREADTH_CUTOFF)
    }

    /// The two cutoffs are independent: depth bounds the length of one
    /// expansion chain, breadth bounds lateral fan-out at one position.
    pub fn with_cutoffs(depth_cutoff: u32, breadth_cutoff: usize) -> Self {
        GenericCycleDetector {
            depth_cutoff,
            breadth_cutoff,
            positions: DashMap::with_hasher(FxBuildHasher),
            breadth: DashMap::with_hasher(FxBuildHasher),
            warnings: DeferredWarnings::new(),
            suppressed: AtomicUsize::new(0),
        }
    }

    /// Record the expansion edge `owner -> referent` and decide whether the
    /// caller may keep expanding along it.
    pub fn detect(
        &self,
        types: &TypeSystem,
        owner: TypeSystemEntity,
        referent: TypeSystemEntity,
    ) -> ExpansionVerdict {
        let owner_position = self.positions.get(&owner).map_or(0, |p| *p);
        let candidate = owner_position + 1;

        if candidate > self.depth_cutoff {
            return self.suppress(types, owner, "depth", u64::from(candidate));
        }

        {
            let mut set = self.breadth.entry((owner, candidate)).or_default();
            if !set.contains(&referent) {
                if set.len() >= self.breadth_cutoff {
                    drop(set);
                    let count = self.breadth_cutoff as u64 + 1;
                    return self.suppress(types, owner, "breadth", count);
                }
                set.insert(referent);
            }
        }

        // First position wins: a referent reachable through both a short
        // and a long chain is charged for the short one.
        self.positions.entry(referent).or_insert(candidate);
        ExpansionVerdict::Expand
    }

    fn suppress(
        &self,
        types: &TypeSystem,
        owner: TypeSystemEntity,
        which: &str,
        count: u64,
    ) -> ExpansionVerdict {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(owner = ?owner, cutoff = which, "suppressed generic expansion");
        self.warnings.report(
            owner,
            format!(
                "generic expansion from '{}' exceeded the {which} cutoff at {count} and was \
                 truncated; the instantiation falls back to its canonical form",
                types.display_entity(owner)
            ),
        );
        ExpansionVerdict::Suppress
    }

    /// Counter totals for end-of-run diagnostics.
    pub fn stats(&self) -> CycleDetectorStats {
        CycleDetectorStats {
            entities_tracked: self.positions.len(),
            suppressed_edges: self.suppressed.load(Ordering::Relaxed),
        }
    }

    /// The deferred warning queue; flushed exactly once by the context
    /// after all compilation completes.
    pub fn warnings(&self) -> &DeferredWarnings {
        &self.warnings
    }
}

impl Default for GenericCycleDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veld_ir::{TypeFlags, TypeId, TypeKind};

    fn wrapper_chain(ts: &TypeSystem, depth: usize) -> Vec<TypeSystemEntity> {
        // Wrap<Canon>, Wrap<Wrap<Canon>>, ... : the classic recursive
        // wrapper family.
        let wrap = ts.define_type("Wrap", TypeKind::ValueType, TypeFlags::empty());
        let mut current: TypeId = ts.canon_type();
        let mut chain = Vec::new();
        for _ in 0..depth {
            current = ts.instantiate(wrap, &[current]);
            chain.push(TypeSystemEntity::Type(current));
        }
        chain
    }

    #[test]
    fn test_depth_suppresses_exactly_at_cutoff_plus_one() {
        let ts = TypeSystem::new();
        let depth_cutoff = 4;
        let detector = GenericCycleDetector::with_cutoffs(depth_cutoff, 1000);
        let chain = wrapper_chain(&ts, depth_cutoff as usize + 1);

        let root = TypeSystemEntity::Type(ts.canon_type());
        let mut from = root;
        for (i, &to) in chain.iter().enumerate() {
            let verdict = detector.detect(&ts, from, to);
            if i < depth_cutoff as usize {
                assert_eq!(verdict, ExpansionVerdict::Expand, "edge {}", i + 1);
            } else {
                assert_eq!(verdict, ExpansionVerdict::Suppress, "edge {}", i + 1);
            }
            from = to;
        }
        assert_eq!(detector.stats().suppressed_edges, 1);
    }

    #[test]
    fn test_breadth_suppresses_exactly_at_cutoff_plus_one() {
        let ts = TypeSystem::new();
        let breadth_cutoff = 10;
        let detector = GenericCycleDetector::with_cutoffs(1000, breadth_cutoff);
        let owner = TypeSystemEntity::Type(ts.canon_type());
        let node = ts.define_type("Node", TypeKind::Class, TypeFlags::empty());

        for i in 0..=breadth_cutoff {
            // Distinct referents at the same chain position under one owner.
            let referent = TypeSystemEntity::Type(wrapped(&ts, node, i + 1));
            let verdict = detector.detect(&ts, owner, referent);
            if i < breadth_cutoff {
                assert_eq!(verdict, ExpansionVerdict::Expand, "registration {}", i + 1);
            } else {
                assert_eq!(verdict, ExpansionVerdict::Suppress, "registration {}", i + 1);
            }
        }
    }

    fn wrapped(ts: &TypeSystem, node: TypeId, depth: usize) -> TypeId {
        let mut current = ts.canon_type();
        for _ in 0..depth {
            current = ts.instantiate(node, &[current]);
        }
        current
    }

    #[test]
    fn test_re_registering_same_referent_is_free() {
        let ts = TypeSystem::new();
        let detector = GenericCycleDetector::with_cutoffs(4, 2);
        let owner = TypeSystemEntity::Type(ts.canon_type());
        let wrap = ts.define_type("Wrap", TypeKind::Class, TypeFlags::empty());
        let referent = TypeSystemEntity::Type(ts.instantiate(wrap, &[ts.canon_type()]));

        // Same referent many times never counts against breadth.
        for _ in 0..50 {
            assert_eq!(detector.detect(&ts, owner, referent), ExpansionVerdict::Expand);
        }
    }

    #[test]
    fn test_suppression_warnings_dedup_by_owner() {
        let ts = TypeSystem::new();
        let detector = GenericCycleDetector::with_cutoffs(0, 1000);
        let owner = TypeSystemEntity::Type(ts.canon_type());
        let wrap = ts.define_type("Wrap", TypeKind::Class, TypeFlags::empty());

        for i in 1..=3 {
            let referent = TypeSystemEntity::Type(ts.instantiate(wrap, &[wrapped(&ts, wrap, i)]));
            assert_eq!(detector.detect(&ts, owner, referent), ExpansionVerdict::Suppress);
        }

        let flushed = detector.warnings().flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].owner, owner);
        assert_eq!(detector.stats().suppressed_edges, 3);
    }
}
