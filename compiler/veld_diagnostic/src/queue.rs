//! Owner-keyed deferred warning queue.
//!
//! Features:
//! - Concurrent inserts from compilation work items
//! - Deduplication by owning entity (first message per owner wins)
//! - Single end-of-compilation flush with deterministic ordering

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fmt;

use veld_ir::TypeSystemEntity;

/// A warning attributed to one canonical generic owner.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Warning {
    pub owner: TypeSystemEntity,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warning: {}", self.message)
    }
}

#[derive(Default)]
struct QueueInner {
    seen: FxHashSet<TypeSystemEntity>,
    pending: Vec<Warning>,
    flushed: bool,
}

/// Concurrent warning queue, flushed exactly once.
///
/// Inserts after the flush are dropped; by that point all compilation work
/// has completed and a late insert would be a phase-ordering bug, which the
/// queue tolerates silently rather than interleaving output.
#[derive(Default)]
pub struct DeferredWarnings {
    inner: Mutex<QueueInner>,
}

impl DeferredWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a warning for `owner` unless one is already queued for it.
    ///
    /// Returns true if the warning was accepted.
    pub fn report(&self, owner: TypeSystemEntity, message: impl Into<String>) -> bool {
        let mut guard = self.inner.lock();
        if guard.flushed || !guard.seen.insert(owner) {
            return false;
        }
        let message = message.into();
        guard.pending.push(Warning { owner, message });
        true
    }

    /// True if a warning has been queued for `owner`.
    pub fn contains(&self, owner: TypeSystemEntity) -> bool {
        self.inner.lock().seen.contains(&owner)
    }

    /// Number of queued warnings.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the queue, sorted by owner for deterministic output.
    ///
    /// The first call returns everything accumulated; every later call
    /// returns an empty vec.
    pub fn flush(&self) -> Vec<Warning> {
        let mut guard = self.inner.lock();
        guard.flushed = true;
        let mut drained = std::mem::take(&mut guard.pending);
        drained.sort_by_key(|w| w.owner.sort_key());
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veld_ir::{TypeFlags, TypeKind, TypeSystem};

    fn owners(ts: &TypeSystem, count: u32) -> Vec<TypeSystemEntity> {
        (0..count)
            .map(|i| {
                TypeSystemEntity::Type(ts.define_type(
                    &format!("Owner{i}"),
                    TypeKind::Class,
                    TypeFlags::empty(),
                ))
            })
            .collect()
    }

    #[test]
    fn test_duplicate_owner_warnings_collapse() {
        let ts = TypeSystem::new();
        let owner = owners(&ts, 1)[0];
        let queue = DeferredWarnings::new();

        assert!(queue.report(owner, "first"));
        assert!(!queue.report(owner, "second"));

        let flushed = queue.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].message, "first");
    }

    #[test]
    fn test_flush_happens_once() {
        let ts = TypeSystem::new();
        let all = owners(&ts, 3);
        let queue = DeferredWarnings::new();
        for (i, &owner) in all.iter().enumerate() {
            queue.report(owner, format!("warning {i}"));
        }

        assert_eq!(queue.flush().len(), 3);
        assert_eq!(queue.flush().len(), 0);
        // Late inserts after the flush are dropped.
        assert!(!queue.report(all[0], "late"));
    }

    #[test]
    fn test_flush_is_sorted_by_owner() {
        let ts = TypeSystem::new();
        let all = owners(&ts, 4);
        let queue = DeferredWarnings::new();
        for &owner in all.iter().rev() {
            queue.report(owner, "w");
        }

        let flushed = queue.flush();
        let order: Vec<TypeSystemEntity> = flushed.iter().map(|w| w.owner).collect();
        assert_eq!(order, all);
    }

    #[test]
    fn test_concurrent_reports_dedup() {
        let ts = TypeSystem::new();
        let owner = owners(&ts, 1)[0];
        let queue = DeferredWarnings::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        queue.report(owner, "racy");
                    }
                });
            }
        });
        assert_eq!(queue.flush().len(), 1);
    }
}
