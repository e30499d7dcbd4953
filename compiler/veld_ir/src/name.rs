//! Interned identifier storage.
//!
//! The compiler interns every identifier once and passes around 32-bit
//! [`Name`] handles. Interning is thread-safe; the store only ever grows.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;

/// Interned string identifier.
///
/// `Name` equality is string equality, and the ordering is the interning
/// order, which is deterministic for a fixed registration sequence.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Get the raw index value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::EMPTY
    }
}

struct InternerInner {
    map: FxHashMap<Box<str>, u32>,
    strings: Vec<Box<str>>,
}

/// Thread-safe string interner backing [`Name`].
///
/// # Thread Safety
/// A single `RwLock` guards the store; reads take the shared lock, inserts
/// double-check under the exclusive lock so racing threads converge on one
/// handle per string.
pub struct StringInterner {
    inner: RwLock<InternerInner>,
}

impl StringInterner {
    /// Create an interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut map = FxHashMap::default();
        map.insert(Box::from(""), 0);
        StringInterner {
            inner: RwLock::new(InternerInner {
                map,
                strings: vec![Box::from("")],
            }),
        }
    }

    /// Intern a string, returning its `Name`.
    ///
    /// Re-interning an already known string returns the existing handle.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` strings are interned.
    pub fn intern(&self, s: &str) -> Name {
        // Fast path: already interned.
        {
            let guard = self.inner.read();
            if let Some(&idx) = guard.map.get(s) {
                return Name(idx);
            }
        }

        let mut guard = self.inner.write();

        // Double-check after acquiring the write lock.
        if let Some(&idx) = guard.map.get(s) {
            return Name(idx);
        }

        let idx = u32::try_from(guard.strings.len())
            .unwrap_or_else(|_| panic!("string interner exceeded u32::MAX entries"));
        guard.strings.push(Box::from(s));
        guard.map.insert(Box::from(s), idx);
        Name(idx)
    }

    /// Resolve a `Name` back to its string content.
    ///
    /// # Panics
    /// Panics if the `Name` was not produced by this interner.
    pub fn resolve(&self, name: Name) -> String {
        let guard = self.inner.read();
        guard.strings[name.0 as usize].to_string()
    }

    /// Number of interned strings, including the pre-interned empty string.
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// True if only the pre-interned empty string is present.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intern_deduplicates() {
        let interner = StringInterner::new();
        let a = interner.intern("List");
        let b = interner.intern("Compare");
        let c = interner.intern("List");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "List");
        assert_eq!(interner.resolve(b), "Compare");
    }

    #[test]
    fn test_empty_string_is_preinterned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert!(interner.is_empty());
    }

    #[test]
    fn test_concurrent_interning_converges() {
        let interner = StringInterner::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..64 {
                        interner.intern(&format!("ident{i}"));
                    }
                });
            }
        });
        // 64 distinct identifiers plus the pre-interned empty string.
        assert_eq!(interner.len(), 65);
    }
}
