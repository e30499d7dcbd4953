//! Generic dictionary layout for shared generic code.
//!
//! Shared (canonical) generic code receives a per-instantiation dictionary:
//! a flat array of pointer-sized runtime facts resolved once per concrete
//! instantiation and indexed by fixed slot numbers baked into the generated
//! code. This crate decides, for every canonical generic owner, which facts
//! its dictionary carries and at which slot:
//!
//! - [`GenericLookupResult`] describes one resolvable fact and how to emit
//!   it.
//! - [`DictionaryLayout`] is the slot-assignment contract, with a
//!   [`PrecomputedDictionaryLayout`] built from a whole-program scan and a
//!   [`LazilyBuiltDictionaryLayout`] accumulated concurrently during code
//!   generation and frozen on first query.
//! - [`ObjectDataBuilder`] receives the emitted dictionary bodies.
//!
//! A slot index, once handed out, never changes: emitted code embeds it as
//! a fixed byte offset, so a layout silently missing a slot would yield
//! memory-unsafe output. That is why layout misses are fatal
//! ([`DictionaryError`]) rather than recoverable.

mod emit;
mod layout;
mod lookup;

pub use emit::{ObjectDataBuilder, ObjectSection, Reloc, RelocTarget};
pub use layout::{
    DictionaryError, DictionaryLayout, LazilyBuiltDictionaryLayout, PrecomputedDictionaryLayout,
};
pub use lookup::{
    ConditionalDependencyEdge, DependencyEdge, DependencyTarget, GenericLookupContext,
    GenericLookupResult, TemplateEntry,
};
