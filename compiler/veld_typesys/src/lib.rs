//! Type system context for AOT compilation of shared generics.
//!
//! [`TypeSystemContext`] is the registrar the rest of the compiler talks
//! to: it hands out the (unique, cached) dictionary layout node for every
//! canonical generic owner, selects the field-layout algorithm governing a
//! type's in-memory shape, owns the array-covariance castability rules and
//! delegate method-set synthesis, and routes every generic-expansion edge
//! through the [`GenericCycleDetector`] so that self-referential generic
//! code cannot expand forever.

mod context;
mod cycle;
mod field_layout;

pub use context::{
    CoreTypes, DelegateFeatures, PrecomputedLayoutProvider, SharedGenericsMode, TypeSystemContext,
};
pub use cycle::{CycleDetectorStats, ExpansionVerdict, GenericCycleDetector};
pub use field_layout::{FieldLayoutAlgorithm, FieldLayoutAlgorithmKind, TypeLayout};
