//! Pre-validated type and method descriptor model for the Veld compiler.
//!
//! Everything downstream of the frontend talks about types, methods and
//! fields through the compact handles defined here (`TypeId`, `MethodId`,
//! `FieldId`) and resolves them against an append-only [`TypeSystem`]
//! registry. The registry deduplicates structurally identical generic
//! instantiations, so handle equality is instantiation equality.
//!
//! This crate deliberately knows nothing about code generation or dictionary
//! layout; it only answers questions (kind, flags, instantiation, canonical
//! form) that the rest of the compiler asks.

mod entity;
mod name;
mod registry;
mod target;
mod types;

pub use entity::{FieldId, MethodId, TypeId, TypeSystemEntity};
pub use name::{Name, StringInterner};
pub use registry::{SharedTypeSystem, TypeSystem};
pub use target::{TargetDetails, TargetOs};
pub use types::{FieldFlags, Instantiation, MethodFlags, TypeFlags, TypeKind};
