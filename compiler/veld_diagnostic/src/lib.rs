//! Deferred diagnostics for concurrent compilation.
//!
//! Worker threads must never interleave warning output with compilation
//! work, so the only user-facing channel of the shared-generics core is a
//! queue that accepts owner-keyed warnings concurrently and materializes
//! them exactly once, after all compilation completes.

mod queue;

pub use queue::{DeferredWarnings, Warning};
