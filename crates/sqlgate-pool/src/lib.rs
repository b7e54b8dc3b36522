//! Connection pooling for sqlgate.
//!
//! The [`Pool`] owns a free list of idle connections and a single
//! prepare/operate [`Gate`]: preparation (schema migration) holds the gate
//! exclusively, ordinary queries hold it shared, so no query ever observes
//! a half-migrated schema.

pub mod gate;
pub mod pool;

pub use gate::{ExclusiveGuard, Gate, SharedGuard};
pub use pool::{Pool, Prepare};
