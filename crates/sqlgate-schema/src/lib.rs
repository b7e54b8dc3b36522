//! Schema definition and migration support for sqlgate.
//!
//! This crate provides:
//! - `SchemaDescriptor`: declared version, bootstrap script, ordered
//!   migrations, required tables
//! - `Migrator`: drives a connection from "unknown version" to the
//!   schema's declared version, one transaction per migration

pub mod descriptor;
pub mod migrate;

pub use descriptor::{Migration, SchemaBuilder, SchemaDescriptor};
pub use migrate::Migrator;
