//! SQLite engine facade for sqlgate.
//!
//! Wraps the engine's C API behind a safe [`Connection`] type: open with an
//! optional encryption key, parameter binding, the three execution shapes
//! (`execute`, `fetch_one`, `fetch_all`/`fetch_streaming`), and transaction
//! helpers. Everything above this crate treats the engine as a black box.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{Connection, Location};
