//! sqlgate — pooled, gated access to embedded SQLite with versioned schema
//! migrations.
//!
//! The pool is configured once with a location and a key supplier; an
//! optional prepare block — the only place migrations can run — executes
//! under the exclusive side of the prepare/operate gate. Every later
//! `execute`/`fetch*` call holds the shared side, borrows a connection from
//! the free list (or opens one), and returns it when done.
//!
//! # Quick start
//!
//! ```no_run
//! use sqlgate::{Location, Pool, Query, SchemaDescriptor};
//!
//! let schema = SchemaDescriptor::builder(1)
//!     .bootstrap("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
//!     .migration(1, "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
//!     .require_table("users")
//!     .finish();
//!
//! let pool = Pool::new();
//! pool.configure_with(
//!     Location::file("app.db"),
//!     || std::env::var("APP_DB_KEY").unwrap_or_default(),
//!     |prepare| prepare.create_or_migrate(&schema),
//! )?;
//!
//! pool.execute(&Query::new("INSERT INTO users (name) VALUES (?)").bind("Ana"))?;
//! let name = pool.fetch_one(
//!     &Query::new("SELECT name FROM users WHERE rowid = last_insert_rowid()"),
//!     |row| row.get_named::<String>("name"),
//! )?;
//! assert_eq!(name, Some("Ana".to_string()));
//! # Ok::<(), sqlgate::Error>(())
//! ```

// Re-export the public surface from the sub-crates
pub use sqlgate_core::{
    ColumnInfo, Error, FromValue, OpenError, OpenErrorKind, Query, QueryError, QueryErrorKind,
    Result, Row, SchemaError, SchemaErrorKind, TypeError, Value,
};
pub use sqlgate_pool::{Gate, Pool, Prepare};
pub use sqlgate_schema::{Migration, Migrator, SchemaBuilder, SchemaDescriptor};
pub use sqlgate_sqlite::{Connection, Location};
