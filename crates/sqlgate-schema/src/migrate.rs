//! Migration coordination.
//!
//! The coordinator drives a single connection from "unknown version" to the
//! schema's declared version. The stored version is the engine's reserved
//! `user_version` counter — the only durable state this module reads or
//! writes — and it advances inside each migration's transaction, so a failed
//! script rolls the version back with it.

use crate::descriptor::{Migration, SchemaDescriptor};
use sqlgate_core::{Error, Query, Result, SchemaError, SchemaErrorKind};
use sqlgate_sqlite::{Connection, Location};
use std::path::Path;

/// Drives connections through `Unversioned -> Migrating(v) -> Current`.
pub struct Migrator;

impl Migrator {
    /// Read the stored schema version (0 on a fresh database).
    pub fn stored_version(conn: &Connection) -> Result<i64> {
        let version = conn.fetch_one(&Query::new("PRAGMA user_version"), |row| {
            row.get_as::<i64>(0)
        })?;
        Ok(version.unwrap_or(0))
    }

    /// Bring the database behind `conn` to the schema's declared version.
    ///
    /// - stored 0: fresh database — run the bootstrap script wholesale
    /// - stored == declared: no-op fast path
    /// - stored > declared: `UnsupportedVersion`, nothing is touched
    /// - otherwise: apply every pending migration, each in its own
    ///   transaction, aborting the run on the first failure
    ///
    /// Afterwards the schema's required tables are verified against the
    /// engine's table catalog.
    pub fn create_or_migrate(conn: &Connection, schema: &SchemaDescriptor) -> Result<()> {
        let stored = Self::stored_version(conn)?;
        let declared = schema.current_version();

        if stored == 0 {
            tracing::info!(version = declared, "bootstrapping fresh database");
            Self::bootstrap(conn, schema)?;
        } else if stored == declared {
            tracing::debug!(version = stored, "schema already current");
        } else if stored > declared {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::UnsupportedVersion,
                message: format!(
                    "database version {stored} is newer than schema version {declared}"
                ),
                stored: Some(stored),
                declared: Some(declared),
            }));
        } else {
            for migration in schema.pending(stored) {
                Self::apply(conn, migration)?;
            }
        }

        Self::verify_tables(conn, schema)
    }

    /// Destructive reset: delete the backing file (file-backed locations
    /// only), open fresh, and run the bootstrap path unconditionally.
    pub fn recreate(
        location: &Location,
        key: &str,
        schema: &SchemaDescriptor,
    ) -> Result<Connection> {
        if let Some(path) = location.file_path() {
            tracing::info!(location = %location, "deleting database for recreate");
            remove_database_files(path)?;
        }
        let conn = Connection::open(location, key)?;
        Self::bootstrap(&conn, schema)?;
        Self::verify_tables(&conn, schema)?;
        Ok(conn)
    }

    /// Run the creation script and stamp the declared version, atomically.
    fn bootstrap(conn: &Connection, schema: &SchemaDescriptor) -> Result<()> {
        conn.begin()?;
        let result = conn
            .exec_batch(schema.bootstrap())
            .and_then(|()| Self::set_stored_version(conn, schema.current_version()));
        match result {
            Ok(()) => conn.commit(),
            Err(e) => {
                let _ = conn.rollback();
                Err(e)
            }
        }
    }

    /// Apply one migration as an atomic unit: script and version bump
    /// commit together or not at all.
    fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
        tracing::info!(version = migration.version, "applying migration");
        conn.begin()?;
        let result = conn
            .exec_batch(&migration.script)
            .and_then(|()| Self::set_stored_version(conn, migration.version));
        match result {
            Ok(()) => conn.commit(),
            Err(e) => {
                let _ = conn.rollback();
                tracing::warn!(version = migration.version, error = %e, "migration failed, rolled back");
                Err(e)
            }
        }
    }

    fn set_stored_version(conn: &Connection, version: i64) -> Result<()> {
        conn.exec_batch(&format!("PRAGMA user_version = {version}"))
    }

    /// Guard against a migration script silently omitting required DDL.
    fn verify_tables(conn: &Connection, schema: &SchemaDescriptor) -> Result<()> {
        if schema.required_tables().is_empty() {
            return Ok(());
        }
        let present = conn.table_names()?;
        for required in schema.required_tables() {
            if !present.iter().any(|t| t == required) {
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::Verification,
                    message: format!("required table '{required}' is missing after migration"),
                    stored: None,
                    declared: None,
                }));
            }
        }
        Ok(())
    }
}

/// Delete the database file and its WAL/shm siblings; missing files are
/// fine, other I/O failures are not.
fn remove_database_files(path: &Path) -> Result<()> {
    let mut targets = vec![path.to_path_buf()];
    let name = path.to_string_lossy();
    targets.push(format!("{name}-wal").into());
    targets.push(format!("{name}-shm").into());

    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Open(sqlgate_core::OpenError {
                    kind: sqlgate_core::OpenErrorKind::Failed,
                    message: format!("failed to delete {}: {e}", target.display()),
                }));
            }
        }
    }
    Ok(())
}
