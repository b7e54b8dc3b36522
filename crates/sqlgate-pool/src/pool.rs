//! The connection pool.
//!
//! A `Pool` is configured once with a location and a key supplier, then
//! hands out connections per call: shared gate, pop any idle connection
//! (or open a new one), delegate, push back. The free list is a set, not a
//! queue — callers get no reuse-order guarantee.

use crate::gate::Gate;
use sqlgate_core::{Query, Result, Row};
use sqlgate_schema::{Migrator, SchemaDescriptor};
use sqlgate_sqlite::{Connection, Location};
use std::sync::{Mutex, OnceLock};

/// Produces the current secret key, invoked once per new connection so the
/// key can rotate between opens without reconfiguring the pool.
pub type KeySupplier = Box<dyn Fn() -> String + Send + Sync>;

struct PoolConfig {
    location: Location,
    key_supplier: KeySupplier,
}

/// A pool of connections to one database.
///
/// Operations before [`Pool::configure`] are programming errors and panic;
/// engine failures surface as recoverable [`Error`](sqlgate_core::Error)
/// values. The pool never leaves a connection checked out on error — it is
/// returned to the free list before the error propagates.
pub struct Pool {
    gate: Gate,
    config: OnceLock<PoolConfig>,
    /// Idle connections; guarded by its own short-lived lock, disjoint from
    /// the gate, so borrow/return never blocks on a query in flight.
    idle: Mutex<Vec<Connection>>,
}

impl Pool {
    /// Create an unconfigured pool.
    pub fn new() -> Self {
        Self {
            gate: Gate::new(),
            config: OnceLock::new(),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Configure the pool without a prepare block.
    ///
    /// # Panics
    /// Panics if the pool is already configured: location and key supplier
    /// are immutable once set.
    pub fn configure<K>(&self, location: Location, key_supplier: K)
    where
        K: Fn() -> String + Send + Sync + 'static,
    {
        // No prepare block, so the result is always Ok
        self.configure_inner(
            location,
            Box::new(key_supplier),
            None::<fn(&mut Prepare<'_>) -> Result<()>>,
        )
        .expect("configure without a prepare block cannot fail");
    }

    /// Configure the pool and run `prepare` while holding the gate's
    /// exclusive side. The prepare block is the only place migration
    /// operations are reachable; every query issued after `configure_with`
    /// returns sees the fully prepared schema.
    ///
    /// # Panics
    /// Panics if the pool is already configured.
    pub fn configure_with<K, F>(&self, location: Location, key_supplier: K, prepare: F) -> Result<()>
    where
        K: Fn() -> String + Send + Sync + 'static,
        F: FnOnce(&mut Prepare<'_>) -> Result<()>,
    {
        self.configure_inner(location, Box::new(key_supplier), Some(prepare))
    }

    fn configure_inner<F>(
        &self,
        location: Location,
        key_supplier: KeySupplier,
        prepare: Option<F>,
    ) -> Result<()>
    where
        F: FnOnce(&mut Prepare<'_>) -> Result<()>,
    {
        let _exclusive = self.gate.exclusive();

        let config = PoolConfig {
            location,
            key_supplier,
        };
        assert!(
            self.config.set(config).is_ok(),
            "pool is already configured; location and key supplier are immutable"
        );

        let Some(prepare) = prepare else {
            return Ok(());
        };

        tracing::debug!(location = %self.config_ref().location, "running prepare block");
        let mut cx = Prepare {
            pool: self,
            conn: None,
        };
        let result = prepare(&mut cx);
        match result {
            Ok(()) => {
                // The connection the prepare block used becomes the first
                // free-list entry.
                if let Some(conn) = cx.conn.take() {
                    self.release(conn);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Execute a query, returning the number of rows affected.
    pub fn execute(&self, query: &Query) -> Result<u64> {
        self.with_connection(|conn| conn.execute(query))
    }

    /// Fetch at most one row, mapped through `mapper`.
    pub fn fetch_one<T, M>(&self, query: &Query, mapper: M) -> Result<Option<T>>
    where
        M: Fn(&Row) -> Result<T>,
    {
        self.with_connection(|conn| conn.fetch_one(query, mapper))
    }

    /// Fetch every row into a `Vec`, mapped through `mapper`.
    pub fn fetch_all<T, M>(&self, query: &Query, mapper: M) -> Result<Vec<T>>
    where
        M: Fn(&Row) -> Result<T>,
    {
        self.with_connection(|conn| conn.fetch_all(query, mapper))
    }

    /// Stream rows through `on_row` without materializing the result set.
    pub fn fetch_streaming<T, M, F>(&self, query: &Query, mapper: M, on_row: F) -> Result<()>
    where
        M: Fn(&Row) -> Result<T>,
        F: FnMut(T),
    {
        self.with_connection(|conn| conn.fetch_streaming(query, mapper, on_row))
    }

    /// Atomically empty the free list; the drained connections close.
    ///
    /// Checked-out connections are unaffected: they finish normally and are
    /// re-added to the (now smaller) free list when their call completes.
    pub fn drain(&self) {
        let _ = self.config_ref();
        let drained: Vec<Connection> = self.idle.lock().unwrap().drain(..).collect();
        tracing::debug!(count = drained.len(), "drained idle connections");
        // Handles close on drop, outside the free-list lock
        drop(drained);
    }

    /// Number of idle connections currently in the free list.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    /// Borrow a connection, run `op`, and return the connection to the free
    /// list — always, even when `op` fails.
    fn with_connection<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _ = self.config_ref();
        let _shared = self.gate.shared();
        let conn = self.borrow_connection()?;
        let result = op(&conn);
        self.release(conn);
        result
    }

    /// Pop any idle connection; open a new one when the list is empty.
    fn borrow_connection(&self) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().unwrap().pop() {
            return Ok(conn);
        }
        // Construction touches only the engine, so the free-list lock is
        // not held here.
        self.open_connection()
    }

    fn open_connection(&self) -> Result<Connection> {
        let config = self.config_ref();
        Connection::open(&config.location, &(config.key_supplier)())
    }

    fn release(&self, conn: Connection) {
        self.idle.lock().unwrap().push(conn);
    }

    fn config_ref(&self) -> &PoolConfig {
        self.config
            .get()
            .expect("pool is not configured; call configure() first")
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("configured", &self.config.get().is_some())
            .field("idle", &self.idle_connections())
            .finish()
    }
}

/// The preparation context handed to `configure_with`'s prepare block.
///
/// This is the only path to migration operations: it exists solely inside
/// the gate's exclusive section, so schema changes cannot race queries by
/// construction.
pub struct Prepare<'a> {
    pool: &'a Pool,
    conn: Option<Connection>,
}

impl Prepare<'_> {
    /// The connection preparation runs on, opened lazily.
    pub fn connection(&mut self) -> Result<&Connection> {
        if self.conn.is_none() {
            self.conn = Some(self.pool.open_connection()?);
        }
        Ok(self.conn.as_ref().expect("connection was just opened"))
    }

    /// Bring the database to the schema's declared version.
    pub fn create_or_migrate(&mut self, schema: &SchemaDescriptor) -> Result<()> {
        let conn = self.connection()?;
        Migrator::create_or_migrate(conn, schema)
    }

    /// Destructive reset: delete the backing database and bootstrap fresh.
    pub fn recreate(&mut self, schema: &SchemaDescriptor) -> Result<()> {
        // The file must not be open while it is deleted
        self.conn = None;
        let config = self.pool.config_ref();
        let conn = Migrator::recreate(&config.location, &(config.key_supplier)(), schema)?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Change the encryption key of the prepared database. The key supplier
    /// must produce the new key for subsequent opens.
    pub fn rekey(&mut self, new_key: &str) -> Result<()> {
        self.connection()?.rekey(new_key)
    }
}
