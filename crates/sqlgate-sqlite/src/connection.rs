//! SQLite connection implementation.
//!
//! Safe wrapper around the engine's C API. A `Connection` owns exactly one
//! engine handle; the pool guarantees it is used by at most one caller at a
//! time, so no internal locking is needed — the handle moves with the
//! checkout.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use crate::ffi;
use crate::types;
use serde::{Deserialize, Serialize};
use sqlgate_core::{
    ColumnInfo, Error, OpenError, OpenErrorKind, Query, QueryError, QueryErrorKind, Result, Row,
};
use std::cell::Cell;
use std::ffi::{CStr, CString, c_int};
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

/// The introspection query returning every table name in the database.
pub const TABLE_CATALOG_QUERY: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name";

/// Statement probed immediately after opening: on an encrypted database a
/// wrong key makes the file unreadable, which the engine reports as
/// "not a database" on the first catalog access.
const CANARY_QUERY: &str = "SELECT count(*) FROM sqlite_master";

/// Where a database lives. Immutable once a pool is configured with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// Private in-memory database, reset on every open
    InMemory,
    /// File-backed database at the given path
    File(PathBuf),
}

impl Location {
    /// A file-backed location.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Location::File(path.into())
    }

    /// The backing file path, if file-backed.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Location::InMemory => None,
            Location::File(path) => Some(path),
        }
    }

    fn engine_path(&self) -> String {
        match self {
            Location::InMemory => ":memory:".to_string(),
            Location::File(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::InMemory => write!(f, ":memory:"),
            Location::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A connection to the engine.
///
/// Identity is the handle: two connections are equal iff they wrap the same
/// handle. The handle is closed on drop; dropping twice cannot happen and
/// the engine treats closing a null handle as a no-op.
pub struct Connection {
    db: *mut ffi::sqlite3,
    location: Location,
    in_transaction: Cell<bool>,
}

// SAFETY: the engine is built in serialized threading mode and a Connection
// is only ever used by one thread at a time (pool checkout is exclusive), so
// moving it across threads is sound. It is deliberately !Sync.
unsafe impl Send for Connection {}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.db, other.db)
    }
}

impl Eq for Connection {}

impl Connection {
    /// Open a connection against a location, applying the secret key.
    ///
    /// An empty key skips the key pragma entirely (unencrypted database).
    /// After opening, a canary probe reads the table catalog so a wrong key
    /// surfaces as `InvalidKey` before any caller logic runs.
    pub fn open(location: &Location, key: &str) -> Result<Self> {
        let c_path = CString::new(location.engine_path()).map_err(|_| {
            Error::Open(OpenError {
                kind: OpenErrorKind::Failed,
                message: "invalid path: contains null byte".to_string(),
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;

        // SAFETY: we pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(Error::Open(OpenError {
                kind: OpenErrorKind::Failed,
                message: format!("failed to open database: {}", message),
            }));
        }

        // SAFETY: db is valid
        unsafe {
            ffi::sqlite3_busy_timeout(db, 5000);
        }

        let conn = Self {
            db,
            location: location.clone(),
            in_transaction: Cell::new(false),
        };

        if !key.is_empty() {
            conn.exec_batch(&format!("PRAGMA key = '{}'", escape_single_quotes(key)))
                .map_err(|e| conn.classify_open_failure(&e))?;
        }

        conn.canary_probe()?;

        tracing::debug!(location = %conn.location, "opened connection");
        Ok(conn)
    }

    /// Where this connection was opened.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Execute raw SQL directly, without preparing.
    ///
    /// Handles multi-statement scripts, which is what migration scripts are.
    /// Only safe for trusted SQL.
    pub fn exec_batch(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql).map_err(|_| {
            Error::Query(QueryError {
                kind: QueryErrorKind::Invalid,
                sql: Some(sql.to_string()),
                message: "SQL contains null byte".to_string(),
            })
        })?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: all pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is valid and must be freed by us
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };

            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Execution,
                sql: Some(sql.to_string()),
                message,
            }));
        }

        Ok(())
    }

    /// Execute a query, returning the number of rows affected.
    ///
    /// A parameterized query goes through prepare/bind/step/finalize; an
    /// unparameterized one runs as raw text.
    pub fn execute(&self, query: &Query) -> Result<u64> {
        if query.values().is_none() {
            self.exec_batch(query.text())?;
            return Ok(self.changes());
        }

        let stmt = self.prepare_bound(query)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };

        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => Ok(self.changes()),
            _ => Err(step_error(self.db, query.text())),
        }
    }

    /// Fetch at most one row, mapped through `mapper`.
    pub fn fetch_one<T, M>(&self, query: &Query, mapper: M) -> Result<Option<T>>
    where
        M: Fn(&Row) -> Result<T>,
    {
        let stmt = self.prepare_bound(query)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                let columns = column_info(stmt);
                let row = read_row(stmt, &columns);
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                mapper(&row).map(Some)
            }
            ffi::SQLITE_DONE => {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                Ok(None)
            }
            _ => {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                Err(step_error(self.db, query.text()))
            }
        }
    }

    /// Fetch every row into a `Vec`, mapped through `mapper`.
    pub fn fetch_all<T, M>(&self, query: &Query, mapper: M) -> Result<Vec<T>>
    where
        M: Fn(&Row) -> Result<T>,
    {
        let mut out = Vec::new();
        self.fetch_streaming(query, mapper, |item| out.push(item))?;
        Ok(out)
    }

    /// Step through the result set, invoking `on_row` once per mapped row
    /// before returning, without materializing the result set.
    ///
    /// A step failure after rows were already delivered still propagates:
    /// partial results must not be trusted on error.
    pub fn fetch_streaming<T, M, F>(&self, query: &Query, mapper: M, mut on_row: F) -> Result<()>
    where
        M: Fn(&Row) -> Result<T>,
        F: FnMut(T),
    {
        let stmt = self.prepare_bound(query)?;
        let columns = column_info(stmt);

        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt) };
            match rc {
                ffi::SQLITE_ROW => {
                    let row = read_row(stmt, &columns);
                    match mapper(&row) {
                        Ok(item) => on_row(item),
                        Err(e) => {
                            // SAFETY: stmt is valid
                            unsafe { ffi::sqlite3_finalize(stmt) };
                            return Err(e);
                        }
                    }
                }
                ffi::SQLITE_DONE => break,
                _ => {
                    // SAFETY: stmt is valid
                    unsafe { ffi::sqlite3_finalize(stmt) };
                    return Err(step_error(self.db, query.text()));
                }
            }
        }

        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        Ok(())
    }

    /// Every table name in the database, from the engine's catalog.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.fetch_all(&Query::new(TABLE_CATALOG_QUERY), |row| {
            row.get_as::<String>(0)
        })
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> u64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(self.db) as u64 }
    }

    /// Change the encryption key of the open database.
    pub fn rekey(&self, new_key: &str) -> Result<()> {
        self.exec_batch(&format!(
            "PRAGMA rekey = '{}'",
            escape_single_quotes(new_key)
        ))
    }

    /// Begin a write transaction.
    pub fn begin(&self) -> Result<()> {
        if self.in_transaction.get() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Execution,
                sql: None,
                message: "already in a transaction".to_string(),
            }));
        }
        self.exec_batch("BEGIN IMMEDIATE")?;
        self.in_transaction.set(true);
        Ok(())
    }

    /// Commit the current transaction.
    pub fn commit(&self) -> Result<()> {
        if !self.in_transaction.get() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Execution,
                sql: None,
                message: "not in a transaction".to_string(),
            }));
        }
        let result = self.exec_batch("COMMIT");
        self.in_transaction.set(false);
        result
    }

    /// Roll back the current transaction.
    ///
    /// Some failures abort the transaction inside the engine, in which case
    /// the explicit ROLLBACK reports "no transaction is active"; the flag is
    /// cleared either way, so callers may ignore the result during cleanup.
    pub fn rollback(&self) -> Result<()> {
        if !self.in_transaction.get() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Execution,
                sql: None,
                message: "not in a transaction".to_string(),
            }));
        }
        let result = self.exec_batch("ROLLBACK");
        self.in_transaction.set(false);
        result
    }

    /// Prepare a statement and bind the query's values, checking arity.
    fn prepare_bound(&self, query: &Query) -> Result<*mut ffi::sqlite3_stmt> {
        let stmt = prepare_stmt(self.db, query.text())?;
        let values = query.values().unwrap_or(&[]);

        // SAFETY: stmt is valid
        let expected = unsafe { ffi::sqlite3_bind_parameter_count(stmt) } as usize;
        if expected != values.len() {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Invalid,
                sql: Some(query.text().to_string()),
                message: format!(
                    "statement has {} placeholders but {} values were bound",
                    expected,
                    values.len()
                ),
            }));
        }

        for (i, value) in values.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, value) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(bind_error(self.db, query.text(), i + 1));
            }
        }

        Ok(stmt)
    }

    fn canary_probe(&self) -> Result<()> {
        let stmt = match prepare_stmt(self.db, CANARY_QUERY) {
            Ok(stmt) => stmt,
            Err(e) => return Err(self.classify_open_failure(&e)),
        };

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };

        match rc {
            ffi::SQLITE_ROW | ffi::SQLITE_DONE => Ok(()),
            _ => Err(self.classify_open_failure(&step_error(self.db, CANARY_QUERY))),
        }
    }

    /// A failure during key application or the canary probe: "not a
    /// database" and corruption mean the key did not decrypt the file.
    fn classify_open_failure(&self, err: &Error) -> Error {
        // SAFETY: db is valid
        let code = unsafe { ffi::sqlite3_errcode(self.db) };
        let kind = if code == ffi::SQLITE_NOTADB || code == ffi::SQLITE_CORRUPT {
            OpenErrorKind::InvalidKey
        } else {
            OpenErrorKind::Failed
        };
        Error::Open(OpenError {
            kind,
            message: err.to_string(),
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and owned by us
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
        }
    }
}

// Helper functions

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::Invalid,
            sql: Some(sql.to_string()),
            message: "SQL contains null byte".to_string(),
        })
    })?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: all pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Invalid,
            sql: Some(sql.to_string()),
            message: last_error_message(db),
        }));
    }

    Ok(stmt)
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Invalid,
        sql: Some(sql.to_string()),
        message: format!(
            "failed to bind parameter {}: {}",
            param_index,
            last_error_message(db)
        ),
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Execution,
        sql: Some(sql.to_string()),
        message: last_error_message(db),
    })
}

fn last_error_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is valid, errmsg returns a valid C string
    unsafe {
        CStr::from_ptr(ffi::sqlite3_errmsg(db))
            .to_string_lossy()
            .into_owned()
    }
}

fn column_info(stmt: *mut ffi::sqlite3_stmt) -> Arc<ColumnInfo> {
    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let mut names = Vec::with_capacity(col_count as usize);
    for i in 0..col_count {
        // SAFETY: stmt is valid, i is in range
        let name = unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i));
        names.push(name);
    }
    Arc::new(ColumnInfo::new(names))
}

fn read_row(stmt: *mut ffi::sqlite3_stmt, columns: &Arc<ColumnInfo>) -> Row {
    let mut values = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
        // SAFETY: stmt has just returned SQLITE_ROW, i is in range
        values.push(unsafe { types::read_column(stmt, i as c_int) });
    }
    Row::with_columns(Arc::clone(columns), values)
}

fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "''")
}
