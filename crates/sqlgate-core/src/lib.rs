//! Core types for sqlgate.
//!
//! This crate provides the foundational types shared by every layer:
//!
//! - `Error` and its structured sub-errors
//! - `Value` dynamic SQL value (closed tagged union)
//! - `Row` / `ColumnInfo` result representation
//! - `Query` parameterized SQL statement

pub mod error;
pub mod query;
pub mod row;
pub mod value;

pub use error::{
    Error, OpenError, OpenErrorKind, QueryError, QueryErrorKind, Result, SchemaError,
    SchemaErrorKind, TypeError,
};
pub use query::Query;
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
