//! Error types for sqlgate operations.
//!
//! Engine-reported runtime conditions surface as typed, recoverable errors.
//! Contract violations (operations before `configure`, a descriptor whose
//! declared version does not match its migration set) never return an error
//! value — they panic, since no caller-side handling can make them safe to
//! ignore.

use std::fmt;

/// The primary error type for all sqlgate operations.
#[derive(Debug)]
pub enum Error {
    /// Failed to open a database, or the decryption key was wrong
    Open(OpenError),
    /// Statement preparation or execution errors
    Query(QueryError),
    /// Schema version / migration errors
    Schema(SchemaError),
    /// Type conversion errors from row mappers
    Type(TypeError),
}

#[derive(Debug)]
pub struct OpenError {
    pub kind: OpenErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenErrorKind {
    /// Bad path, permissions, or the engine refused the handle
    Failed,
    /// Wrong decryption secret, detected by the canary probe after opening
    InvalidKey,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Prepare failed: malformed SQL or arity mismatch against bound values
    Invalid,
    /// Engine-level failure mid-step
    Execution,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    /// Version found in the database, when relevant
    pub stored: Option<i64>,
    /// Version the schema descriptor declares, when relevant
    pub declared: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Stored version is newer than the schema declares
    UnsupportedVersion,
    /// A required table is missing after migration
    Verification,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Was this caused by a wrong decryption key?
    pub fn is_invalid_key(&self) -> bool {
        matches!(
            self,
            Error::Open(OpenError {
                kind: OpenErrorKind::InvalidKey,
                ..
            })
        )
    }

    /// Get the SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(e) => match e.kind {
                OpenErrorKind::Failed => write!(f, "Open error: {}", e.message),
                OpenErrorKind::InvalidKey => write!(f, "Invalid key: {}", e.message),
            },
            Error::Query(e) => match e.kind {
                QueryErrorKind::Invalid => write!(f, "Invalid query: {}", e.message),
                QueryErrorKind::Execution => write!(f, "Execution failed: {}", e.message),
            },
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<OpenError> for Error {
    fn from(err: OpenError) -> Self {
        Error::Open(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for sqlgate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_helper() {
        let err = Error::Open(OpenError {
            kind: OpenErrorKind::InvalidKey,
            message: "file is not a database".to_string(),
        });
        assert!(err.is_invalid_key());

        let err = Error::Open(OpenError {
            kind: OpenErrorKind::Failed,
            message: "unable to open database file".to_string(),
        });
        assert!(!err.is_invalid_key());
    }

    #[test]
    fn sql_helper() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Invalid,
            sql: Some("SELEC 1".to_string()),
            message: "near \"SELEC\": syntax error".to_string(),
        });
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert!(err.to_string().starts_with("Invalid query:"));
    }

    #[test]
    fn schema_error_carries_versions() {
        let err = Error::Schema(SchemaError {
            kind: SchemaErrorKind::UnsupportedVersion,
            message: "database version 5 is newer than schema version 3".to_string(),
            stored: Some(5),
            declared: Some(3),
        });
        match err {
            Error::Schema(e) => {
                assert_eq!(e.stored, Some(5));
                assert_eq!(e.declared, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
