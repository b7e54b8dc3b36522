//! Parameterized SQL statements.

use crate::value::Value;

/// A SQL statement with optional positional bind values.
///
/// A query built with `Query::new` alone is unparameterized and runs as raw
/// SQL. The first call to `bind` switches it to parameterized mode; bound
/// values are positional and must match the statement's placeholder count
/// exactly, which the connection checks before stepping.
///
/// ```
/// use sqlgate_core::Query;
///
/// let q = Query::new("INSERT INTO users(name, age) VALUES (?, ?)")
///     .bind("Ana")
///     .bind(34i64);
/// assert_eq!(q.values().map(<[_]>::len), Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    values: Option<Vec<Value>>,
}

impl Query {
    /// Create an unparameterized query from raw SQL text.
    ///
    /// Only safe for trusted SQL: nothing is escaped. Use `bind` for any
    /// caller-supplied data.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: None,
        }
    }

    /// Append a positional bind value.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.values.get_or_insert_with(Vec::new).push(value.into());
        self
    }

    /// The SQL text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The bound values, or `None` for an unparameterized query.
    pub fn values(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}
