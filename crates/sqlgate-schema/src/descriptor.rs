//! Schema descriptors and migration scripts.

use serde::{Deserialize, Serialize};

/// An ordered, versioned unit of raw SQL plus the version it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// The stored version after this migration applies. Always positive.
    pub version: i64,
    /// Raw SQL, may contain multiple statements.
    pub script: String,
}

impl Migration {
    /// Create a new migration.
    ///
    /// # Panics
    /// Panics if `version` is not positive — a migration set with
    /// non-positive versions is a programming error, not a runtime fault.
    pub fn new(version: i64, script: impl Into<String>) -> Self {
        assert!(version > 0, "migration version must be positive, got {version}");
        Self {
            version,
            script: script.into(),
        }
    }
}

/// Declares the current schema version, the migrations needed to reach it,
/// and the tables that must exist once migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    current_version: i64,
    bootstrap: String,
    migrations: Vec<Migration>,
    required_tables: Vec<String>,
}

impl SchemaDescriptor {
    /// Start building a descriptor declaring `current_version`.
    ///
    /// # Panics
    /// Panics if `current_version` is not positive.
    pub fn builder(current_version: i64) -> SchemaBuilder {
        assert!(
            current_version > 0,
            "schema version must be positive, got {current_version}"
        );
        SchemaBuilder {
            current_version,
            bootstrap: String::new(),
            migrations: Vec::new(),
            required_tables: Vec::new(),
        }
    }

    /// The version this schema declares.
    pub fn current_version(&self) -> i64 {
        self.current_version
    }

    /// The creation script applied wholesale to a fresh database.
    pub fn bootstrap(&self) -> &str {
        &self.bootstrap
    }

    /// All migrations, sorted ascending by version.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// The migrations with a version greater than `stored`, in order.
    pub fn pending(&self, stored: i64) -> impl Iterator<Item = &Migration> {
        self.migrations.iter().filter(move |m| m.version > stored)
    }

    /// Tables that must exist once the schema is current.
    pub fn required_tables(&self) -> &[String] {
        &self.required_tables
    }
}

/// Builder for [`SchemaDescriptor`].
#[derive(Debug)]
pub struct SchemaBuilder {
    current_version: i64,
    bootstrap: String,
    migrations: Vec<Migration>,
    required_tables: Vec<String>,
}

impl SchemaBuilder {
    /// Set the bootstrap/creation script for fresh databases.
    pub fn bootstrap(mut self, sql: impl Into<String>) -> Self {
        self.bootstrap = sql.into();
        self
    }

    /// Add a migration producing `version`.
    pub fn migration(mut self, version: i64, script: impl Into<String>) -> Self {
        self.migrations.push(Migration::new(version, script));
        self
    }

    /// Require that a table exists once the schema is current.
    pub fn require_table(mut self, name: impl Into<String>) -> Self {
        self.required_tables.push(name.into());
        self
    }

    /// Finish building, checking the version contract.
    ///
    /// # Panics
    /// Panics when the migration set contains duplicate versions, or when
    /// its maximum version does not equal the declared current version.
    /// Both indicate a programming error in the schema definition.
    pub fn finish(mut self) -> SchemaDescriptor {
        self.migrations.sort_by_key(|m| m.version);
        for pair in self.migrations.windows(2) {
            assert!(
                pair[0].version != pair[1].version,
                "duplicate migration version {}",
                pair[0].version
            );
        }
        if let Some(last) = self.migrations.last() {
            assert!(
                last.version == self.current_version,
                "maximum migration version {} does not match declared schema version {}",
                last.version,
                self.current_version
            );
        }
        SchemaDescriptor {
            current_version: self.current_version,
            bootstrap: self.bootstrap,
            migrations: self.migrations,
            required_tables: self.required_tables,
        }
    }
}
