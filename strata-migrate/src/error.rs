//! Error types for the migration runner.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration with the same key is already registered.
    #[error("Migration already registered: {0}")]
    DuplicateMigration(String),

    /// No ledger store exists for the database driver.
    #[error("Database type not implemented: {0}")]
    UnsupportedDialect(String),

    /// The ledger table existence probe failed for a reason other than a missing table.
    #[error("Failed to probe ledger table '{table}': {message}")]
    StoreProbe {
        /// Ledger table name.
        table: String,
        /// Error reported by the database.
        message: String,
    },

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// The migration has no down action.
    #[error("Migration '{0}' cannot be reverted")]
    Irreversible(String),

    /// The key does not belong to a registered migration.
    #[error("Migration '{0}' is not registered")]
    NotRegistered(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a store probe error.
    pub fn store_probe(table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StoreProbe {
            table: table.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported dialect error.
    pub fn unsupported_dialect(driver: impl Into<String>) -> Self {
        Self::UnsupportedDialect(driver.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this error stems from how the runner was set up rather than
    /// from the database or a migration action.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateMigration(_) | Self::UnsupportedDialect(_) | Self::Config(_)
        )
    }
}
