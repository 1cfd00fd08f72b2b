//! Configuration file parsing for `strata.toml`.
//!
//! ```toml
//! [database]
//! url = "${DATABASE_URL}"
//!
//! [ledger]
//! table_name = "migrations"
//!
//! [debug]
//! log_level = "info"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::ledger::DEFAULT_TABLE_NAME;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MigrateConfig {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Ledger table settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Debug/logging settings.
    #[serde(default)]
    pub debug: DebugConfig,
}

impl MigrateConfig {
    /// Create a configuration for a database URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self::default().url(url)
    }

    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// `${VAR}` references are replaced with environment values; unset
    /// variables are left as written.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> MigrateResult<Self> {
        let expanded = expand_env_vars(content)?;
        let config: Self =
            toml::from_str(&expanded).map_err(|e| MigrationError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the database URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.database.url = Some(url.into());
        self
    }

    /// Set the ledger table name.
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.ledger.table_name = table_name.into();
        self
    }

    /// The database URL, if configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database.url.as_deref()
    }

    /// The driver named by the database URL.
    pub fn driver(&self) -> MigrateResult<Driver> {
        let url = self
            .database_url()
            .ok_or_else(|| MigrationError::config("database url is required"))?;
        Driver::from_url(url)
    }

    /// Check the configuration for values no store can work with.
    pub fn validate(&self) -> MigrateResult<()> {
        validate_table_name(&self.ledger.table_name)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL (supports `${ENV_VAR}` interpolation).
    pub url: Option<String>,
}

/// Ledger table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Name of the table holding migration records.
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
        }
    }
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

/// Debug/logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    /// Log level handed to [`crate::logging::init_with_level`].
    pub log_level: Option<String>,
}

/// Database driver type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// SQLite
    Sqlite,
    /// MySQL / MariaDB
    MySql,
    /// PostgreSQL
    Postgres,
}

impl Driver {
    /// Get the driver name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Parse driver from URL scheme.
    pub fn from_scheme(scheme: &str) -> MigrateResult<Self> {
        match scheme.to_lowercase().as_str() {
            "sqlite" | "sqlite3" | "file" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(MigrationError::unsupported_dialect(other)),
        }
    }

    /// Parse driver from a connection URL.
    pub fn from_url(url: &str) -> MigrateResult<Self> {
        if url == ":memory:" {
            return Ok(Self::Sqlite);
        }
        let (scheme, _) = url
            .split_once(':')
            .ok_or_else(|| MigrationError::config(format!("missing scheme in url '{}'", url)))?;
        Self::from_scheme(scheme)
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Check that a ledger table name is a plain SQL identifier.
pub fn validate_table_name(name: &str) -> MigrateResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MigrationError::config(format!(
            "invalid ledger table name '{}'",
            name
        )));
    }
    Ok(())
}

fn expand_env_vars(content: &str) -> MigrateResult<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| MigrationError::config(e.to_string()))?;
    let expanded = re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}
