//! SQLite connection configuration.

use std::path::{Path, PathBuf};

use crate::error::{SqliteError, SqliteResult};

/// Where the database lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database, private to one connection.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Check if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    /// Display form used in logs.
    pub fn display(&self) -> String {
        match self {
            Self::Memory => ":memory:".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// Delete the rollback journal after each transaction.
    #[default]
    Delete,
    /// Write-ahead logging.
    Wal,
    /// Keep the journal in memory.
    Memory,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Wal => "WAL",
            Self::Memory => "MEMORY",
        }
    }

    fn parse(value: &str) -> SqliteResult<Self> {
        match value.to_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "wal" => Ok(Self::Wal),
            "memory" => Ok(Self::Memory),
            other => Err(SqliteError::config(format!("unknown journal_mode '{}'", other))),
        }
    }
}

/// SQLite database configuration.
///
/// Migrations mostly run DDL, so the defaults favour predictability over
/// throughput: rollback journal, foreign keys on, a short busy timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database path.
    pub path: DatabasePath,
    /// Enforce foreign keys.
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            journal_mode: JournalMode::Delete,
        }
    }
}

impl SqliteConfig {
    /// Configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for a file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a SQLite URL.
    ///
    /// Supported formats:
    /// - `sqlite::memory:` or `:memory:` - In-memory database
    /// - `sqlite://path/to/db.sqlite` - File-based database
    /// - `sqlite:path/to/db.sqlite`, `sqlite3:path/to/db.sqlite` or
    ///   `file:path/to/db.sqlite`
    ///
    /// Recognised query parameters: `foreign_keys`, `busy_timeout`,
    /// `journal_mode`.
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url = url.as_ref();
        let (location, query) = match url.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (url, None),
        };

        let path = ["sqlite://", "sqlite3://", "sqlite:", "sqlite3:", "file:"]
            .iter()
            .find_map(|prefix| location.strip_prefix(prefix))
            .unwrap_or(location);

        let mut config = match path {
            "" => return Err(SqliteError::config("database path is required")),
            ":memory:" => Self::memory(),
            path => Self::file(path),
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = matches!(value, "true" | "1" | "on"),
                "busy_timeout" => {
                    let ms = value.parse().map_err(|_| {
                        SqliteError::config(format!("invalid busy_timeout '{}'", value))
                    })?;
                    config.busy_timeout_ms = Some(ms);
                }
                "journal_mode" => config.journal_mode = JournalMode::parse(value)?,
                _ => {}
            }
        }

        Ok(config)
    }

    /// Pragmas to run on a freshly opened connection.
    pub fn init_sql(&self) -> String {
        let mut sql = format!(
            "PRAGMA foreign_keys = {};\nPRAGMA journal_mode = {};\n",
            if self.foreign_keys { "ON" } else { "OFF" },
            self.journal_mode.as_pragma()
        );
        if let Some(timeout) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {};\n", timeout));
        }
        sql
    }

    /// Enable or disable foreign keys.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }
}
