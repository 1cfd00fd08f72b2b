//! SQLite database handle.

use std::any::Any;
use std::sync::Arc;

use rusqlite::types::Value;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use strata_migrate::DatabaseHandle;

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};

/// Driver name reported by [`SqliteDatabase`].
pub const DRIVER_NAME: &str = "sqlite";

/// A cloneable handle to one SQLite connection.
///
/// Clones share the same connection, so an in-memory database stays visible
/// to every migration and to the ledger store that hold a clone. Closing is
/// left to the owner: the connection closes when the last clone is dropped.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Connection,
    config: Arc<SqliteConfig>,
}

impl SqliteDatabase {
    /// Open a database with the given configuration.
    pub async fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            crate::config::DatabasePath::Memory => Connection::open_in_memory().await?,
            crate::config::DatabasePath::File(path) => Connection::open(path).await?,
        };

        let init_sql = config.init_sql();
        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await?;

        info!(path = %config.path.display(), "SQLite database opened");
        Ok(Self {
            conn,
            config: Arc::new(config),
        })
    }

    /// Open a database from a URL such as `sqlite://./app.db`.
    pub async fn open_url(url: &str) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?).await
    }

    /// Open a private in-memory database.
    pub async fn memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory()).await
    }

    /// The configuration this handle was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Get the inner connection.
    pub fn inner(&self) -> &Connection {
        &self.conn
    }

    /// Execute multiple statements in a batch.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }

    /// Execute a statement with parameters and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> SqliteResult<usize> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing statement");

        self.conn
            .call(move |conn| Ok(conn.execute(&sql, rusqlite::params_from_iter(params))?))
            .await
            .map_err(SqliteError::from)
    }

    /// Run a query returning a single integer, or `None` when it yields no row.
    pub async fn query_i64(&self, sql: &str, params: Vec<Value>) -> SqliteResult<Option<i64>> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing scalar query");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
                let value: Option<i64> = match rows.next()? {
                    Some(row) => Some(row.get(0)?),
                    None => None,
                };
                Ok(value)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Check whether a table exists in the main schema.
    pub async fn table_exists(&self, name: &str) -> SqliteResult<bool> {
        let found = self
            .query_i64(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                vec![Value::Text(name.to_string())],
            )
            .await?;
        Ok(found.is_some())
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.config.path)
            .finish_non_exhaustive()
    }
}

impl DatabaseHandle for SqliteDatabase {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
