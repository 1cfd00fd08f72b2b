//! Migrations expressed as raw SQL.

use async_trait::async_trait;
use tracing::debug;

use strata_migrate::{MigrateResult, Migration, MigrationError};

use crate::database::SqliteDatabase;

/// A migration whose actions are SQL batches.
///
/// ```rust,ignore
/// let create_users = SqlMigration::new(
///     "2024_01_create_users",
///     db.clone(),
///     "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
/// )
/// .with_down_sql("DROP TABLE users");
///
/// runner.register(create_users)?;
/// ```
#[derive(Debug, Clone)]
pub struct SqlMigration {
    key: String,
    db: SqliteDatabase,
    up_sql: String,
    down_sql: Option<String>,
}

impl SqlMigration {
    /// Create an irreversible migration. Add a down action with
    /// [`with_down_sql`](Self::with_down_sql).
    pub fn new(key: impl Into<String>, db: SqliteDatabase, up_sql: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            db,
            up_sql: up_sql.into(),
            down_sql: None,
        }
    }

    /// Set the SQL that reverts this migration.
    pub fn with_down_sql(mut self, sql: impl Into<String>) -> Self {
        self.down_sql = Some(sql.into());
        self
    }

    /// SQL run by `up`.
    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    /// SQL run by `down`, if any.
    pub fn down_sql(&self) -> Option<&str> {
        self.down_sql.as_deref()
    }

    /// Whether `down` can revert this migration.
    pub fn is_reversible(&self) -> bool {
        self.down_sql.is_some()
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn key(&self) -> &str {
        &self.key
    }

    async fn up(&self) -> MigrateResult<()> {
        debug!(key = %self.key, "Running up SQL");
        self.db.execute_batch(&self.up_sql).await?;
        Ok(())
    }

    async fn down(&self) -> MigrateResult<()> {
        let Some(sql) = &self.down_sql else {
            return Err(MigrationError::Irreversible(self.key.clone()));
        };
        debug!(key = %self.key, "Running down SQL");
        self.db.execute_batch(sql).await?;
        Ok(())
    }
}
