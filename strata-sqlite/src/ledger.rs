//! SQLite-backed ledger store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use rusqlite::types::Value;
use tracing::{debug, info};

use strata_migrate::config::validate_table_name;
use strata_migrate::{DEFAULT_TABLE_NAME, LedgerRecord, LedgerStore, MigrateResult, MigrationError};

use crate::database::SqliteDatabase;
use crate::error::SqliteError;

/// Ledger store keeping migration records in a SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    db: SqliteDatabase,
    table_name: String,
}

impl SqliteLedgerStore {
    /// Create a store using the default table name.
    pub fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// Create a store with a custom table name.
    ///
    /// The name is interpolated into SQL, so it must be a plain identifier.
    pub fn with_table_name(db: SqliteDatabase, table_name: impl Into<String>) -> MigrateResult<Self> {
        let table_name = table_name.into();
        validate_table_name(&table_name)?;
        Ok(Self { db, table_name })
    }

    /// The database handle.
    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    /// DDL for the ledger table.
    pub fn create_table_sql(&self) -> String {
        format!(
            r#"CREATE TABLE "{}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name VARCHAR(255) NOT NULL,
    created TIMESTAMP NOT NULL,
    executed BOOLEAN DEFAULT 0
)"#,
            self.table_name
        )
    }

    async fn set_executed(&self, name: &str, executed: bool) -> MigrateResult<()> {
        let sql = format!(
            r#"UPDATE "{}" SET executed = ?1 WHERE name = ?2"#,
            self.table_name
        );
        self.db
            .execute(
                &sql,
                vec![Value::Integer(i64::from(executed)), Value::Text(name.to_string())],
            )
            .await?;
        Ok(())
    }
}

/// Whether `err` is SQLite reporting that `table` does not exist.
///
/// Matches the exact table so a missing table referenced from elsewhere
/// (a view, a trigger) is not mistaken for a missing ledger.
pub(crate) fn is_missing_table(err: &rusqlite::Error, table: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg
            .strip_prefix("no such table: ")
            .is_some_and(|missing| missing == table || missing == format!("main.{}", table)),
        _ => false,
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerRecord> {
    let created: DateTime<Utc> = row.get(2)?;
    let executed: Option<bool> = row.get(3)?;
    Ok(LedgerRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        created,
        executed: executed.unwrap_or(false),
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_table_if_missing(&self) -> MigrateResult<()> {
        let table = self.table_name.clone();
        let probe = format!(r#"SELECT 1 FROM "{}" LIMIT 1"#, table);

        let exists = self
            .db
            .inner()
            .call(move |conn| match conn.prepare(&probe) {
                Ok(mut stmt) => {
                    stmt.exists([])?;
                    Ok(true)
                }
                Err(e) if is_missing_table(&e, &table) => Ok(false),
                Err(e) => Err(e.into()),
            })
            .await
            .map_err(|e| MigrationError::store_probe(&self.table_name, e.to_string()))?;

        if exists {
            debug!(table = %self.table_name, "Ledger table exists");
            return Ok(());
        }

        self.db.execute_batch(&self.create_table_sql()).await?;
        info!(table = %self.table_name, "Created ledger table");
        Ok(())
    }

    async fn records(&self) -> MigrateResult<Vec<LedgerRecord>> {
        let sql = format!(
            r#"SELECT id, name, created, executed FROM "{}" ORDER BY created DESC, id DESC"#,
            self.table_name
        );

        let records = self
            .db
            .inner()
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], record_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(records)
    }

    async fn insert(&self, name: &str) -> MigrateResult<LedgerRecord> {
        let select = format!(
            r#"SELECT id, name, created, executed FROM "{}" WHERE name = ?1 ORDER BY id LIMIT 1"#,
            self.table_name
        );
        let insert = format!(
            r#"INSERT INTO "{}" (name, created, executed) VALUES (?1, ?2, 0)"#,
            self.table_name
        );
        let name = name.to_string();

        let record = self
            .db
            .inner()
            .call(move |conn| {
                let existing = conn
                    .query_row(&select, [&name], record_from_row)
                    .optional()?;
                if let Some(record) = existing {
                    return Ok(record);
                }

                let created = Utc::now();
                conn.execute(&insert, rusqlite::params![name, created])?;
                Ok(LedgerRecord::new(conn.last_insert_rowid(), name, created))
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(record)
    }

    async fn mark_executed(&self, name: &str) -> MigrateResult<()> {
        self.set_executed(name, true).await
    }

    async fn mark_not_executed(&self, name: &str) -> MigrateResult<()> {
        self.set_executed(name, false).await
    }
}
