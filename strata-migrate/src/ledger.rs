//! Ledger records and the store that persists them.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrateResult;

/// Default name of the ledger table.
pub const DEFAULT_TABLE_NAME: &str = "migrations";

/// One row of the ledger: the history of a single migration key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Store-assigned identifier.
    pub id: i64,
    /// Migration key.
    pub name: String,
    /// When the record was first inserted.
    pub created: DateTime<Utc>,
    /// Whether the migration is currently applied.
    pub executed: bool,
}

impl LedgerRecord {
    /// Create a record that has not been executed yet.
    pub fn new(id: i64, name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            created,
            executed: false,
        }
    }

    /// Set the executed flag.
    pub fn executed(mut self, executed: bool) -> Self {
        self.executed = executed;
        self
    }

    /// Most recent first: `created` descending, then `id` descending.
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        other
            .created
            .cmp(&self.created)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Persistence for ledger records.
///
/// Adapters own the SQL dialect. None of the calls need to be transactional;
/// the runner is the only writer during a run.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Name of the backing table.
    fn table_name(&self) -> &str;

    /// Create the backing table unless it already exists.
    ///
    /// Only the store's "table does not exist" signal may lead to creation;
    /// any other probe failure is returned as
    /// [`MigrationError::StoreProbe`](crate::MigrationError::StoreProbe).
    async fn create_table_if_missing(&self) -> MigrateResult<()>;

    /// All records, most recently created first (`created` desc, `id` desc).
    async fn records(&self) -> MigrateResult<Vec<LedgerRecord>>;

    /// Insert a record for `name`, or return the existing one.
    async fn insert(&self, name: &str) -> MigrateResult<LedgerRecord>;

    /// Flag the record for `name` as executed.
    async fn mark_executed(&self, name: &str) -> MigrateResult<()>;

    /// Flag the record for `name` as not executed.
    async fn mark_not_executed(&self, name: &str) -> MigrateResult<()>;
}

#[async_trait]
impl<S: LedgerStore + ?Sized> LedgerStore for Box<S> {
    fn table_name(&self) -> &str {
        (**self).table_name()
    }

    async fn create_table_if_missing(&self) -> MigrateResult<()> {
        (**self).create_table_if_missing().await
    }

    async fn records(&self) -> MigrateResult<Vec<LedgerRecord>> {
        (**self).records().await
    }

    async fn insert(&self, name: &str) -> MigrateResult<LedgerRecord> {
        (**self).insert(name).await
    }

    async fn mark_executed(&self, name: &str) -> MigrateResult<()> {
        (**self).mark_executed(name).await
    }

    async fn mark_not_executed(&self, name: &str) -> MigrateResult<()> {
        (**self).mark_not_executed(name).await
    }
}

#[async_trait]
impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn table_name(&self) -> &str {
        (**self).table_name()
    }

    async fn create_table_if_missing(&self) -> MigrateResult<()> {
        (**self).create_table_if_missing().await
    }

    async fn records(&self) -> MigrateResult<Vec<LedgerRecord>> {
        (**self).records().await
    }

    async fn insert(&self, name: &str) -> MigrateResult<LedgerRecord> {
        (**self).insert(name).await
    }

    async fn mark_executed(&self, name: &str) -> MigrateResult<()> {
        (**self).mark_executed(name).await
    }

    async fn mark_not_executed(&self, name: &str) -> MigrateResult<()> {
        (**self).mark_not_executed(name).await
    }
}
