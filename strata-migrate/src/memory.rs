//! In-memory ledger store.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{DEFAULT_TABLE_NAME, LedgerRecord, LedgerStore};

/// A ledger store that keeps its records in memory.
///
/// Behaves like a database-backed store, including reporting a missing table
/// until [`LedgerStore::create_table_if_missing`] has been called. Useful for
/// tests and for runs whose history does not need to outlive the process.
#[derive(Debug)]
pub struct MemoryLedgerStore {
    table_name: String,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    created: bool,
    next_id: i64,
    records: Vec<LedgerRecord>,
}

impl MemoryLedgerStore {
    /// Create an empty store using the default table name.
    pub fn new() -> Self {
        Self::with_table_name(DEFAULT_TABLE_NAME)
    }

    /// Create an empty store with a custom table name.
    pub fn with_table_name(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Insert a record as-is, creating the table if needed.
    ///
    /// The record keeps its own `id` and `created`; later inserts are
    /// numbered after the highest id seen.
    pub fn seed(&self, record: LedgerRecord) {
        let mut state = self.state.lock();
        state.created = true;
        state.next_id = state.next_id.max(record.id + 1);
        state.records.push(record);
    }

    /// Whether the backing table has been created.
    pub fn table_exists(&self) -> bool {
        self.state.lock().created
    }

    /// Snapshot of the stored records in insertion order.
    pub fn snapshot(&self) -> Vec<LedgerRecord> {
        self.state.lock().records.clone()
    }

    fn missing_table(&self) -> MigrationError {
        MigrationError::database(format!("no such table: {}", self.table_name))
    }

    fn set_executed(&self, name: &str, executed: bool) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if !state.created {
            return Err(self.missing_table());
        }
        for record in state.records.iter_mut().filter(|r| r.name == name) {
            record.executed = executed;
        }
        Ok(())
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_table_if_missing(&self) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if !state.created {
            debug!(table = %self.table_name, "Creating in-memory ledger table");
            state.created = true;
        }
        Ok(())
    }

    async fn records(&self) -> MigrateResult<Vec<LedgerRecord>> {
        let state = self.state.lock();
        if !state.created {
            return Err(self.missing_table());
        }
        let mut records = state.records.clone();
        records.sort_by(LedgerRecord::cmp_recency);
        Ok(records)
    }

    async fn insert(&self, name: &str) -> MigrateResult<LedgerRecord> {
        let mut state = self.state.lock();
        if !state.created {
            return Err(self.missing_table());
        }
        if let Some(existing) = state.records.iter().find(|r| r.name == name) {
            return Ok(existing.clone());
        }

        let record = LedgerRecord::new(state.next_id, name, Utc::now());
        state.next_id += 1;
        state.records.push(record.clone());
        Ok(record)
    }

    async fn mark_executed(&self, name: &str) -> MigrateResult<()> {
        self.set_executed(name, true)
    }

    async fn mark_not_executed(&self, name: &str) -> MigrateResult<()> {
        self.set_executed(name, false)
    }
}
