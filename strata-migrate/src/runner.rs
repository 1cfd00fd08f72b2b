//! The migration runner.

use std::collections::{HashMap, VecDeque};

use futures::Stream;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{LedgerRecord, LedgerStore};
use crate::migration::Migration;

/// Applies and reverts registered migrations, keeping the ledger in step.
///
/// `migrate` walks migrations in registration order. `rollback` and `reset`
/// walk the ledger, most recently created record first, and only touch
/// records whose key is currently registered.
pub struct Runner<S: LedgerStore> {
    store: S,
    migrations: IndexMap<String, Box<dyn Migration>>,
    existing: HashMap<String, LedgerRecord>,
}

impl<S: LedgerStore> Runner<S> {
    /// Create a runner on top of a ledger store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            migrations: IndexMap::new(),
            existing: HashMap::new(),
        }
    }

    /// The ledger store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registered migrations in registration order.
    pub fn migrations(&self) -> &IndexMap<String, Box<dyn Migration>> {
        &self.migrations
    }

    /// Register a migration.
    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> MigrateResult<&mut Self> {
        self.insert(Box::new(migration))?;
        Ok(self)
    }

    /// Register several migrations, in order.
    ///
    /// Stops at the first duplicate key; migrations before it stay registered.
    pub fn register_all<I>(&mut self, migrations: I) -> MigrateResult<&mut Self>
    where
        I: IntoIterator<Item = Box<dyn Migration>>,
    {
        for migration in migrations {
            self.insert(migration)?;
        }
        Ok(self)
    }

    fn insert(&mut self, migration: Box<dyn Migration>) -> MigrateResult<()> {
        let key = migration.key().to_string();
        if self.migrations.contains_key(&key) {
            return Err(MigrationError::DuplicateMigration(key));
        }
        debug!(key = %key, "Registered migration");
        self.migrations.insert(key, migration);
        Ok(())
    }

    /// Apply pending migrations lazily.
    ///
    /// The ledger is bootstrapped before this returns; each call to
    /// [`Migrate::next`] then applies at most one migration.
    pub async fn migrate(&mut self) -> MigrateResult<Migrate<'_, S>> {
        self.bootstrap().await?;
        Ok(Migrate {
            runner: self,
            position: 0,
            done: false,
        })
    }

    /// Apply all pending migrations and return their keys.
    pub async fn migrate_all(&mut self) -> MigrateResult<Vec<String>> {
        let mut migrate = self.migrate().await?;
        let mut applied = Vec::new();
        while let Some(key) = migrate.next().await {
            applied.push(key?);
        }
        Ok(applied)
    }

    /// Revert the most recently created migration that is still applied.
    ///
    /// Returns `None` when nothing is applied, or when the most recent
    /// applied record belongs to a migration that is not registered.
    pub async fn rollback(&mut self) -> MigrateResult<Option<String>> {
        self.bootstrap().await?;

        let Some(key) = self.applied_by_recency().first().map(|r| r.name.clone()) else {
            debug!("Nothing to roll back");
            return Ok(None);
        };

        if !self.migrations.contains_key(&key) {
            warn!(key = %key, "Latest applied migration is not registered, skipping rollback");
            return Ok(None);
        }

        self.revert(&key).await?;
        Ok(Some(key))
    }

    /// Revert every applied, registered migration lazily, most recent first.
    pub async fn reset(&mut self) -> MigrateResult<Reset<'_, S>> {
        self.bootstrap().await?;

        let mut queue = VecDeque::new();
        for record in self.applied_by_recency() {
            if self.migrations.contains_key(&record.name) {
                queue.push_back(record.name.clone());
            } else {
                debug!(key = %record.name, "Skipping unregistered migration");
            }
        }

        Ok(Reset {
            runner: self,
            queue,
            done: false,
        })
    }

    /// Revert every applied, registered migration and return their keys.
    pub async fn reset_all(&mut self) -> MigrateResult<Vec<String>> {
        let mut reset = self.reset().await?;
        let mut reverted = Vec::new();
        while let Some(key) = reset.next().await {
            reverted.push(key?);
        }
        Ok(reverted)
    }

    /// Report which registered migrations are applied or pending.
    pub async fn status(&mut self) -> MigrateResult<MigrationStatus> {
        self.bootstrap().await?;

        let (applied, pending): (Vec<String>, Vec<String>) = self
            .migrations
            .keys()
            .cloned()
            .partition(|key| !self.should_perform(key));

        let mut orphaned: Vec<LedgerRecord> = self
            .existing
            .values()
            .filter(|r| !self.migrations.contains_key(&r.name))
            .cloned()
            .collect();
        orphaned.sort_by(LedgerRecord::cmp_recency);

        Ok(MigrationStatus {
            applied,
            pending,
            orphaned,
        })
    }

    async fn bootstrap(&mut self) -> MigrateResult<()> {
        self.store.create_table_if_missing().await?;
        let records = self.store.records().await?;
        debug!(
            table = %self.store.table_name(),
            records = records.len(),
            "Loaded ledger"
        );
        self.existing = records.into_iter().map(|r| (r.name.clone(), r)).collect();
        Ok(())
    }

    fn should_perform(&self, key: &str) -> bool {
        self.existing.get(key).is_none_or(|record| !record.executed)
    }

    fn applied_by_recency(&self) -> Vec<&LedgerRecord> {
        let mut applied: Vec<_> = self.existing.values().filter(|r| r.executed).collect();
        applied.sort_by(|a, b| a.cmp_recency(b));
        applied
    }

    async fn perform(&mut self, key: &str) -> MigrateResult<()> {
        let migration = self
            .migrations
            .get(key)
            .ok_or_else(|| MigrationError::NotRegistered(key.to_string()))?;

        migration.up().await?;
        let record = self.store.insert(key).await?;
        self.store.mark_executed(key).await?;

        info!(key = %key, id = record.id, "Applied migration");
        self.existing.insert(key.to_string(), record.executed(true));
        Ok(())
    }

    async fn revert(&mut self, key: &str) -> MigrateResult<()> {
        let migration = self
            .migrations
            .get(key)
            .ok_or_else(|| MigrationError::NotRegistered(key.to_string()))?;

        migration.down().await?;
        self.store.mark_not_executed(key).await?;

        info!(key = %key, "Reverted migration");
        if let Some(record) = self.existing.get_mut(key) {
            record.executed = false;
        }
        Ok(())
    }
}

/// Lazy cursor over pending migrations, created by [`Runner::migrate`].
///
/// Dropping the cursor early leaves the remaining migrations untouched.
pub struct Migrate<'r, S: LedgerStore> {
    runner: &'r mut Runner<S>,
    position: usize,
    done: bool,
}

impl<'r, S: LedgerStore> Migrate<'r, S> {
    /// Apply the next pending migration and return its key.
    ///
    /// Returns `None` once every registered migration has been considered,
    /// or after an error has been returned.
    pub async fn next(&mut self) -> Option<MigrateResult<String>> {
        if self.done {
            return None;
        }

        while let Some(key) = self.runner.migrations.get_index(self.position).map(|(k, _)| k) {
            self.position += 1;

            if !self.runner.should_perform(key) {
                debug!(key = %key, "Migration already applied");
                continue;
            }

            let key = key.clone();
            return match self.runner.perform(&key).await {
                Ok(()) => Some(Ok(key)),
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            };
        }

        self.done = true;
        None
    }

    /// Convert the cursor into a stream of applied keys.
    pub fn into_stream(self) -> impl Stream<Item = MigrateResult<String>> + 'r {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }
}

/// Lazy cursor over migrations to revert, created by [`Runner::reset`].
pub struct Reset<'r, S: LedgerStore> {
    runner: &'r mut Runner<S>,
    queue: VecDeque<String>,
    done: bool,
}

impl<'r, S: LedgerStore> Reset<'r, S> {
    /// Revert the next migration and return its key.
    pub async fn next(&mut self) -> Option<MigrateResult<String>> {
        if self.done {
            return None;
        }

        let Some(key) = self.queue.pop_front() else {
            self.done = true;
            return None;
        };

        match self.runner.revert(&key).await {
            Ok(()) => Some(Ok(key)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Keys still waiting to be reverted.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Convert the cursor into a stream of reverted keys.
    pub fn into_stream(self) -> impl Stream<Item = MigrateResult<String>> + 'r {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }
}

/// Migration status information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Registered migrations that are applied, in registration order.
    pub applied: Vec<String>,
    /// Registered migrations that are not applied, in registration order.
    pub pending: Vec<String>,
    /// Ledger records without a registered migration, most recent first.
    pub orphaned: Vec<LedgerRecord>,
}

impl MigrationStatus {
    /// Check if there's anything to migrate.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get a summary of the status.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} applied", self.applied.len()),
            format!("{} pending", self.pending.len()),
        ];
        if !self.orphaned.is_empty() {
            parts.push(format!("{} unregistered", self.orphaned.len()));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use parking_lot::Mutex;

    use super::*;
    use crate::memory::MemoryLedgerStore;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Step {
        key: &'static str,
        journal: Journal,
        fail_up: bool,
    }

    impl Step {
        fn new(key: &'static str, journal: &Journal) -> Self {
            Self {
                key,
                journal: journal.clone(),
                fail_up: false,
            }
        }

        fn failing(key: &'static str, journal: &Journal) -> Self {
            Self {
                fail_up: true,
                ..Self::new(key, journal)
            }
        }
    }

    #[async_trait]
    impl Migration for Step {
        fn key(&self) -> &str {
            self.key
        }

        async fn up(&self) -> MigrateResult<()> {
            if self.fail_up {
                return Err(MigrationError::other(format!("{} exploded", self.key)));
            }
            self.journal.lock().push(format!("up:{}", self.key));
            Ok(())
        }

        async fn down(&self) -> MigrateResult<()> {
            self.journal.lock().push(format!("down:{}", self.key));
            Ok(())
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn runner_with(keys: &[&'static str], journal: &Journal) -> Runner<Arc<MemoryLedgerStore>> {
        let mut runner = Runner::new(Arc::new(MemoryLedgerStore::new()));
        for key in keys {
            runner.register(Step::new(key, journal)).unwrap();
        }
        runner
    }

    #[test]
    fn test_register_rejects_duplicate_key() {
        let journal = journal();
        let mut runner = Runner::new(MemoryLedgerStore::new());
        runner.register(Step::new("a", &journal)).unwrap();

        let err = runner.register(Step::new("a", &journal)).err().unwrap();
        assert!(matches!(err, MigrationError::DuplicateMigration(ref k) if k == "a"));
        assert_eq!(runner.migrations().len(), 1);
    }

    #[test]
    fn test_register_all_keeps_prefix_before_duplicate() {
        let journal = journal();
        let mut runner = Runner::new(MemoryLedgerStore::new());
        let batch: Vec<Box<dyn Migration>> = vec![
            Box::new(Step::new("a", &journal)),
            Box::new(Step::new("b", &journal)),
            Box::new(Step::new("a", &journal)),
            Box::new(Step::new("c", &journal)),
        ];

        assert!(runner.register_all(batch).is_err());
        let keys: Vec<_> = runner.migrations().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_migrate_creates_ledger_table() {
        let journal = journal();
        let mut runner = runner_with(&[], &journal);

        assert!(runner.migrate_all().await.unwrap().is_empty());
        assert!(runner.store().table_exists());
        assert!(runner.store().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_uses_registration_order() {
        let journal = journal();
        let mut runner = runner_with(&["b", "a", "c"], &journal);

        assert_eq!(runner.migrate_all().await.unwrap(), vec!["b", "a", "c"]);
        assert_eq!(*journal.lock(), vec!["up:b", "up:a", "up:c"]);
        assert!(runner.store().snapshot().iter().all(|r| r.executed));
    }

    #[tokio::test]
    async fn test_migrate_twice_is_noop() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);

        runner.migrate_all().await.unwrap();
        assert!(runner.migrate_all().await.unwrap().is_empty());
        assert_eq!(journal.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_migrate_is_lazy() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b", "c"], &journal);

        {
            let mut migrate = runner.migrate().await.unwrap();
            assert_eq!(migrate.next().await.unwrap().unwrap(), "a");
        }

        assert_eq!(*journal.lock(), vec!["up:a"]);
        assert_eq!(runner.migrate_all().await.unwrap(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_migrate_stream() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);

        let keys: Vec<_> = runner
            .migrate()
            .await
            .unwrap()
            .into_stream()
            .map(|k| k.unwrap())
            .collect()
            .await;
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_migration_stops_run() {
        let journal = journal();
        let mut runner = Runner::new(Arc::new(MemoryLedgerStore::new()));
        runner.register(Step::new("a", &journal)).unwrap();
        runner.register(Step::failing("b", &journal)).unwrap();
        runner.register(Step::new("c", &journal)).unwrap();

        let mut migrate = runner.migrate().await.unwrap();
        assert_eq!(migrate.next().await.unwrap().unwrap(), "a");
        assert!(matches!(
            migrate.next().await,
            Some(Err(MigrationError::Other(_)))
        ));
        assert!(migrate.next().await.is_none());
        drop(migrate);

        let records = runner.store().snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a");
        assert!(records[0].executed);
        assert_eq!(*journal.lock(), vec!["up:a"]);
    }

    #[tokio::test]
    async fn test_migrate_all_propagates_error() {
        let journal = journal();
        let mut runner = Runner::new(MemoryLedgerStore::new());
        runner.register(Step::failing("a", &journal)).unwrap();

        let err = runner.migrate_all().await.unwrap_err();
        assert_eq!(err.to_string(), "Migration error: a exploded");
    }

    #[tokio::test]
    async fn test_reset_reverses_creation_order() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);
        runner.migrate_all().await.unwrap();

        assert_eq!(runner.reset_all().await.unwrap(), vec!["b", "a"]);
        assert!(runner.store().snapshot().iter().all(|r| !r.executed));
        assert!(runner.reset_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_skips_unregistered_records() {
        let journal = journal();
        let mut runner = runner_with(&["a"], &journal);
        let created = Utc.with_ymd_and_hms(2019, 10, 19, 0, 0, 0).unwrap();
        runner
            .store()
            .seed(LedgerRecord::new(1, "c", created).executed(true));

        runner.migrate_all().await.unwrap();

        assert_eq!(runner.reset_all().await.unwrap(), vec!["a"]);
        let orphan = runner
            .store()
            .snapshot()
            .into_iter()
            .find(|r| r.name == "c")
            .unwrap();
        assert!(orphan.executed);
    }

    #[tokio::test]
    async fn test_reset_is_lazy() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b", "c"], &journal);
        runner.migrate_all().await.unwrap();

        let mut reset = runner.reset().await.unwrap();
        assert_eq!(reset.remaining(), 3);
        assert_eq!(reset.next().await.unwrap().unwrap(), "c");
        assert_eq!(reset.remaining(), 2);
        drop(reset);

        let status = runner.status().await.unwrap();
        assert_eq!(status.applied, vec!["a", "b"]);
        assert_eq!(status.pending, vec!["c"]);
    }

    #[tokio::test]
    async fn test_rollback_without_applied_returns_none() {
        let journal = journal();
        let mut runner = runner_with(&["a"], &journal);

        assert_eq!(runner.rollback().await.unwrap(), None);
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_twice_with_single_migration() {
        let journal = journal();
        let mut runner = runner_with(&["a"], &journal);
        runner.migrate_all().await.unwrap();

        assert_eq!(runner.rollback().await.unwrap(), Some("a".to_string()));
        assert_eq!(runner.rollback().await.unwrap(), None);
        assert_eq!(*journal.lock(), vec!["up:a", "down:a"]);
    }

    #[tokio::test]
    async fn test_rollback_walks_back_one_at_a_time() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);
        runner.migrate_all().await.unwrap();

        assert_eq!(runner.rollback().await.unwrap(), Some("b".to_string()));
        assert_eq!(runner.rollback().await.unwrap(), Some("a".to_string()));
        assert_eq!(runner.rollback().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rollback_stops_at_unregistered_record() {
        let journal = journal();
        let mut runner = runner_with(&["a"], &journal);
        runner.migrate_all().await.unwrap();

        let future = Utc::now() + chrono::Duration::days(1);
        runner
            .store()
            .seed(LedgerRecord::new(99, "gone", future).executed(true));

        assert_eq!(runner.rollback().await.unwrap(), None);
        assert_eq!(*journal.lock(), vec!["up:a"]);
    }

    #[tokio::test]
    async fn test_rollback_then_migrate_reuses_record() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);
        runner.migrate_all().await.unwrap();
        runner.rollback().await.unwrap();

        assert_eq!(runner.migrate_all().await.unwrap(), vec!["b"]);
        assert_eq!(runner.store().snapshot().len(), 2);
        assert_eq!(*journal.lock(), vec!["up:a", "up:b", "down:b", "up:b"]);
    }

    #[tokio::test]
    async fn test_equal_timestamps_fall_back_to_id() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        runner
            .store()
            .seed(LedgerRecord::new(1, "b", created).executed(true));
        runner
            .store()
            .seed(LedgerRecord::new(2, "a", created).executed(true));

        assert_eq!(runner.reset_all().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_status_reports_orphans() {
        let journal = journal();
        let mut runner = runner_with(&["a", "b"], &journal);
        runner
            .store()
            .seed(LedgerRecord::new(1, "legacy", Utc::now()).executed(true));

        let mut migrate = runner.migrate().await.unwrap();
        migrate.next().await.unwrap().unwrap();
        drop(migrate);

        let status = runner.status().await.unwrap();
        assert_eq!(status.applied, vec!["a"]);
        assert_eq!(status.pending, vec!["b"]);
        assert_eq!(status.orphaned.len(), 1);
        assert_eq!(status.orphaned[0].name, "legacy");
        assert!(!status.is_up_to_date());
        assert_eq!(status.summary(), "1 applied, 1 pending, 1 unregistered");
    }

    struct ReadOnlyStore(MemoryLedgerStore);

    #[async_trait]
    impl LedgerStore for ReadOnlyStore {
        fn table_name(&self) -> &str {
            self.0.table_name()
        }

        async fn create_table_if_missing(&self) -> MigrateResult<()> {
            self.0.create_table_if_missing().await
        }

        async fn records(&self) -> MigrateResult<Vec<LedgerRecord>> {
            self.0.records().await
        }

        async fn insert(&self, name: &str) -> MigrateResult<LedgerRecord> {
            self.0.insert(name).await
        }

        async fn mark_executed(&self, _name: &str) -> MigrateResult<()> {
            Err(MigrationError::database("attempt to write a readonly database"))
        }

        async fn mark_not_executed(&self, _name: &str) -> MigrateResult<()> {
            Err(MigrationError::database("attempt to write a readonly database"))
        }
    }

    #[tokio::test]
    async fn test_failed_store_write_leaves_cache_untouched() {
        let journal = journal();
        let mut runner = Runner::new(ReadOnlyStore(MemoryLedgerStore::new()));
        runner.register(Step::new("a", &journal)).unwrap();

        assert!(matches!(
            runner.migrate_all().await,
            Err(MigrationError::Database(_))
        ));
        assert!(!runner.existing.get("a").is_some_and(|r| r.executed));
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        struct BrokenStore;

        #[async_trait]
        impl LedgerStore for BrokenStore {
            fn table_name(&self) -> &str {
                "migrations"
            }

            async fn create_table_if_missing(&self) -> MigrateResult<()> {
                Err(MigrationError::store_probe("migrations", "database is locked"))
            }

            async fn records(&self) -> MigrateResult<Vec<LedgerRecord>> {
                unreachable!()
            }

            async fn insert(&self, _name: &str) -> MigrateResult<LedgerRecord> {
                unreachable!()
            }

            async fn mark_executed(&self, _name: &str) -> MigrateResult<()> {
                unreachable!()
            }

            async fn mark_not_executed(&self, _name: &str) -> MigrateResult<()> {
                unreachable!()
            }
        }

        let mut runner = Runner::new(BrokenStore);
        assert!(matches!(
            runner.rollback().await,
            Err(MigrationError::StoreProbe { .. })
        ));
    }
}
