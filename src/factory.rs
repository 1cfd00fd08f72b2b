//! Ledger store selection by database driver.

use tracing::debug;

use strata_migrate::logging;
use strata_migrate::{
    DatabaseHandle, Driver, LedgerStore, MigrateConfig, MigrateResult, MigrationError, Runner,
};
use strata_sqlite::{SqliteDatabase, SqliteLedgerStore};

/// Picks the ledger store implementation matching a database handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerStoreFactory;

impl LedgerStoreFactory {
    /// Create the ledger store for `handle`, keeping records in `table_name`.
    ///
    /// Fails with [`MigrationError::UnsupportedDialect`] when no store exists
    /// for the handle's driver.
    pub fn create(
        handle: &dyn DatabaseHandle,
        table_name: &str,
    ) -> MigrateResult<Box<dyn LedgerStore>> {
        let driver = handle.driver_name();

        if driver.to_lowercase().contains(Driver::Sqlite.name()) {
            let db = handle
                .as_any()
                .downcast_ref::<SqliteDatabase>()
                .ok_or_else(|| MigrationError::unsupported_dialect(driver))?;
            debug!(driver = %driver, table = %table_name, "Selected SQLite ledger store");
            let store = SqliteLedgerStore::with_table_name(db.clone(), table_name)?;
            return Ok(Box::new(store));
        }

        Err(MigrationError::unsupported_dialect(driver))
    }

    /// Create a runner backed by the ledger store for `handle`.
    pub fn create_runner(
        handle: &dyn DatabaseHandle,
        table_name: &str,
    ) -> MigrateResult<Runner<Box<dyn LedgerStore>>> {
        Ok(Runner::new(Self::create(handle, table_name)?))
    }
}

/// Open the configured database and build a runner for it.
///
/// The returned handle is what migrations should hold on to; the runner
/// shares its connection for the ledger. A `[debug] log_level` installs the
/// log subscriber when the `tracing-subscriber` feature is enabled.
pub async fn connect(
    config: &MigrateConfig,
) -> MigrateResult<(SqliteDatabase, Runner<Box<dyn LedgerStore>>)> {
    config.validate()?;
    if let Some(level) = config.debug.log_level.as_deref() {
        logging::init_with_level(level);
    }

    let url = config
        .database_url()
        .ok_or_else(|| MigrationError::config("database url is required"))?;

    match config.driver()? {
        Driver::Sqlite => {
            let db = SqliteDatabase::open_url(url).await?;
            let runner = LedgerStoreFactory::create_runner(&db, &config.ledger.table_name)?;
            Ok((db, runner))
        }
        other => Err(MigrationError::unsupported_dialect(other.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct FakeHandle(&'static str);

    impl DatabaseHandle for FakeHandle {
        fn driver_name(&self) -> &str {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_create_sqlite_store() {
        let db = SqliteDatabase::memory().await.unwrap();
        let store = LedgerStoreFactory::create(&db, "history").unwrap();
        assert_eq!(store.table_name(), "history");
    }

    #[test]
    fn test_unknown_driver_is_unsupported() {
        let err = LedgerStoreFactory::create(&FakeHandle("mysql"), "migrations")
            .err()
            .unwrap();
        assert!(matches!(err, MigrationError::UnsupportedDialect(ref d) if d == "mysql"));
    }

    #[test]
    fn test_foreign_sqlite_handle_is_unsupported() {
        let err = LedgerStoreFactory::create(&FakeHandle("libsqlite3"), "migrations")
            .err()
            .unwrap();
        assert!(matches!(err, MigrationError::UnsupportedDialect(_)));
    }

    #[tokio::test]
    async fn test_connect_requires_url() {
        let err = connect(&MigrateConfig::default()).await.err().unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_connect_rejects_other_drivers() {
        let config = MigrateConfig::new("postgres://localhost/app");
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, MigrationError::UnsupportedDialect(ref d) if d == "postgres"));
    }
}
