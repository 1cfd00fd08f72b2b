//! # Strata
//!
//! Register, apply and roll back database migrations, with a ledger table
//! recording which ones ran.
//!
//! Strata provides:
//! - A [`Runner`] that applies pending migrations in registration order and
//!   reverts them most recent first
//! - A persistent ledger, stored in a table of the migrated database
//! - SQLite support built on `tokio-rusqlite`
//! - A factory that picks the ledger store for a database handle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> MigrateResult<()> {
//!     let config = MigrateConfig::from_file("strata.toml")?;
//!     let (db, mut runner) = strata::connect(&config).await?;
//!
//!     runner.register(
//!         SqlMigration::new("create_users", db.clone(), "CREATE TABLE users (id INTEGER)")
//!             .with_down_sql("DROP TABLE users"),
//!     )?;
//!
//!     let mut migrate = runner.migrate().await?;
//!     while let Some(key) = migrate.next().await {
//!         println!("applied {}", key?);
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod factory;

/// Migration engine: runner, ledger contract, configuration and logging.
pub mod migrate {
    pub use strata_migrate::*;
}

/// SQLite database handle and ledger store.
pub mod sqlite {
    pub use strata_sqlite::*;
}

pub use factory::{LedgerStoreFactory, connect};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::factory::{LedgerStoreFactory, connect};
    pub use strata_migrate::{
        DatabaseHandle, LedgerRecord, LedgerStore, MigrateConfig, MigrateResult, Migration,
        MigrationError, Runner, async_trait,
    };
    pub use strata_sqlite::{SqlMigration, SqliteDatabase, SqliteLedgerStore};
}

// Re-export key types at the crate root
pub use strata_migrate::{
    DatabaseHandle, LedgerRecord, LedgerStore, MemoryLedgerStore, MigrateConfig, MigrateResult,
    Migration, MigrationError, MigrationStatus, Runner,
};
pub use strata_sqlite::{SqlMigration, SqliteDatabase, SqliteLedgerStore};
