//! SQLite support for Strata migrations.
//!
//! This crate provides the SQLite database handle, the ledger store that
//! records applied migrations in a SQLite table, and a ready-made migration
//! type for plain SQL. Asynchronous access goes through `tokio-rusqlite`.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::Runner;
//! use strata_sqlite::{SqlMigration, SqliteDatabase, SqliteLedgerStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::open_url("sqlite://./app.db").await?;
//!     let mut runner = Runner::new(SqliteLedgerStore::new(db.clone()));
//!
//!     runner.register(
//!         SqlMigration::new("create_users", db.clone(), "CREATE TABLE users (id INTEGER)")
//!             .with_down_sql("DROP TABLE users"),
//!     )?;
//!
//!     for key in runner.migrate_all().await? {
//!         println!("applied {key}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod migration;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use database::{DRIVER_NAME, SqliteDatabase};
pub use error::{SqliteError, SqliteResult};
pub use ledger::SqliteLedgerStore;
pub use migration::SqlMigration;
