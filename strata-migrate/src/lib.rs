//! # strata-migrate
//!
//! Migration runner for Strata.
//!
//! This crate provides:
//! - The [`Migration`] contract: a keyed pair of `up`/`down` actions
//! - The [`LedgerStore`] contract for persisting which migrations ran
//! - The [`Runner`], which decides what to apply or revert and keeps the
//!   ledger in step
//! - An in-memory ledger store for tests and throwaway databases
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │  Migrations  │────▶│     Runner     │────▶│ Ledger Store │
//! │ (registered) │     │ migrate/reset  │     │ (table rows) │
//! └──────────────┘     └────────────────┘     └──────────────┘
//!                              │
//!                              ▼
//!                      ┌────────────────┐
//!                      │  up() / down() │
//!                      └────────────────┘
//! ```
//!
//! `migrate` walks migrations in registration order and applies those whose
//! ledger record is missing or not executed. `rollback` and `reset` walk the
//! ledger from the most recently created record backwards and revert only
//! migrations that are still registered.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_migrate::{MemoryLedgerStore, Runner};
//!
//! async fn run() -> strata_migrate::MigrateResult<()> {
//!     let mut runner = Runner::new(MemoryLedgerStore::new());
//!     runner.register(CreateUsers::new(db.clone()))?;
//!     runner.register(AddPosts::new(db.clone()))?;
//!
//!     for key in runner.migrate_all().await? {
//!         println!("applied {key}");
//!     }
//!
//!     if let Some(key) = runner.rollback().await? {
//!         println!("reverted {key}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Runs are not safe against concurrent processes sharing one ledger table;
//! serialize them outside the runner.

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod memory;
pub mod migration;
pub mod runner;

// Re-exports
pub use config::{DatabaseConfig, DebugConfig, Driver, LedgerConfig, MigrateConfig};
pub use error::{MigrateResult, MigrationError};
pub use ledger::{DEFAULT_TABLE_NAME, LedgerRecord, LedgerStore};
pub use memory::MemoryLedgerStore;
pub use migration::{DatabaseHandle, Migration};
pub use runner::{Migrate, MigrationStatus, Reset, Runner};

pub use async_trait::async_trait;
