//! The migration contract.

use std::any::Any;

use async_trait::async_trait;

use crate::error::MigrateResult;

/// A unit of schema change with a forward and a backward action.
///
/// Implementations usually hold a clone of the database handle they operate
/// on. Both actions should be safe to run again once the runner has recorded
/// the opposite action, since the ledger is the only thing guarding against
/// re-application.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use strata_migrate::{MigrateResult, Migration};
///
/// struct CreateUsers {
///     db: SqliteDatabase,
/// }
///
/// #[async_trait]
/// impl Migration for CreateUsers {
///     async fn up(&self) -> MigrateResult<()> {
///         self.db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)").await?;
///         Ok(())
///     }
///
///     async fn down(&self) -> MigrateResult<()> {
///         self.db.execute_batch("DROP TABLE users").await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Migration: Send + Sync {
    /// Stable key correlating this migration with its ledger record.
    ///
    /// Defaults to the fully-qualified type name. The ledger matches on this
    /// string alone, so renaming or moving the type orphans its record;
    /// override it when the key must survive refactors or toolchain upgrades.
    fn key(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Apply the migration.
    async fn up(&self) -> MigrateResult<()>;

    /// Revert the migration.
    async fn down(&self) -> MigrateResult<()>;
}

/// A database handle that can report which driver it speaks.
pub trait DatabaseHandle: Send + Sync + 'static {
    /// Driver or client identity, e.g. `"sqlite"`.
    fn driver_name(&self) -> &str;

    /// Access to the concrete handle type.
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CreateWidgets;

    #[async_trait]
    impl Migration for CreateWidgets {
        async fn up(&self) -> MigrateResult<()> {
            Ok(())
        }

        async fn down(&self) -> MigrateResult<()> {
            Ok(())
        }
    }

    struct Renamed;

    #[async_trait]
    impl Migration for Renamed {
        fn key(&self) -> &str {
            "2024_01_01_renamed"
        }

        async fn up(&self) -> MigrateResult<()> {
            Ok(())
        }

        async fn down(&self) -> MigrateResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_key_is_type_name() {
        let key = CreateWidgets.key();
        assert!(key.ends_with("CreateWidgets"));
        assert!(key.contains("::"));
        assert_eq!(key, CreateWidgets.key());
    }

    #[test]
    fn test_key_override() {
        assert_eq!(Renamed.key(), "2024_01_01_renamed");
    }

    #[test]
    fn test_key_through_trait_object() {
        let boxed: Box<dyn Migration> = Box::new(CreateWidgets);
        assert_eq!(boxed.key(), CreateWidgets.key());
    }
}
