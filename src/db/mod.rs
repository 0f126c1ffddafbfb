//! Database module

pub mod memory;
pub mod queries;
mod store;

pub use memory::MemoryStore;
pub use store::{ImportStore, PgImportStore, RecordRefs, StoreError};

use anyhow::Result;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Create a database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Migrations embedded from `./migrations`. Applied versions the binary does
/// not know belong to other services sharing the database and are left alone.
fn migrator() -> Migrator {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    let migrator = migrator();
    let versions: Vec<i64> = migrator.iter().map(|m| m.version).collect();
    info!("Compiled migration versions: {:?}", versions);

    migrator.run(pool).await?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrator_embeds_only_import_schema() {
        let migrator = migrator();
        assert!(migrator.ignore_missing);
        let versions: Vec<i64> = migrator.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1]);
        assert!(migrator
            .iter()
            .all(|m| !m.migration_type.is_down_migration()));
    }
}
