use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

use crate::error::StoreError;

pub type DbPool = sqlx::SqlitePool;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open (creating if missing) the database at `database_url` and apply
/// pending migrations.
pub async fn connect(database_url: &str) -> Result<DbPool, StoreError> {
    connect_with_settings(database_url, 5, 30).await
}

/// Use a single connection for `sqlite::memory:` URLs; every connection to
/// an in-memory database sees its own empty database.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await?;

    MIGRATOR.run(&pool).await?;
    debug!(database_url, "job store ready");
    Ok(pool)
}
