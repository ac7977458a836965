use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;
use crate::migrate;
use crate::sqlite_store::SqliteGraphStore;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Open (creating if missing) the graph database at `db_path`.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open graph database: {}", db_path.display()))?;

    Ok(pool)
}

/// Connect, migrate, and wrap the database in a [`SqliteGraphStore`].
///
/// `dims` pins the similarity index dimensionality on first use; pass `None`
/// when embeddings are disabled.
pub async fn open_graph(config: &Config, dims: Option<usize>) -> Result<SqliteGraphStore> {
    let pool = connect(config).await?;
    migrate::migrate_pool(&pool, dims).await?;
    let store = SqliteGraphStore::open(pool).await?;
    Ok(store)
}
