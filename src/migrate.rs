use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `graph_meta` key holding the fixed dimensionality of the similarity index.
pub const META_EMBEDDING_DIMS: &str = "embedding_dims";

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let dims = if config.embedding.is_enabled() {
        config.embedding.dims
    } else {
        None
    };
    migrate_pool(&pool, dims).await?;
    pool.close().await;
    Ok(())
}

/// Create the graph schema if missing and pin the index dimensionality.
///
/// Once recorded, the dimensionality can only change after a `reset`.
pub async fn migrate_pool(pool: &SqlitePool, dims: Option<usize>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concepts (
            name TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (head, label, tail, source): identical edges contributed
    // by different sources are kept apart so each can be pruned alone.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relations (
            head TEXT NOT NULL REFERENCES concepts(name),
            label TEXT NOT NULL,
            tail TEXT NOT NULL REFERENCES concepts(name),
            source TEXT NOT NULL,
            PRIMARY KEY (head, label, tail, source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB,
            dims INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence_links (
            evidence_id TEXT PRIMARY KEY REFERENCES evidence(id) ON DELETE CASCADE,
            concept TEXT NOT NULL REFERENCES concepts(name),
            predicate TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_versions (
            source_id TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            synced_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evidence_source ON evidence(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_evidence_links_concept ON evidence_links(concept)")
        .execute(pool)
        .await?;

    if let Some(dims) = dims {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT value FROM graph_meta WHERE key = ?")
                .bind(META_EMBEDDING_DIMS)
                .fetch_optional(pool)
                .await?;

        match existing {
            None => {
                sqlx::query("INSERT INTO graph_meta (key, value) VALUES (?, ?)")
                    .bind(META_EMBEDDING_DIMS)
                    .bind(dims.to_string())
                    .execute(pool)
                    .await?;
            }
            Some(v) if v == dims.to_string() => {}
            Some(v) => bail!(
                "similarity index is fixed at {} dimensions but embedding.dims is {}; \
                 run `ngr reset --yes` to rebuild the graph",
                v,
                dims
            ),
        }
    }

    Ok(())
}
