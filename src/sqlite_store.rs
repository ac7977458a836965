//! SQLite-backed [`GraphStore`] implementation.
//!
//! Concepts, relation edges, evidence nodes and their predicate links are
//! plain tables (see [`crate::migrate`]). A sync runs as one transaction:
//! prune, write and version commit either all land or none do. Vector search
//! is brute-force cosine similarity over the stored BLOBs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use notegraph_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use notegraph_core::error::{Error, Result};
use notegraph_core::store::{
    EvidenceCandidate, GraphStats, GraphStore, SourceSummary, SyncPlan, WriteStats,
};

use crate::migrate::META_EMBEDDING_DIMS;

/// SQLite implementation of the [`GraphStore`] trait.
pub struct SqliteGraphStore {
    pool: SqlitePool,
    /// Fixed dimensionality of the similarity index, when pinned.
    dims: Option<usize>,
}

/// One evidence node as shown by diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceSample {
    pub source: String,
    pub concept: Option<String>,
    pub predicate: Option<String>,
    pub content: String,
    pub dims: Option<i64>,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool, dims: Option<usize>) -> Self {
        Self { pool, dims }
    }

    /// Wrap `pool`, reading the index dimensionality pinned by migration.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        let dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM graph_meta WHERE key = ?")
                .bind(META_EMBEDDING_DIMS)
                .fetch_optional(&pool)
                .await
                .map_err(Error::store)?;

        let dims = match dims {
            Some(v) => Some(v.parse::<usize>().map_err(|e| {
                Error::store(format!("invalid {} value '{}': {}", META_EMBEDDING_DIMS, v, e))
            })?),
            None => None,
        };

        Ok(Self::new(pool, dims))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    /// The first `limit` evidence nodes with their owning Concept.
    pub async fn sample_evidence(&self, limit: i64) -> Result<Vec<EvidenceSample>> {
        let rows = sqlx::query(
            r#"
            SELECT e.source, e.content, e.dims, l.concept, l.predicate
            FROM evidence e
            LEFT JOIN evidence_links l ON l.evidence_id = e.id
            ORDER BY e.rowid
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;

        Ok(rows
            .iter()
            .map(|row| EvidenceSample {
                source: row.get("source"),
                concept: row.get("concept"),
                predicate: row.get("predicate"),
                content: row.get("content"),
                dims: row.get("dims"),
            })
            .collect())
    }

    /// Edge counts per relation type.
    pub async fn relation_labels(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT label, COUNT(*) AS n FROM relations GROUP BY label ORDER BY n DESC, label",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;

        Ok(rows
            .iter()
            .map(|row| (row.get("label"), row.get("n")))
            .collect())
    }
}

async fn merge_concept(tx: &mut sqlx::SqliteConnection, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO concepts (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .execute(tx)
        .await
        .map_err(Error::store)?;
    Ok(())
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<u64> {
    let n: i64 = sqlx::query_scalar(sql)
        .fetch_one(pool)
        .await
        .map_err(Error::store)?;
    Ok(n as u64)
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn source_version(&self, source_id: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT hash FROM source_versions WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store)
    }

    async fn apply_sync(&self, plan: &SyncPlan) -> Result<WriteStats> {
        let source = plan.source_id.as_str();
        let mut stats = WriteStats::default();
        let mut tx = self.pool.begin().await.map_err(Error::store)?;

        sqlx::query(
            "DELETE FROM evidence_links WHERE evidence_id IN (SELECT id FROM evidence WHERE source = ?)",
        )
        .bind(source)
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;

        stats.pruned_evidence = sqlx::query("DELETE FROM evidence WHERE source = ?")
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?
            .rows_affected();

        stats.pruned_relations = sqlx::query("DELETE FROM relations WHERE source = ?")
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(Error::store)?
            .rows_affected();

        for group in &plan.relations {
            tracing::debug!(label = %group.label, rows = group.rows.len(), "writing relations");
            for row in &group.rows {
                merge_concept(&mut tx, &row.head).await?;
                merge_concept(&mut tx, &row.tail).await?;
                stats.relations_written += sqlx::query(
                    r#"
                    INSERT INTO relations (head, label, tail, source)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(head, label, tail, source) DO NOTHING
                    "#,
                )
                .bind(&row.head)
                .bind(&group.label)
                .bind(&row.tail)
                .bind(source)
                .execute(&mut *tx)
                .await
                .map_err(Error::store)?
                .rows_affected();
            }
        }

        for group in &plan.evidence {
            tracing::debug!(predicate = %group.predicate, rows = group.rows.len(), "writing evidence");
            for row in &group.rows {
                if let (Some(dims), Some(v)) = (self.dims, &row.embedding) {
                    if v.len() != dims {
                        // Dropping `tx` rolls back the prune above.
                        return Err(Error::store(format!(
                            "embedding has {} dimensions, index expects {}",
                            v.len(),
                            dims
                        )));
                    }
                }

                merge_concept(&mut tx, &row.subject).await?;
                let id = uuid::Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO evidence (id, source, content, embedding, dims) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(source)
                .bind(&row.content)
                .bind(row.embedding.as_deref().map(vec_to_blob))
                .bind(row.embedding.as_ref().map(|v| v.len() as i64))
                .execute(&mut *tx)
                .await
                .map_err(Error::store)?;

                sqlx::query(
                    "INSERT INTO evidence_links (evidence_id, concept, predicate) VALUES (?, ?, ?)",
                )
                .bind(&id)
                .bind(&row.subject)
                .bind(&group.predicate)
                .execute(&mut *tx)
                .await
                .map_err(Error::store)?;

                stats.evidence_written += 1;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO source_versions (source_id, hash, synced_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                hash = excluded.hash,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(source)
        .bind(&plan.content_hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(Error::store)?;

        tx.commit().await.map_err(Error::store)?;
        Ok(stats)
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<EvidenceCandidate>> {
        if let Some(dims) = self.dims {
            if query_vec.len() != dims {
                return Err(Error::IndexUnavailable(format!(
                    "query has {} dimensions, index expects {}",
                    query_vec.len(),
                    dims
                )));
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT id, source, content, embedding
            FROM evidence
            WHERE embedding IS NOT NULL AND dims = ?
            "#,
        )
        .bind(query_vec.len() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

        let mut candidates: Vec<EvidenceCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                EvidenceCandidate {
                    evidence_id: row.get("id"),
                    content: row.get("content"),
                    source: row.get("source"),
                    score: cosine_similarity(query_vec, &vec) as f64,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);

        Ok(candidates)
    }

    async fn owning_concepts(
        &self,
        evidence_ids: &[String],
        predicates: &[String],
    ) -> Result<HashMap<String, String>> {
        if evidence_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; evidence_ids.len()].join(", ");
        let sql = format!(
            "SELECT evidence_id, concept, predicate FROM evidence_links WHERE evidence_id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in evidence_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(Error::store)?;

        Ok(rows
            .iter()
            .filter(|row| {
                let predicate: String = row.get("predicate");
                predicates.is_empty() || predicates.contains(&predicate)
            })
            .map(|row| (row.get("evidence_id"), row.get("concept")))
            .collect())
    }

    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            concepts: count(&self.pool, "SELECT COUNT(*) FROM concepts").await?,
            relations: count(&self.pool, "SELECT COUNT(*) FROM relations").await?,
            evidence: count(&self.pool, "SELECT COUNT(*) FROM evidence").await?,
            evidence_embedded: count(
                &self.pool,
                "SELECT COUNT(*) FROM evidence WHERE embedding IS NOT NULL",
            )
            .await?,
            sources: count(&self.pool, "SELECT COUNT(*) FROM source_versions").await?,
        })
    }

    async fn source_summaries(&self) -> Result<Vec<SourceSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.source_id, v.hash, v.synced_at,
                   (SELECT COUNT(*) FROM relations r WHERE r.source = s.source_id) AS relations,
                   (SELECT COUNT(*) FROM evidence e WHERE e.source = s.source_id) AS evidence,
                   (SELECT COUNT(*) FROM evidence e
                     WHERE e.source = s.source_id AND e.embedding IS NOT NULL) AS embedded
            FROM (
                SELECT source_id FROM source_versions
                UNION SELECT source FROM evidence
                UNION SELECT source FROM relations
            ) s
            LEFT JOIN source_versions v ON v.source_id = s.source_id
            ORDER BY s.source_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store)?;

        Ok(rows
            .iter()
            .map(|row| SourceSummary {
                source_id: row.get("source_id"),
                hash: row.get("hash"),
                synced_at: row.get("synced_at"),
                relations: row.get::<i64, _>("relations") as u64,
                evidence: row.get::<i64, _>("evidence") as u64,
                evidence_embedded: row.get::<i64, _>("embedded") as u64,
            })
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::store)?;
        for table in [
            "evidence_links",
            "evidence",
            "relations",
            "concepts",
            "source_versions",
            "graph_meta",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(Error::store)?;
        }
        tx.commit().await.map_err(Error::store)?;
        Ok(())
    }
}
