//! Hybrid retrieval: vector similarity over evidence passages, expanded one
//! hop through the graph to the Concept each passage describes.
//!
//! The algorithm runs entirely through the [`GraphStore`] trait. The caller
//! embeds the question and passes the vector in.
//!
//! # Algorithm
//!
//! 1. Fetch the `top_k` most similar evidence nodes (cosine similarity).
//! 2. Sort by score (desc), evidence id (asc) and truncate to `top_k`.
//! 3. Resolve the owning Concept of each hit through its predicate edge,
//!    optionally restricted to `owner_predicates`.
//!
//! An unavailable index yields an empty result, never an error.

use crate::error::{Error, Result};
use crate::labels::sanitize;
use crate::models::RetrievedEvidence;
use crate::store::GraphStore;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Maximum number of evidence passages returned.
    pub top_k: usize,
    /// Predicate types followed from evidence to its Concept. Empty means
    /// any predicate.
    pub owner_predicates: Vec<String>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            owner_predicates: Vec::new(),
        }
    }
}

/// Retrieve the evidence most relevant to `query_vec`.
pub async fn search<S: GraphStore + ?Sized>(
    store: &S,
    query_vec: &[f32],
    params: &RetrievalParams,
) -> Result<Vec<RetrievedEvidence>> {
    if params.top_k == 0 || query_vec.is_empty() {
        return Ok(Vec::new());
    }

    let mut candidates = match store.vector_search(query_vec, params.top_k).await {
        Ok(c) => c,
        Err(Error::IndexUnavailable(reason)) => {
            tracing::warn!(%reason, "similarity index unavailable, returning no evidence");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.evidence_id.cmp(&b.evidence_id))
    });
    candidates.truncate(params.top_k);

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let predicates: Vec<String> = params
        .owner_predicates
        .iter()
        .filter_map(|p| sanitize(p))
        .collect();
    let ids: Vec<String> = candidates.iter().map(|c| c.evidence_id.clone()).collect();
    let owners = store.owning_concepts(&ids, &predicates).await?;

    Ok(candidates
        .into_iter()
        .map(|c| RetrievedEvidence {
            entity: owners.get(&c.evidence_id).cloned(),
            content: c.content,
            score: c.score,
            source: c.source,
        })
        .collect())
}

/// Render retrieved evidence as the context block of an answer prompt.
///
/// ```rust
/// use notegraph_core::models::RetrievedEvidence;
/// use notegraph_core::search::format_context;
///
/// let ctx = format_context(&[RetrievedEvidence {
///     content: "Cargo builds crates.".into(),
///     entity: Some("Cargo".into()),
///     score: 0.91234,
///     source: "note_cargo".into(),
/// }]);
/// assert_eq!(
///     ctx,
///     "[Evidence 1] (score: 0.912, entity: Cargo)\nContent: Cargo builds crates."
/// );
/// ```
pub fn format_context(evidence: &[RetrievedEvidence]) -> String {
    evidence
        .iter()
        .enumerate()
        .map(|(i, e)| {
            format!(
                "[Evidence {}] (score: {:.3}, entity: {})\nContent: {}",
                i + 1,
                e.score,
                e.entity.as_deref().unwrap_or("unknown"),
                e.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryGraphStore;
    use crate::store::{EvidenceGroup, EvidenceRow, SyncPlan};

    fn row(subject: &str, content: &str, v: Vec<f32>) -> EvidenceRow {
        EvidenceRow {
            subject: subject.into(),
            content: content.into(),
            embedding: Some(v),
        }
    }

    async fn seeded() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        store
            .apply_sync(&SyncPlan {
                source_id: "note_rust".into(),
                content_hash: "h".into(),
                relations: vec![],
                evidence: vec![
                    EvidenceGroup {
                        predicate: "DESCRIBES".into(),
                        rows: vec![
                            row("Rust", "Rust is a systems language.", vec![1.0, 0.0]),
                            row("Cargo", "Cargo builds crates.", vec![0.7, 0.7]),
                        ],
                    },
                    EvidenceGroup {
                        predicate: "HAS_MENTION".into(),
                        rows: vec![row("Tokio", "Tokio runs futures.", vec![0.0, 1.0])],
                    },
                ],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_results_ranked_and_limited() {
        let store = seeded().await;
        let params = RetrievalParams {
            top_k: 2,
            owner_predicates: vec![],
        };
        let hits = search(&store, &[1.0, 0.1], &params).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].entity.as_deref(), Some("Rust"));
        assert_eq!(hits[1].entity.as_deref(), Some("Cargo"));
        assert_eq!(hits[0].source, "note_rust");
    }

    #[tokio::test]
    async fn test_owner_predicate_filter_leaves_entity_empty() {
        let store = seeded().await;
        let params = RetrievalParams {
            top_k: 3,
            owner_predicates: vec!["describes".into()],
        };
        let hits = search(&store, &[0.0, 1.0], &params).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "Tokio runs futures.");
        assert_eq!(hits[0].entity, None);
        assert!(hits[1..].iter().all(|h| h.entity.is_some()));
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = InMemoryGraphStore::new();
        let hits = search(&store, &[1.0, 0.0], &RetrievalParams::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_index_returns_nothing() {
        let store = InMemoryGraphStore::with_dims(4);
        let hits = search(&store, &[1.0, 0.0], &RetrievalParams::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_format_context_blocks() {
        let evidence = vec![
            RetrievedEvidence {
                content: "A".into(),
                entity: Some("X".into()),
                score: 0.5,
                source: "note_a".into(),
            },
            RetrievedEvidence {
                content: "B".into(),
                entity: None,
                score: 0.25,
                source: "note_b".into(),
            },
        ];
        assert_eq!(
            format_context(&evidence),
            "[Evidence 1] (score: 0.500, entity: X)\nContent: A\n\n\
             [Evidence 2] (score: 0.250, entity: unknown)\nContent: B"
        );
    }
}
