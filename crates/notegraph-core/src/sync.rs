//! Graph synchronization: turn one source's extraction result into an atomic
//! replacement of its contribution to the graph.
//!
//! The decision is hash based. The content hash of the exact prompt sent for
//! extraction is compared with the [`SourceVersion`](crate::store) recorded
//! by the last successful sync; equal hashes mean the graph already reflects
//! the document and nothing is written.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::labels::{predicate_type, relation_type};
use crate::models::ExtractionResult;
use crate::store::{
    EvidenceGroup, EvidenceRow, GraphStore, RelationGroup, RelationRow, SyncPlan, WriteStats,
};

/// What [`sync_source`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The stored version already matches; no graph writes were made.
    Unchanged { hash: String },
    /// The source's contribution was replaced.
    Written {
        previous: Option<String>,
        hash: String,
        stats: WriteStats,
    },
}

impl SyncOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SyncOutcome::Written { .. })
    }
}

/// Group an extraction result into bulk-write batches.
///
/// Relations are grouped by sanitized label and evidence by sanitized
/// predicate. Groups are ordered by label so identical input always yields
/// an identical plan.
pub fn build_plan(source_id: &str, content_hash: &str, result: &ExtractionResult) -> SyncPlan {
    let mut relations: BTreeMap<String, Vec<RelationRow>> = BTreeMap::new();
    for t in &result.triplets {
        relations
            .entry(relation_type(&t.relation))
            .or_default()
            .push(RelationRow {
                head: t.head.clone(),
                tail: t.tail.clone(),
            });
    }

    let mut evidence: BTreeMap<String, Vec<EvidenceRow>> = BTreeMap::new();
    for c in &result.chunks {
        evidence
            .entry(predicate_type(&c.predicate))
            .or_default()
            .push(EvidenceRow {
                subject: c.subject.clone(),
                content: c.content.clone(),
                embedding: c.embedding.clone(),
            });
    }

    SyncPlan {
        source_id: source_id.to_string(),
        content_hash: content_hash.to_string(),
        relations: relations
            .into_iter()
            .map(|(label, rows)| RelationGroup { label, rows })
            .collect(),
        evidence: evidence
            .into_iter()
            .map(|(predicate, rows)| EvidenceGroup { predicate, rows })
            .collect(),
    }
}

/// Bring the graph in line with `result` for `source_id`.
///
/// With `force` the hash comparison is skipped and the contribution is
/// rewritten regardless. A failed write is returned as an error and leaves
/// the previous version (and data) in place.
pub async fn sync_source<S: GraphStore + ?Sized>(
    store: &S,
    source_id: &str,
    content_hash: &str,
    result: &ExtractionResult,
    force: bool,
) -> Result<SyncOutcome> {
    let previous = store.source_version(source_id).await?;

    if !force && previous.as_deref() == Some(content_hash) {
        tracing::info!(source = %source_id, "content unchanged, skipping graph update");
        return Ok(SyncOutcome::Unchanged {
            hash: content_hash.to_string(),
        });
    }

    let plan = build_plan(source_id, content_hash, result);
    tracing::info!(
        source = %source_id,
        relations = plan.relation_count(),
        evidence = plan.evidence_count(),
        replacing = previous.is_some(),
        "writing source to graph"
    );

    let stats = store.apply_sync(&plan).await?;

    Ok(SyncOutcome::Written {
        previous,
        hash: content_hash.to_string(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceChunk, Triplet};
    use crate::store::memory::InMemoryGraphStore;

    fn triplet(head: &str, relation: &str, tail: &str) -> Triplet {
        Triplet {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
        }
    }

    fn chunk(content: &str, subject: &str, predicate: &str) -> EvidenceChunk {
        EvidenceChunk {
            content: content.into(),
            subject: subject.into(),
            predicate: predicate.into(),
            embedding: Some(vec![1.0, 0.0]),
        }
    }

    fn sample() -> ExtractionResult {
        ExtractionResult {
            triplets: vec![
                triplet("Rust", "is a", "Language"),
                triplet("Cargo", "part of", "Rust"),
                triplet("Tokio", "", "Rust"),
            ],
            chunks: vec![
                chunk("Rust is a systems language.", "Rust", "describes"),
                chunk("Cargo builds crates.", "Cargo", ""),
            ],
        }
    }

    #[test]
    fn test_build_plan_groups_by_sanitized_label() {
        let plan = build_plan("note_a", "h", &sample());
        let labels: Vec<&str> = plan.relations.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["IS_A", "PART_OF", "RELATED_TO"]);

        let predicates: Vec<&str> = plan.evidence.iter().map(|g| g.predicate.as_str()).collect();
        assert_eq!(predicates, vec!["DESCRIBES", "HAS_MENTION"]);
        assert_eq!(plan.relation_count(), 3);
        assert_eq!(plan.evidence_count(), 2);
    }

    #[test]
    fn test_colliding_labels_share_one_group() {
        let result = ExtractionResult {
            triplets: vec![
                triplet("Rust", "is a", "Language"),
                triplet("Go", "IS_A", "Language"),
            ],
            chunks: vec![],
        };
        let plan = build_plan("note_a", "h", &result);
        assert_eq!(plan.relations.len(), 1);
        assert_eq!(plan.relations[0].label, "IS_A");
        assert_eq!(plan.relations[0].rows.len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_hash_makes_no_writes() {
        let store = InMemoryGraphStore::new();
        let first = sync_source(&store, "note_a", "h1", &sample(), false)
            .await
            .unwrap();
        assert!(first.is_written());
        assert_eq!(store.write_count(), 1);

        let second = sync_source(&store, "note_a", "h1", &sample(), false)
            .await
            .unwrap();
        assert_eq!(
            second,
            SyncOutcome::Unchanged {
                hash: "h1".to_string()
            }
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_force_rewrites_unchanged_source() {
        let store = InMemoryGraphStore::new();
        sync_source(&store, "note_a", "h1", &sample(), false)
            .await
            .unwrap();
        let outcome = sync_source(&store, "note_a", "h1", &sample(), true)
            .await
            .unwrap();
        match outcome {
            SyncOutcome::Written {
                previous, stats, ..
            } => {
                assert_eq!(previous.as_deref(), Some("h1"));
                assert_eq!(stats.pruned_evidence, 2);
                assert_eq!(stats.evidence_written, 2);
            }
            other => panic!("expected a write, got {:?}", other),
        }
        assert_eq!(store.evidence_for("note_a").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_version() {
        let store = InMemoryGraphStore::with_dims(2);
        sync_source(&store, "note_a", "h1", &sample(), false)
            .await
            .unwrap();

        let mut broken = sample();
        broken.chunks[0].embedding = Some(vec![1.0, 2.0, 3.0]);
        assert!(sync_source(&store, "note_a", "h2", &broken, false)
            .await
            .is_err());

        assert_eq!(
            store.source_version("note_a").await.unwrap().as_deref(),
            Some("h1")
        );
        assert_eq!(store.evidence_for("note_a").len(), 2);
    }
}
