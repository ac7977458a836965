//! Graph storage abstraction for notegraph.
//!
//! The [`GraphStore`] trait defines every operation the synchronizer and the
//! retrieval engine need, enabling pluggable backends (SQLite in the app
//! crate, [`memory::InMemoryGraphStore`] for tests).
//!
//! # Graph model
//!
//! - **Concept** nodes keyed by a globally unique `name`; only ever merged,
//!   never deleted by a source re-sync.
//! - **Relation** edges `(head)-[label]->(tail)` tagged with the source that
//!   produced them.
//! - **Evidence** nodes holding a passage, its optional embedding and its
//!   source, linked from their owning Concept by a predicate edge.
//! - **Source versions** recording the content hash each source was last
//!   synced with.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// One `(head, tail)` pair of a relation group.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRow {
    pub head: String,
    pub tail: String,
}

/// All relations of one sanitized label, written as one bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationGroup {
    pub label: String,
    pub rows: Vec<RelationRow>,
}

/// One evidence passage of an evidence group.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceRow {
    /// Owning Concept name.
    pub subject: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// All evidence passages of one sanitized predicate, written as one bulk
/// operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceGroup {
    pub predicate: String,
    pub rows: Vec<EvidenceRow>,
}

/// The complete replacement of one source's contribution to the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub source_id: String,
    /// Committed as the source version once the write succeeds.
    pub content_hash: String,
    pub relations: Vec<RelationGroup>,
    pub evidence: Vec<EvidenceGroup>,
}

impl SyncPlan {
    pub fn relation_count(&self) -> usize {
        self.relations.iter().map(|g| g.rows.len()).sum()
    }

    pub fn evidence_count(&self) -> usize {
        self.evidence.iter().map(|g| g.rows.len()).sum()
    }
}

/// Counts reported by [`GraphStore::apply_sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub pruned_evidence: u64,
    pub pruned_relations: u64,
    pub relations_written: u64,
    pub evidence_written: u64,
}

/// An evidence node returned from similarity search.
#[derive(Debug, Clone)]
pub struct EvidenceCandidate {
    pub evidence_id: String,
    pub content: String,
    pub source: String,
    /// Cosine similarity to the query vector.
    pub score: f64,
}

/// Whole-graph counters used by diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub concepts: u64,
    pub relations: u64,
    pub evidence: u64,
    pub evidence_embedded: u64,
    pub sources: u64,
}

/// Per-source breakdown used by diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source_id: String,
    /// Last synced content hash, `None` for data without a version record.
    pub hash: Option<String>,
    /// Unix timestamp of the last successful sync.
    pub synced_at: Option<i64>,
    pub relations: u64,
    pub evidence: u64,
    pub evidence_embedded: u64,
}

/// Abstract graph backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`source_version`](GraphStore::source_version) | Last synced hash of a source |
/// | [`apply_sync`](GraphStore::apply_sync) | Atomic prune + write + version commit |
/// | [`vector_search`](GraphStore::vector_search) | Cosine similarity over evidence embeddings |
/// | [`owning_concepts`](GraphStore::owning_concepts) | One-hop expansion from evidence to Concept |
/// | [`stats`](GraphStore::stats) / [`source_summaries`](GraphStore::source_summaries) | Diagnostics |
/// | [`clear`](GraphStore::clear) | Remove everything |
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Content hash recorded by the last successful sync of `source_id`.
    async fn source_version(&self, source_id: &str) -> Result<Option<String>>;

    /// Replace the contribution of `plan.source_id` as one atomic unit.
    ///
    /// Deletes every evidence node and relation edge tagged with the source
    /// (Concepts are kept), merges Concepts and relation edges group by
    /// group, creates evidence nodes with their predicate edges, and finally
    /// records `plan.content_hash` as the source version. If any step fails
    /// nothing is changed, including the previous version.
    async fn apply_sync(&self, plan: &SyncPlan) -> Result<WriteStats>;

    /// The `limit` evidence nodes most similar to `query_vec`, highest first.
    ///
    /// Nodes without an embedding (or with one of a different
    /// dimensionality) never match.
    async fn vector_search(&self, query_vec: &[f32], limit: usize)
        -> Result<Vec<EvidenceCandidate>>;

    /// Map evidence ids to the name of the Concept linking to them.
    ///
    /// When `predicates` is non-empty only links of those predicate types are
    /// followed. Evidence without a matching link is absent from the map.
    async fn owning_concepts(
        &self,
        evidence_ids: &[String],
        predicates: &[String],
    ) -> Result<HashMap<String, String>>;

    async fn stats(&self) -> Result<GraphStats>;

    async fn source_summaries(&self) -> Result<Vec<SourceSummary>>;

    /// Remove every node, edge and version record.
    async fn clear(&self) -> Result<()>;
}
