//! In-memory [`GraphStore`] implementation for tests.
//!
//! All state sits behind one `std::sync::RwLock`, so a sync is applied under
//! a single write lock and readers never observe a half-written source.
//! Vector search is brute-force cosine similarity over all stored vectors.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};

use super::{
    EvidenceCandidate, GraphStats, GraphStore, SourceSummary, SyncPlan, WriteStats,
};

struct StoredEvidence {
    id: String,
    source: String,
    content: String,
    embedding: Option<Vec<f32>>,
}

struct StoredLink {
    concept: String,
    predicate: String,
    evidence_id: String,
}

struct StoredVersion {
    hash: String,
    synced_at: i64,
}

#[derive(Default)]
struct Graph {
    concepts: BTreeSet<String>,
    /// `(head, label, tail, source)`
    relations: BTreeSet<(String, String, String, String)>,
    evidence: Vec<StoredEvidence>,
    links: Vec<StoredLink>,
    versions: HashMap<String, StoredVersion>,
}

/// In-memory graph store.
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
    dims: Option<usize>,
    writes: AtomicU64,
}

impl InMemoryGraphStore {
    /// A store whose similarity index accepts vectors of any length.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(Graph::default()),
            dims: None,
            writes: AtomicU64::new(0),
        }
    }

    /// A store whose similarity index is fixed to `dims` dimensions.
    ///
    /// Writing an evidence vector of another length fails the whole sync.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: Some(dims),
            ..Self::new()
        }
    }

    /// Number of mutating operations applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Sorted `(head, label, tail, source)` tuples of every relation edge.
    pub fn relations(&self) -> Vec<(String, String, String, String)> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        graph.relations.iter().cloned().collect()
    }

    /// Sorted Concept names.
    pub fn concepts(&self) -> Vec<String> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        graph.concepts.iter().cloned().collect()
    }

    /// Sorted contents of the evidence nodes tagged with `source_id`.
    pub fn evidence_for(&self, source_id: &str) -> Vec<String> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        let mut contents: Vec<String> = graph
            .evidence
            .iter()
            .filter(|e| e.source == source_id)
            .map(|e| e.content.clone())
            .collect();
        contents.sort();
        contents
    }

    fn check_dims(&self, plan: &SyncPlan) -> Result<()> {
        let Some(dims) = self.dims else {
            return Ok(());
        };
        for group in &plan.evidence {
            for row in &group.rows {
                if let Some(v) = &row.embedding {
                    if v.len() != dims {
                        return Err(Error::store(format!(
                            "embedding has {} dimensions, index expects {}",
                            v.len(),
                            dims
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn source_version(&self, source_id: &str) -> Result<Option<String>> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        Ok(graph.versions.get(source_id).map(|v| v.hash.clone()))
    }

    async fn apply_sync(&self, plan: &SyncPlan) -> Result<WriteStats> {
        // Validate before taking the lock so a rejected plan changes nothing.
        self.check_dims(plan)?;

        let mut graph = self.graph.write().unwrap_or_else(|e| e.into_inner());
        let mut stats = WriteStats::default();
        let source = plan.source_id.as_str();

        let before = graph.relations.len();
        graph.relations.retain(|(_, _, _, s)| s != source);
        stats.pruned_relations = (before - graph.relations.len()) as u64;

        let pruned_ids: BTreeSet<String> = graph
            .evidence
            .iter()
            .filter(|e| e.source == source)
            .map(|e| e.id.clone())
            .collect();
        graph.evidence.retain(|e| e.source != source);
        graph.links.retain(|l| !pruned_ids.contains(&l.evidence_id));
        stats.pruned_evidence = pruned_ids.len() as u64;

        for group in &plan.relations {
            for row in &group.rows {
                graph.concepts.insert(row.head.clone());
                graph.concepts.insert(row.tail.clone());
                let inserted = graph.relations.insert((
                    row.head.clone(),
                    group.label.clone(),
                    row.tail.clone(),
                    source.to_string(),
                ));
                if inserted {
                    stats.relations_written += 1;
                }
            }
        }

        for group in &plan.evidence {
            for row in &group.rows {
                graph.concepts.insert(row.subject.clone());
                let id = uuid::Uuid::new_v4().to_string();
                graph.evidence.push(StoredEvidence {
                    id: id.clone(),
                    source: source.to_string(),
                    content: row.content.clone(),
                    embedding: row.embedding.clone(),
                });
                graph.links.push(StoredLink {
                    concept: row.subject.clone(),
                    predicate: group.predicate.clone(),
                    evidence_id: id,
                });
                stats.evidence_written += 1;
            }
        }

        graph.versions.insert(
            plan.source_id.clone(),
            StoredVersion {
                hash: plan.content_hash.clone(),
                synced_at: chrono::Utc::now().timestamp(),
            },
        );

        self.writes.fetch_add(1, Ordering::SeqCst);
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

        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<EvidenceCandidate> = graph
            .evidence
            .iter()
            .filter_map(|e| {
                let v = e.embedding.as_ref()?;
                if v.len() != query_vec.len() {
                    return None;
                }
                Some(EvidenceCandidate {
                    evidence_id: e.id.clone(),
                    content: e.content.clone(),
                    source: e.source.clone(),
                    score: cosine_similarity(query_vec, v) as f64,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn owning_concepts(
        &self,
        evidence_ids: &[String],
        predicates: &[String],
    ) -> Result<HashMap<String, String>> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        let mut owners = HashMap::new();
        for link in &graph.links {
            if !evidence_ids.contains(&link.evidence_id) {
                continue;
            }
            if !predicates.is_empty() && !predicates.contains(&link.predicate) {
                continue;
            }
            owners
                .entry(link.evidence_id.clone())
                .or_insert_with(|| link.concept.clone());
        }
        Ok(owners)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());
        Ok(GraphStats {
            concepts: graph.concepts.len() as u64,
            relations: graph.relations.len() as u64,
            evidence: graph.evidence.len() as u64,
            evidence_embedded: graph
                .evidence
                .iter()
                .filter(|e| e.embedding.is_some())
                .count() as u64,
            sources: graph.versions.len() as u64,
        })
    }

    async fn source_summaries(&self) -> Result<Vec<SourceSummary>> {
        let graph = self.graph.read().unwrap_or_else(|e| e.into_inner());

        let mut ids: BTreeSet<String> = graph.versions.keys().cloned().collect();
        ids.extend(graph.evidence.iter().map(|e| e.source.clone()));
        ids.extend(graph.relations.iter().map(|(_, _, _, s)| s.clone()));

        Ok(ids
            .into_iter()
            .map(|id| {
                let version = graph.versions.get(&id);
                let evidence: Vec<&StoredEvidence> =
                    graph.evidence.iter().filter(|e| e.source == id).collect();
                SourceSummary {
                    hash: version.map(|v| v.hash.clone()),
                    synced_at: version.map(|v| v.synced_at),
                    relations: graph
                        .relations
                        .iter()
                        .filter(|(_, _, _, s)| *s == id)
                        .count() as u64,
                    evidence: evidence.len() as u64,
                    evidence_embedded: evidence.iter().filter(|e| e.embedding.is_some()).count()
                        as u64,
                    source_id: id,
                }
            })
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut graph = self.graph.write().unwrap_or_else(|e| e.into_inner());
        *graph = Graph::default();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
