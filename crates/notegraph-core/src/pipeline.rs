//! Ingestion pipeline: document → cache → extraction → embedding → sync.
//!
//! Documents are processed strictly one after another. A failure in one
//! document (service error, unparseable extraction output, failed graph
//! write) is logged and counted; the batch continues with the next document.

use serde::Serialize;

use crate::cache::{BlobStore, ContentCache};
use crate::embedding::{fill_missing, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::extract::{extract_prompt, render_prompt};
use crate::generation::{preview, TextGenerator};
use crate::models::{content_hash, SourceDocument};
use crate::store::GraphStore;
use crate::sync::{sync_source, SyncOutcome};

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Rewrite every source even when its version is current.
    pub force: bool,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            force: false,
            embed_batch_size: 16,
        }
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub source_id: String,
    pub name: String,
    /// Extraction result served from the cache.
    pub cached: bool,
    pub triplets: usize,
    pub chunks: usize,
    /// Chunks written without an embedding.
    pub embedding_gaps: usize,
    pub outcome: SyncOutcome,
}

/// A document that could not be ingested.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub source_id: String,
    pub name: String,
    pub error: String,
}

/// Totals of one [`Ingestor::ingest_all`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.outcome.is_written())
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.documents.len() - self.written()
    }

    pub fn cache_hits(&self) -> usize {
        self.documents.iter().filter(|d| d.cached).count()
    }

    pub fn embedding_gaps(&self) -> usize {
        self.documents.iter().map(|d| d.embedding_gaps).sum()
    }
}

/// Drives ingestion over borrowed collaborators.
pub struct Ingestor<'a, G: ?Sized, E: ?Sized, S: ?Sized, B> {
    generator: &'a G,
    embedder: &'a E,
    store: &'a S,
    cache: &'a ContentCache<B>,
    template: &'a str,
    options: IngestOptions,
}

impl<'a, G, E, S, B> Ingestor<'a, G, E, S, B>
where
    G: TextGenerator + ?Sized,
    E: EmbeddingProvider + ?Sized,
    S: GraphStore + ?Sized,
    B: BlobStore,
{
    /// `template` must already have passed
    /// [`validate_template`](crate::extract::validate_template).
    pub fn new(
        generator: &'a G,
        embedder: &'a E,
        store: &'a S,
        cache: &'a ContentCache<B>,
        template: &'a str,
        options: IngestOptions,
    ) -> Self {
        Self {
            generator,
            embedder,
            store,
            cache,
            template,
            options,
        }
    }

    /// Whether `doc` would be rewritten by a sync, without calling any
    /// external service.
    pub async fn needs_sync(&self, doc: &SourceDocument) -> Result<bool> {
        if self.options.force {
            return Ok(true);
        }
        let hash = content_hash(&render_prompt(self.template, &doc.text));
        let current = self.store.source_version(&doc.source_id).await?;
        Ok(current.as_deref() != Some(hash.as_str()))
    }

    /// Run the full pipeline for one document.
    pub async fn ingest_document(&self, doc: &SourceDocument) -> Result<DocumentReport> {
        let prompt = render_prompt(self.template, &doc.text);
        let batch_size = self.options.embed_batch_size;

        let mut lookup = self
            .cache
            .get_or_create(&doc.source_id, &prompt, || async {
                tracing::debug!(
                    source = %doc.source_id,
                    prompt = %preview(&prompt, 100),
                    "requesting extraction"
                );
                let mut result = extract_prompt(self.generator, &prompt).await?;
                let report = fill_missing(self.embedder, &mut result, batch_size).await;
                if report.gaps() > 0 {
                    tracing::warn!(
                        source = %doc.source_id,
                        gaps = report.gaps(),
                        "some evidence chunks could not be embedded"
                    );
                }
                Ok::<_, Error>(result)
            })
            .await?;

        // Vectors filled into a cached result must reach the graph even though
        // the content hash is unchanged.
        let mut refilled = false;
        if lookup.cached {
            let report = fill_missing(self.embedder, &mut lookup.result, batch_size).await;
            if report.filled > 0 {
                refilled = true;
                tracing::info!(
                    source = %doc.source_id,
                    filled = report.filled,
                    "filled embedding gaps in cached extraction"
                );
                let key = ContentCache::<B>::key_for(&doc.source_id, &prompt);
                self.cache.store(&key, &lookup.result);
            }
        }

        let outcome = sync_source(
            self.store,
            &doc.source_id,
            &lookup.content_hash,
            &lookup.result,
            self.options.force || refilled,
        )
        .await?;

        Ok(DocumentReport {
            source_id: doc.source_id.clone(),
            name: doc.name.clone(),
            cached: lookup.cached,
            triplets: lookup.result.triplets.len(),
            chunks: lookup.result.chunks.len(),
            embedding_gaps: lookup.result.embedding_gaps(),
            outcome,
        })
    }

    /// Ingest `docs` in order, continuing past failed documents.
    ///
    /// `on_progress(done, total)` is called after every document.
    pub async fn ingest_all<F>(&self, docs: &[SourceDocument], mut on_progress: F) -> BatchReport
    where
        F: FnMut(u64, u64),
    {
        let total = docs.len() as u64;
        let mut report = BatchReport::default();

        for (i, doc) in docs.iter().enumerate() {
            match self.ingest_document(doc).await {
                Ok(r) => report.documents.push(r),
                Err(e) => {
                    tracing::warn!(source = %doc.source_id, error = %e, "document skipped");
                    report.failures.push(DocumentFailure {
                        source_id: doc.source_id.clone(),
                        name: doc.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
            on_progress(i as u64 + 1, total);
        }

        report
    }
}
