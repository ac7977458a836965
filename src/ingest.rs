//! Sync orchestration for `ngr sync`.
//!
//! Wires the configured services into a [`notegraph_core::pipeline::Ingestor`]:
//! notes root → content cache → extraction → embedding → graph store.
//! Per-note failures are reported and skipped; only startup failures (bad
//! prompt template, unreachable database) abort the command.

use anyhow::{Context, Result};

use notegraph_core::cache::ContentCache;
use notegraph_core::embedding::EmbeddingProvider;
use notegraph_core::extract::validate_template;
use notegraph_core::generation::TextGenerator;
use notegraph_core::pipeline::{IngestOptions, Ingestor};
use notegraph_core::sync::SyncOutcome;

use crate::cache_fs::FsBlobStore;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::llm::ChatClient;
use crate::notes::scan_notes;
use crate::progress::{ProgressMode, SyncProgressEvent};

pub async fn run_sync(
    config: &Config,
    full: bool,
    dry_run: bool,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let reporter = progress.reporter();

    let template = std::fs::read_to_string(&config.extraction.prompt_file).with_context(|| {
        format!(
            "Failed to read extraction prompt: {}",
            config.extraction.prompt_file.display()
        )
    })?;
    validate_template(&template)?;

    reporter.report(SyncProgressEvent::Discovering {
        root: config.notes.root.display().to_string(),
    });
    let mut docs = scan_notes(&config.notes)?;

    // Apply --limit
    if let Some(lim) = limit {
        docs.truncate(lim);
    }

    let generator = ChatClient::for_extraction(config)?;
    let embedder = create_provider(&config.embedding)?;
    let dims = index_dims(embedder.as_ref());
    let store = db::open_graph(config, dims).await?;
    let cache = ContentCache::new(FsBlobStore::new(&config.cache.dir)?);

    let options = IngestOptions {
        force: full,
        embed_batch_size: config.embedding.batch_size,
    };
    let ingestor = Ingestor::new(
        &generator,
        embedder.as_ref(),
        &store,
        &cache,
        &template,
        options,
    );

    if dry_run {
        let mut pending = 0usize;
        for doc in &docs {
            if ingestor.needs_sync(doc).await? {
                pending += 1;
            }
        }
        println!("sync notes (dry-run)");
        println!("  notes found: {}", docs.len());
        println!("  would sync: {}", pending);
        println!("  up to date: {}", docs.len() - pending);
        store.pool().close().await;
        return Ok(());
    }

    tracing::info!(
        notes = docs.len(),
        model = generator.model_name(),
        embedder = embedder.model_name(),
        "starting sync"
    );

    let report = ingestor
        .ingest_all(&docs, |n, total| {
            reporter.report(SyncProgressEvent::Ingesting { n, total })
        })
        .await;

    let (mut relations, mut evidence) = (0u64, 0u64);
    for doc in &report.documents {
        if let SyncOutcome::Written { stats, .. } = &doc.outcome {
            relations += stats.relations_written;
            evidence += stats.evidence_written;
        }
    }

    println!("sync notes");
    println!("  notes found: {}", docs.len());
    println!("  written: {}", report.written());
    println!("  unchanged: {}", report.unchanged());
    println!("  cache hits: {}", report.cache_hits());
    println!("  relations written: {}", relations);
    println!("  evidence written: {}", evidence);
    if config.embedding.is_enabled() {
        println!("  embedding gaps: {}", report.embedding_gaps());
    }
    if !report.failures.is_empty() {
        println!("  failed: {}", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.name, failure.error);
        }
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// Dimensionality to pin the similarity index at, if embeddings are on.
fn index_dims(embedder: &dyn EmbeddingProvider) -> Option<usize> {
    match embedder.dims() {
        0 => None,
        d => Some(d),
    }
}
