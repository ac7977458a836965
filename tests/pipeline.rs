//! Ingestion and question answering over the real SQLite store and
//! filesystem cache, with scripted extraction, embedding and generation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use notegraph::cache_fs::FsBlobStore;
use notegraph::db::connect_path;
use notegraph::migrate::migrate_pool;
use notegraph::sqlite_store::SqliteGraphStore;
use notegraph_core::answer::{AnswerStatus, QueryEngine, MSG_NO_EVIDENCE};
use notegraph_core::cache::ContentCache;
use notegraph_core::embedding::EmbeddingProvider;
use notegraph_core::error::{Error, Result, ServiceKind};
use notegraph_core::generation::{Message, TextGenerator};
use notegraph_core::models::SourceDocument;
use notegraph_core::pipeline::{IngestOptions, Ingestor};
use notegraph_core::search::RetrievalParams;
use notegraph_core::store::GraphStore;

const TEMPLATE: &str = "Return JSON for:\nCONTENT_PLACEHOLDER";

/// Extracts one triplet and one passage per line of the note.
///
/// A line `A -> B` yields the triplet `(A, "links to", B)` and the passage
/// `"A links to B"` about `A`.
struct LineExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for LineExtractor {
    fn model_name(&self) -> &str {
        "line-extractor"
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = messages[0]
            .content
            .strip_prefix("Return JSON for:\n")
            .unwrap_or_default();

        let mut triplets = Vec::new();
        let mut chunks = Vec::new();
        for line in body.lines() {
            if let Some((head, tail)) = line.split_once("->") {
                let (head, tail) = (head.trim(), tail.trim());
                triplets.push(serde_json::json!({
                    "head": head, "relation": "links to", "tail": tail
                }));
                chunks.push(serde_json::json!({
                    "content": format!("{} links to {}", head, tail),
                    "subject": head,
                    "predicate": "describes"
                }));
            }
        }
        Ok(serde_json::json!({"triplets": triplets, "chunks": chunks}).to_string())
    }
}

/// Bag-of-letters embedder over `a..=d`.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                ['a', 'b', 'c', 'd']
                    .iter()
                    .map(|l| lower.matches(*l).count() as f32 + 0.01)
                    .collect()
            })
            .collect())
    }
}

/// [`LetterEmbedder`] behind a switch.
struct SwitchedEmbedder {
    up: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SwitchedEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(Error::service(ServiceKind::Embedding, "connection refused"));
        }
        LetterEmbedder.embed(texts).await
    }
}

/// Echoes the grounded prompt back; records how often it was called.
struct EchoGenerator {
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .ok_or_else(|| Error::service(ServiceKind::Generation, "no messages"))?;
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        Ok(format!("answered from {} chars", prompt.len()))
    }
}

struct Fixture {
    _tmp: TempDir,
    store: SqliteGraphStore,
    cache: ContentCache<FsBlobStore>,
    extractor: LineExtractor,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let pool = connect_path(&tmp.path().join("graph.sqlite")).await.unwrap();
    migrate_pool(&pool, Some(4)).await.unwrap();
    let store = SqliteGraphStore::open(pool).await.unwrap();
    let cache = ContentCache::new(FsBlobStore::new(tmp.path().join("storage")).unwrap());
    Fixture {
        _tmp: tmp,
        store,
        cache,
        extractor: LineExtractor {
            calls: AtomicUsize::new(0),
        },
    }
}

impl Fixture {
    fn ingestor(
        &self,
        force: bool,
    ) -> Ingestor<'_, LineExtractor, LetterEmbedder, SqliteGraphStore, FsBlobStore> {
        Ingestor::new(
            &self.extractor,
            &LetterEmbedder,
            &self.store,
            &self.cache,
            TEMPLATE,
            IngestOptions {
                force,
                embed_batch_size: 2,
            },
        )
    }

    fn extractions(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }

    fn cache_files(&self) -> usize {
        std::fs::read_dir(self.cache.blobs().dir()).unwrap().count()
    }
}

fn notes() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new("abc.md", "Alpha -> Beta\nBeta -> Cab"),
        SourceDocument::new("dd.md", "Dad -> Beta"),
    ]
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let fx = fixture().await;

    let first = fx.ingestor(false).ingest_all(&notes(), |_, _| {}).await;
    assert!(first.failures.is_empty(), "{:?}", first.failures);
    assert_eq!(first.written(), 2);
    assert_eq!(first.cache_hits(), 0);
    assert_eq!(first.embedding_gaps(), 0);
    assert_eq!(fx.extractions(), 2);
    assert_eq!(fx.cache_files(), 2);

    let before = fx.store.stats().await.unwrap();
    assert_eq!(before.relations, 3);
    assert_eq!(before.evidence, 3);
    assert_eq!(before.evidence_embedded, 3);
    // Beta is shared by both notes.
    assert_eq!(before.concepts, 4);

    let second = fx.ingestor(false).ingest_all(&notes(), |_, _| {}).await;
    assert_eq!(second.written(), 0);
    assert_eq!(second.unchanged(), 2);
    assert_eq!(second.cache_hits(), 2);
    assert_eq!(fx.extractions(), 2);
    assert_eq!(fx.store.stats().await.unwrap(), before);
}

#[tokio::test]
async fn test_edit_rewrites_and_revert_restores() {
    let fx = fixture().await;
    let original = notes();
    fx.ingestor(false).ingest_all(&original, |_, _| {}).await;

    let edited = vec![SourceDocument::new("abc.md", "Alpha -> Dad")];
    let report = fx.ingestor(false).ingest_all(&edited, |_, _| {}).await;
    assert_eq!(report.written(), 1);
    assert_eq!(fx.extractions(), 3);
    // The stale entry for the old content was removed.
    assert_eq!(fx.cache_files(), 2);

    let labels = fx.store.relation_labels().await.unwrap();
    assert_eq!(labels, vec![("LINKS_TO".to_string(), 2)]);

    let report = fx.ingestor(false).ingest_all(&original[..1], |_, _| {}).await;
    assert_eq!(report.written(), 1);
    // Reverted content is extracted again: its entry was removed on edit.
    assert_eq!(fx.extractions(), 4);
    assert_eq!(fx.store.stats().await.unwrap().relations, 3);
    assert_eq!(fx.store.stats().await.unwrap().evidence, 3);
}

#[tokio::test]
async fn test_progress_reports_every_note() {
    let fx = fixture().await;
    let mut seen = Vec::new();
    fx.ingestor(true)
        .ingest_all(&notes(), |n, total| seen.push((n, total)))
        .await;
    assert_eq!(seen, vec![(1, 2), (2, 2)]);
}

#[tokio::test]
async fn test_ask_grounds_answer_in_synced_evidence() {
    let fx = fixture().await;
    fx.ingestor(false).ingest_all(&notes(), |_, _| {}).await;

    let generator = EchoGenerator {
        calls: AtomicUsize::new(0),
        last_prompt: Mutex::new(None),
    };
    let params = RetrievalParams {
        top_k: 2,
        owner_predicates: vec!["describes".to_string()],
    };
    let engine = QueryEngine::new(&LetterEmbedder, &generator, &fx.store, params);

    let answer = engine.ask("dad").await;
    assert_eq!(answer.status, AnswerStatus::Answered);
    assert_eq!(answer.evidence.len(), 2);
    assert_eq!(answer.evidence[0].content, "Dad links to Beta");
    assert_eq!(answer.evidence[0].entity.as_deref(), Some("Dad"));
    assert_eq!(answer.evidence[0].source, "note_dd");

    let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("[Evidence 1]"));
    assert!(prompt.contains("entity: Dad"));
    assert!(prompt.contains("Question: dad"));
    assert_eq!(answer.prompt.as_deref(), Some(prompt.as_str()));
}

#[tokio::test]
async fn test_ask_on_empty_graph_skips_generation() {
    let fx = fixture().await;
    let generator = EchoGenerator {
        calls: AtomicUsize::new(0),
        last_prompt: Mutex::new(None),
    };
    let engine = QueryEngine::new(
        &LetterEmbedder,
        &generator,
        &fx.store,
        RetrievalParams::default(),
    );

    let answer = engine.ask("anything at all").await;
    assert_eq!(answer.status, AnswerStatus::NoEvidence);
    assert_eq!(answer.answer, MSG_NO_EVIDENCE);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resync_writes_vectors_after_embedding_outage() {
    let fx = fixture().await;
    let embedder = SwitchedEmbedder {
        up: AtomicBool::new(false),
    };
    let docs = vec![SourceDocument::new("dd.md", "Dad -> Beta")];
    let ingestor = Ingestor::new(
        &fx.extractor,
        &embedder,
        &fx.store,
        &fx.cache,
        TEMPLATE,
        IngestOptions::default(),
    );

    let first = ingestor.ingest_all(&docs, |_, _| {}).await;
    assert_eq!(first.written(), 1);
    assert_eq!(first.embedding_gaps(), 1);
    assert_eq!(fx.store.stats().await.unwrap().evidence_embedded, 0);

    embedder.up.store(true, Ordering::SeqCst);
    let second = ingestor.ingest_all(&docs, |_, _| {}).await;
    assert_eq!(second.cache_hits(), 1);
    assert_eq!(second.written(), 1);
    assert_eq!(second.embedding_gaps(), 0);
    assert_eq!(fx.extractions(), 1);

    let stats = fx.store.stats().await.unwrap();
    assert_eq!(stats.evidence, 1);
    assert_eq!(stats.evidence_embedded, 1);
    let hits = fx.store.vector_search(&[1.0, 1.0, 0.0, 1.0], 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "Dad links to Beta");
}
