//! Core data models used throughout notegraph.
//!
//! These types represent the documents, extraction results and retrieval
//! results that flow through the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix applied to every source identifier derived from a note name.
pub const SOURCE_ID_PREFIX: &str = "note_";

/// One ingested unit: a note read from disk (or supplied by a test).
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable key scoping all graph, cache and version state of this note.
    pub source_id: String,
    /// Path of the note relative to the notes root, for display.
    pub name: String,
    pub text: String,
}

impl SourceDocument {
    /// Build a document, deriving its source identifier from `name`.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source_id: source_id_for(&name),
            name,
            text: text.into(),
        }
    }
}

/// One directed relation extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub head: String,
    pub relation: String,
    pub tail: String,
}

/// One evidence passage extracted from a document.
///
/// `embedding` stays `None` when the embedding service could not produce a
/// vector; such chunks are still written to the graph but never surface
/// through similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub content: String,
    /// Name of the Concept this passage is about.
    pub subject: String,
    pub predicate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Validated structured output of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub triplets: Vec<Triplet>,
    pub chunks: Vec<EvidenceChunk>,
}

impl ExtractionResult {
    /// Number of chunks still waiting for an embedding vector.
    pub fn embedding_gaps(&self) -> usize {
        self.chunks.iter().filter(|c| c.embedding.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty() && self.chunks.is_empty()
    }
}

/// One hit returned by the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedEvidence {
    pub content: String,
    /// Concept the passage is about, recovered through one graph hop.
    pub entity: Option<String>,
    /// Cosine similarity to the query vector.
    pub score: f64,
    pub source: String,
}

/// Deterministic digest of the exact text sent for extraction.
///
/// SHA-256, lowercase hex.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a source identifier from a note's file name or relative path.
///
/// The extension is dropped, every character outside ASCII letters, digits,
/// `_`, `-` and the CJK unified ideographs block is replaced by `_`, and the
/// result is prefixed with [`SOURCE_ID_PREFIX`].
///
/// ```rust
/// use notegraph_core::models::source_id_for;
///
/// assert_eq!(source_id_for("Rust Ownership.md"), "note_Rust_Ownership");
/// assert_eq!(source_id_for("guides/async.md"), "note_guides_async");
/// ```
pub fn source_id_for(name: &str) -> String {
    let base = match name.rfind('.') {
        Some(dot) if dot > 0 && !name[dot..].contains('/') => &name[..dot],
        _ => name,
    };

    let safe: String = base
        .chars()
        .map(|c| if is_source_id_char(c) { c } else { '_' })
        .collect();

    format!("{}{}", SOURCE_ID_PREFIX, safe)
}

fn is_source_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}
