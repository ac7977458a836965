//! Extraction adapter: prompt rendering and payload validation.
//!
//! The extraction prompt template contains a single [`PLACEHOLDER`] token
//! that is replaced by the document text. The generation service is expected
//! to answer with a JSON object of the form
//!
//! ```json
//! {
//!   "triplets": [{"head": "Rust", "relation": "is a", "tail": "Language"}],
//!   "chunks": [{"content": "...", "subject": "Rust", "predicate": "describes"}]
//! }
//! ```
//!
//! Missing lists default to empty, a chunk without `predicate` defaults to
//! [`DEFAULT_PREDICATE`], and entries with blank required fields are dropped.
//! Anything that is not such an object is an [`Error::Parse`].

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::generation::{Message, TextGenerator};
use crate::labels::DEFAULT_PREDICATE;
use crate::models::{EvidenceChunk, ExtractionResult, Triplet};

/// Substitution point for the document text in the prompt template.
pub const PLACEHOLDER: &str = "CONTENT_PLACEHOLDER";

/// Check that a prompt template carries exactly one [`PLACEHOLDER`].
pub fn validate_template(template: &str) -> Result<()> {
    match template.matches(PLACEHOLDER).count() {
        1 => Ok(()),
        0 => Err(Error::Config(format!(
            "prompt template does not contain {}",
            PLACEHOLDER
        ))),
        n => Err(Error::Config(format!(
            "prompt template contains {} occurrences of {}, expected exactly one",
            n, PLACEHOLDER
        ))),
    }
}

/// Substitute the document text into the template.
pub fn render_prompt(template: &str, document_text: &str) -> String {
    template.replacen(PLACEHOLDER, document_text, 1)
}

/// Render the prompt for `document_text` and run one extraction.
pub async fn extract<G: TextGenerator + ?Sized>(
    generator: &G,
    document_text: &str,
    template: &str,
) -> Result<ExtractionResult> {
    let prompt = render_prompt(template, document_text);
    extract_prompt(generator, &prompt).await
}

/// Send an already rendered prompt and parse the reply.
pub async fn extract_prompt<G: TextGenerator + ?Sized>(
    generator: &G,
    prompt: &str,
) -> Result<ExtractionResult> {
    let raw = generator.generate(&[Message::user(prompt)]).await?;
    parse_extraction(&raw)
}

#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    triplets: Vec<RawTriplet>,
    #[serde(default)]
    chunks: Vec<RawChunk>,
}

#[derive(Deserialize)]
struct RawTriplet {
    #[serde(default)]
    head: Option<String>,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    tail: Option<String>,
}

#[derive(Deserialize)]
struct RawChunk {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    predicate: Option<String>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Parse raw generation output into a validated [`ExtractionResult`].
pub fn parse_extraction(raw: &str) -> Result<ExtractionResult> {
    let cleaned = strip_code_fence(raw);

    let payload: RawExtraction = match serde_json::from_str(cleaned) {
        Ok(p) => p,
        Err(first_err) => {
            // Some models wrap the object in prose; retry on the outermost braces.
            let inner = outermost_object(cleaned)
                .ok_or_else(|| Error::Parse(first_err.to_string()))?;
            serde_json::from_str(inner).map_err(|e| Error::Parse(e.to_string()))?
        }
    };

    let triplets = payload
        .triplets
        .into_iter()
        .filter_map(|t| {
            let head = non_blank(t.head)?;
            let tail = non_blank(t.tail)?;
            Some(Triplet {
                head,
                relation: t.relation.unwrap_or_default().trim().to_string(),
                tail,
            })
        })
        .collect();

    let chunks = payload
        .chunks
        .into_iter()
        .filter_map(|c| {
            let content = non_blank(c.content)?;
            let subject = non_blank(c.subject)?;
            Some(EvidenceChunk {
                content,
                subject,
                predicate: non_blank(c.predicate)
                    .unwrap_or_else(|| DEFAULT_PREDICATE.to_string()),
                embedding: c.embedding.filter(|v| !v.is_empty()),
            })
        })
        .collect();

    Ok(ExtractionResult { triplets, chunks })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
