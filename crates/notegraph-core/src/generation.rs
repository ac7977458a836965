//! Text-generation service abstraction.
//!
//! The same chat-completion service is used twice: once per document to
//! extract triplets and evidence passages, and once per question to compose
//! an answer. Concrete HTTP clients live in the `notegraph` app crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Role of a message in a chat-completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-completion backend.
///
/// Implementations return the text of the first choice, trimmed. Transport
/// failures, timeouts and non-success responses are reported as
/// [`Error::Service`](crate::error::Error::Service).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier used for requests (e.g. `"qwen-max"`).
    fn model_name(&self) -> &str;

    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Shorten `text` for logging: first and last `keep` characters with the
/// omitted count in between.
pub fn preview(text: &str, keep: usize) -> String {
    let total = text.chars().count();
    if total <= keep * 2 {
        return text.to_string();
    }
    let head: String = text.chars().take(keep).collect();
    let tail: String = text.chars().skip(total - keep).collect();
    format!("{} ... [{} chars omitted] ... {}", head, total - keep * 2, tail)
}

/// Cut `text` after `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
