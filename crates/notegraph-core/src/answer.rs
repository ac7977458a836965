//! Question answering over the knowledge graph.
//!
//! [`QueryEngine::ask`] embeds the question, retrieves evidence, and asks the
//! generation service to answer from that evidence only.
//! [`QueryEngine::direct`] asks the same service without any context, for
//! comparison. Neither returns an error: every failure becomes a
//! human-readable [`QueryAnswer`] with a non-success [`AnswerStatus`].

use serde::Serialize;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::generation::{Message, TextGenerator};
use crate::models::RetrievedEvidence;
use crate::search::{format_context, search, RetrievalParams};
use crate::store::GraphStore;

/// Fixed instruction sent with every grounded answer request.
pub const SYSTEM_INSTRUCTION: &str = "You are a knowledge-base assistant. \
Answer the question using only the evidence provided in the context. \
If the context does not contain enough information to answer, say explicitly \
that the answer was not found in the knowledge base instead of guessing. \
Cite the evidence you rely on by its [Evidence N] reference.";

pub const MSG_EMPTY_QUESTION: &str = "Question must not be empty.";
pub const MSG_CANNOT_VECTORIZE: &str =
    "Cannot vectorize the question: the embedding service is unavailable.";
pub const MSG_NO_EVIDENCE: &str = "No relevant information was found in the knowledge graph.";

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    EmptyQuestion,
    EmbeddingFailed,
    NoEvidence,
    RetrievalFailed,
    GenerationFailed,
}

/// Result of one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    /// Answer text, or a message explaining why there is none.
    pub answer: String,
    /// User message sent to the generation service, kept for auditing.
    pub prompt: Option<String>,
    pub status: AnswerStatus,
    /// Evidence the answer was grounded on.
    pub evidence: Vec<RetrievedEvidence>,
}

impl QueryAnswer {
    fn message(status: AnswerStatus, text: impl Into<String>) -> Self {
        Self {
            answer: text.into(),
            prompt: None,
            status,
            evidence: Vec::new(),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.status == AnswerStatus::Answered
    }
}

/// Build the user message of a grounded answer request.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer based on the context above.",
        context, question
    )
}

/// Query orchestration over borrowed collaborators.
pub struct QueryEngine<'a, E: ?Sized, G: ?Sized, S: ?Sized> {
    embedder: &'a E,
    generator: &'a G,
    store: &'a S,
    params: RetrievalParams,
}

impl<'a, E, G, S> QueryEngine<'a, E, G, S>
where
    E: EmbeddingProvider + ?Sized,
    G: TextGenerator + ?Sized,
    S: GraphStore + ?Sized,
{
    pub fn new(embedder: &'a E, generator: &'a G, store: &'a S, params: RetrievalParams) -> Self {
        Self {
            embedder,
            generator,
            store,
            params,
        }
    }

    /// Answer `question` from retrieved evidence.
    pub async fn ask(&self, question: &str) -> QueryAnswer {
        let question = question.trim();
        if question.is_empty() {
            return QueryAnswer::message(AnswerStatus::EmptyQuestion, MSG_EMPTY_QUESTION);
        }

        let Some(query_vec) = embed_query(self.embedder, question).await else {
            tracing::warn!("question could not be embedded");
            return QueryAnswer::message(AnswerStatus::EmbeddingFailed, MSG_CANNOT_VECTORIZE);
        };

        let evidence = match search(self.store, &query_vec, &self.params).await {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed");
                return QueryAnswer::message(
                    AnswerStatus::RetrievalFailed,
                    format!("Retrieval failed: {}", e),
                );
            }
        };

        if evidence.is_empty() {
            tracing::info!("no evidence retrieved, skipping generation");
            return QueryAnswer::message(AnswerStatus::NoEvidence, MSG_NO_EVIDENCE);
        }

        let prompt = build_prompt(question, &format_context(&evidence));
        tracing::debug!(
            hits = evidence.len(),
            prompt = %crate::generation::preview(&prompt, 100),
            "sending grounded answer request"
        );

        let messages = [Message::system(SYSTEM_INSTRUCTION), Message::user(&prompt)];
        match self.generator.generate(&messages).await {
            Ok(answer) => QueryAnswer {
                answer,
                prompt: Some(prompt),
                status: AnswerStatus::Answered,
                evidence,
            },
            Err(e) => {
                tracing::warn!(error = %e, "answer generation failed");
                QueryAnswer {
                    answer: format!("Answer generation failed: {}", e),
                    prompt: Some(prompt),
                    status: AnswerStatus::GenerationFailed,
                    evidence,
                }
            }
        }
    }

    /// Answer `question` without consulting the graph.
    pub async fn direct(&self, question: &str) -> QueryAnswer {
        let question = question.trim();
        if question.is_empty() {
            return QueryAnswer::message(AnswerStatus::EmptyQuestion, MSG_EMPTY_QUESTION);
        }

        match self.generator.generate(&[Message::user(question)]).await {
            Ok(answer) => QueryAnswer {
                answer,
                prompt: Some(question.to_string()),
                status: AnswerStatus::Answered,
                evidence: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "direct generation failed");
                QueryAnswer {
                    answer: format!("Answer generation failed: {}", e),
                    prompt: Some(question.to_string()),
                    status: AnswerStatus::GenerationFailed,
                    evidence: Vec::new(),
                }
            }
        }
    }
}
