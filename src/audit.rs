//! Append-only JSON Lines log of question/answer exchanges.
//!
//! `ngr ask` records every grounded answer in `audit.rag_log` and, with
//! `--compare`, every direct answer in `audit.direct_log`. Each line is one
//! [`AuditRecord`]. Logging failures are warned about and never fail a query.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use notegraph_core::answer::{AnswerStatus, QueryAnswer};

/// One logged exchange.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub query: &'a str,
    /// Exact user message sent to the generation service, if any.
    pub input_to_api: Option<&'a str>,
    pub api_response: &'a str,
    pub status: AnswerStatus,
    pub evidence_count: usize,
}

impl<'a> AuditRecord<'a> {
    pub fn new(query: &'a str, answer: &'a QueryAnswer) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            query,
            input_to_api: answer.prompt.as_deref(),
            api_response: &answer.answer,
            status: answer.status,
            evidence_count: answer.evidence.len(),
        }
    }
}

/// Append `record` as one JSON line to `path`, creating parent directories.
pub fn append(path: &Path, record: &AuditRecord<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let line = serde_json::to_string(record)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// [`append`], downgrading failures to a warning.
pub fn record(path: &Path, query: &str, answer: &QueryAnswer) {
    if let Err(e) = append(path, &AuditRecord::new(query, answer)) {
        tracing::warn!(path = %path.display(), error = %e, "failed to write audit log");
    }
}
