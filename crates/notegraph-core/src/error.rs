//! Error taxonomy shared by the ingestion and query paths.
//!
//! Failures are recovered at the document or query boundary: a
//! [`Error::Service`] or [`Error::Parse`] skips one document (or turns one
//! query into a human-readable message), [`Error::CacheIo`] never escapes the
//! content cache, and [`Error::IndexUnavailable`] is turned into an empty
//! retrieval result by the search engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The external collaborator a [`Error::Service`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Extraction,
    Embedding,
    Generation,
    GraphStore,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Extraction => write!(f, "extraction"),
            ServiceKind::Embedding => write!(f, "embedding"),
            ServiceKind::Generation => write!(f, "generation"),
            ServiceKind::GraphStore => write!(f, "graph store"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// An external call was unreachable, timed out, or returned an error.
    #[error("{service} service error: {message}")]
    Service {
        service: ServiceKind,
        message: String,
    },

    /// Extraction output could not be parsed into triplets and chunks.
    #[error("failed to parse extraction output: {0}")]
    Parse(String),

    /// Reading or writing a cache entry failed.
    #[error("cache i/o error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The similarity index over evidence embeddings cannot be queried.
    #[error("similarity index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn service(service: ServiceKind, message: impl Into<String>) -> Self {
        Error::Service {
            service,
            message: message.into(),
        }
    }

    /// Shorthand for graph store failures.
    pub fn store(message: impl fmt::Display) -> Self {
        Error::service(ServiceKind::GraphStore, message.to_string())
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Error::Service { .. })
    }
}
