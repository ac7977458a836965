//! # notegraph core
//!
//! Storage- and transport-agnostic logic for notegraph: data models, the
//! extraction cache, the extraction and embedding adapters, the graph store
//! abstraction, incremental synchronization and hybrid retrieval.
//!
//! This crate contains no sqlx, HTTP client, filesystem I/O or CLI code.
//! External services are reached through the [`generation::TextGenerator`],
//! [`embedding::EmbeddingProvider`], [`store::GraphStore`] and
//! [`cache::BlobStore`] traits, implemented by the `notegraph` app crate.

pub mod answer;
pub mod cache;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod labels;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
