//! # notegraph
//!
//! Turns a directory of Markdown notes into a knowledge graph and answers
//! questions from it.
//!
//! Each note is sent to an LLM that extracts relation triplets and evidence
//! passages. Passages are embedded, and everything is written to a SQLite
//! graph, replacing whatever the note contributed before. Questions are
//! answered from the evidence most similar to the question, expanded one hop
//! to the Concept each passage describes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────────────┐   ┌──────────────┐
//! │   Notes     │──▶│  Cache + Extract  │──▶│   SQLite     │
//! │  (*.md)     │   │  + Embed + Sync   │   │   graph      │
//! └─────────────┘   └───────────────────┘   └──────┬───────┘
//!                                                  │
//!                                                  ▼
//!                                 ┌────────────────────────────┐
//!                                 │ ngr search / ngr ask (RAG) │
//!                                 └────────────────────────────┘
//! ```
//!
//! The algorithms live in `notegraph-core`; this crate supplies the
//! concrete backends (HTTP clients, SQLite store, filesystem cache) and the
//! `ngr` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! ngr init                           # create the graph database
//! ngr sync                           # ingest notes
//! ngr search "ownership rules"       # retrieval only
//! ngr ask "What is a lifetime?" --compare
//! ngr stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`notes`] | Notes root scanning |
//! | [`cache_fs`] | Filesystem content cache |
//! | [`http`] | JSON HTTP transport with retries |
//! | [`llm`] | Chat-completions client |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_store`] | SQLite graph store |
//! | [`ingest`] | `ngr sync` |
//! | [`search`] / [`ask`] | `ngr search` / `ngr ask` |
//! | [`audit`] | Q&A audit log |
//! | [`stats`] | `ngr stats` |
//! | [`db`] / [`migrate`] | Database connection and schema |

pub mod ask;
pub mod audit;
pub mod cache_fs;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod notes;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
