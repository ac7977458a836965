//! `ngr search`: retrieval only, no answer generation.
//!
//! Embeds the query, runs the hybrid retrieval of
//! [`notegraph_core::search::search`] against the SQLite graph and prints the
//! ranked evidence with the Concept each passage belongs to.

use anyhow::{bail, Result};

use notegraph_core::embedding::embed_query;
use notegraph_core::generation::truncate_chars;
use notegraph_core::models::RetrievedEvidence;
use notegraph_core::search::{search, RetrievalParams};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;

/// Retrieval parameters from `[retrieval]`, with an optional `--top-k`.
pub fn retrieval_params(config: &Config, top_k: Option<usize>) -> RetrievalParams {
    RetrievalParams {
        top_k: top_k.unwrap_or(config.retrieval.top_k),
        owner_predicates: config.retrieval.owner_predicates.clone(),
    }
}

pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires an embedding provider; set [embedding] provider in the config");
    }

    let embedder = create_provider(&config.embedding)?;
    let store = db::open_graph(config, None).await?;
    let params = retrieval_params(config, top_k);

    let Some(query_vec) = embed_query(embedder.as_ref(), query.trim()).await else {
        store.pool().close().await;
        bail!("Cannot vectorize the query: the embedding service is unavailable");
    };

    let results = search(&store, &query_vec, &params).await?;
    print_results(&results);

    store.pool().close().await;
    Ok(())
}

/// Print ranked evidence in the CLI's list format.
pub fn print_results(results: &[RetrievedEvidence]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            result.score,
            result.entity.as_deref().unwrap_or("unknown")
        );
        println!("    source: {}", result.source);
        println!(
            "    excerpt: \"{}\"",
            truncate_chars(&result.content, 200).replace('\n', " ").trim()
        );
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn top_k_override() {
        let config = parse_config(
            r#"
[db]
path = "./data/graph.sqlite"
[notes]
root = "./notes"
[extraction]
prompt_file = "./config/extract_prompt.txt"
model = "qwen-max"
[retrieval]
top_k = 7
owner_predicates = ["DESCRIBES"]
"#,
        )
        .unwrap();

        assert_eq!(retrieval_params(&config, None).top_k, 7);
        let params = retrieval_params(&config, Some(2));
        assert_eq!(params.top_k, 2);
        assert_eq!(params.owner_predicates, vec!["DESCRIBES"]);
    }
}
