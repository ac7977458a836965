//! `ngr ask`: grounded question answering, optionally compared with a direct
//! answer from the same model.

use anyhow::Result;

use notegraph_core::answer::{QueryAnswer, QueryEngine};

use crate::audit;
use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::llm::ChatClient;
use crate::search::{print_results, retrieval_params};

pub async fn run_ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    compare: bool,
) -> Result<()> {
    let embedder = create_provider(&config.embedding)?;
    let generator = ChatClient::for_generation(config)?;
    let store = db::open_graph(config, None).await?;

    let engine = QueryEngine::new(
        embedder.as_ref(),
        &generator,
        &store,
        retrieval_params(config, top_k),
    );

    let rag = engine.ask(question).await;
    if config.audit.enabled {
        audit::record(&config.audit.rag_log, question, &rag);
    }
    print_answer("answer (knowledge graph)", &rag);

    if compare {
        let direct = engine.direct(question).await;
        if config.audit.enabled {
            audit::record(&config.audit.direct_log, question, &direct);
        }
        print_answer("answer (direct)", &direct);
    }

    store.pool().close().await;
    Ok(())
}

fn print_answer(title: &str, answer: &QueryAnswer) {
    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    println!();
    println!("{}", answer.answer);
    println!();
    if !answer.evidence.is_empty() {
        println!("evidence:");
        print_results(&answer.evidence);
    }
}
