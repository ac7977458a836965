//! Graph statistics and health overview.
//!
//! Provides a quick summary of what's in the graph: concept, relation and
//! evidence counts, embedding coverage, relation types, a per-source
//! breakdown, and a few sample evidence nodes. Used by `ngr stats` to give
//! confidence that syncs and embeddings are working as expected.

use anyhow::Result;

use notegraph_core::generation::preview;
use notegraph_core::store::GraphStore;

use crate::config::Config;
use crate::db;

const SAMPLE_SIZE: i64 = 5;

/// Run the stats command: query the graph and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = db::open_graph(config, None).await?;

    let stats = store.stats().await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("notegraph - Graph Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    match store.dims() {
        Some(d) => println!("  Index dims:  {}", d),
        None => println!("  Index dims:  (not pinned)"),
    }
    println!();
    println!("  Concepts:    {}", stats.concepts);
    println!("  Relations:   {}", stats.relations);
    println!("  Evidence:    {}", stats.evidence);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.evidence_embedded,
        stats.evidence,
        percent(stats.evidence_embedded, stats.evidence)
    );
    println!("  Sources:     {}", stats.sources);

    let labels = store.relation_labels().await?;
    if !labels.is_empty() {
        println!();
        println!("  Relation types:");
        for (label, n) in &labels {
            println!("  {:<32} {:>8}", label, n);
        }
    }

    let summaries = store.source_summaries().await?;
    if !summaries.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<32} {:>9} {:>9} {:>9}   {}",
            "SOURCE", "RELATIONS", "EVIDENCE", "EMBEDDED", "LAST SYNC"
        );
        println!("  {}", "-".repeat(84));

        for s in &summaries {
            let sync_display = match s.synced_at {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<32} {:>9} {:>9} {:>9}   {}",
                s.source_id, s.relations, s.evidence, s.evidence_embedded, sync_display
            );
        }
    }

    let samples = store.sample_evidence(SAMPLE_SIZE).await?;
    if !samples.is_empty() {
        println!();
        println!("  Sample evidence:");
        for sample in &samples {
            println!(
                "  ({}) -[{}]-> \"{}\"",
                sample.concept.as_deref().unwrap_or("?"),
                sample.predicate.as_deref().unwrap_or("?"),
                preview(&sample.content, 60).replace('\n', " ")
            );
            let dims = sample
                .dims
                .map(|d| format!("{} dims", d))
                .unwrap_or_else(|| "no embedding".to_string());
            println!("      source: {}, {}", sample.source, dims);
        }
    }

    println!();

    store.pool().close().await;
    Ok(())
}

fn percent(part: u64, total: u64) -> u64 {
    if total > 0 {
        (part * 100) / total
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
