//! # notegraph CLI (`ngr`)
//!
//! ## Usage
//!
//! ```bash
//! ngr --config ./config/notegraph.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ngr init` | Create the SQLite graph database and run schema migrations |
//! | `ngr sync` | Ingest the notes root into the graph |
//! | `ngr search "<query>"` | Retrieve the most relevant evidence |
//! | `ngr ask "<question>"` | Answer a question from the graph |
//! | `ngr stats` | Graph counts, coverage and samples |
//! | `ngr reset --yes` | Delete everything in the graph |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use notegraph::progress::ProgressMode;
use notegraph::{ask, config, db, ingest, migrate, search, stats};
use notegraph_core::store::GraphStore;

/// notegraph: build a knowledge graph from Markdown notes and ask it
/// questions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/notegraph.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ngr",
    about = "notegraph: a knowledge graph built from your notes, with grounded Q&A",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/notegraph.toml")]
    config: PathBuf,

    /// Log debug output (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the graph schema.
    ///
    /// Creates the SQLite database file and all required tables. Running it
    /// multiple times is safe.
    Init,

    /// Ingest notes into the graph.
    ///
    /// Every note whose content changed since its last sync is extracted
    /// (or served from the content cache), embedded, and written to the
    /// graph, replacing its previous contribution.
    Sync {
        /// Rewrite every note, even when its version is current.
        #[arg(long)]
        full: bool,

        /// Show how many notes would be written without calling any service.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of notes to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Retrieve the evidence most relevant to a query (no answer generation).
    Search {
        /// The search query string.
        query: String,

        /// Number of evidence passages to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question from the knowledge graph.
    Ask {
        /// The question.
        question: String,

        /// Number of evidence passages used as context.
        #[arg(long)]
        top_k: Option<usize>,

        /// Also answer without the graph, for comparison.
        #[arg(long)]
        compare: bool,
    },

    /// Show graph statistics.
    Stats,

    /// Delete every concept, relation, evidence node and version record.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "notegraph=debug,notegraph_core=debug"
    } else {
        "notegraph=info,notegraph_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            full,
            dry_run,
            limit,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_sync(&cfg, full, dry_run, limit, progress).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Ask {
            question,
            top_k,
            compare,
        } => {
            ask::run_ask(&cfg, &question, top_k, compare).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to reset the graph without --yes");
            }
            let store = db::open_graph(&cfg, None).await?;
            store.clear().await?;
            store.pool().close().await;
            println!(
                "Graph cleared. Cached extractions in {} were kept.",
                cfg.cache.dir.display()
            );
        }
    }

    Ok(())
}
