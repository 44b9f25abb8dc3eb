//! # Hybrid RAG CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag ingest <file.json>` | Ingest a JSON array of items as one document |
//! | `rag search "<query>"` | Hybrid (BM25 + embedding) search |
//! | `rag ask "<question>"` | Answer a question from retrieved context |
//! | `rag documents` | List ingested documents |
//! | `rag delete <id>` | Delete a document and its chunks |
//! | `rag serve` | Start the HTTP API |
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG` (e.g.
//! `RUST_LOG=hybrid_rag=debug`) to see them. The default level is `warn`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hybrid_rag::{ask, config, documents, ingest, migrate, search, server};

/// Hybrid RAG: question answering over ingested documents with fused
/// lexical and semantic retrieval.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Hybrid RAG: question answering over ingested documents",
    version,
    long_about = "Ingests structured JSON items, splits them into overlapping chunks, embeds \
    them, and answers questions from chunks ranked by reciprocal rank fusion of BM25 and \
    embedding similarity."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents and chunks
    /// tables. Safe to run repeatedly.
    Init,

    /// Ingest a JSON file as one document.
    ///
    /// The file holds an array of items (or a single item). Text is taken
    /// from each item's content/text/body/description/title fields.
    Ingest {
        /// Path to the JSON file.
        path: PathBuf,

        /// Document name to record (defaults to the file name).
        #[arg(long)]
        filename: Option<String>,
    },

    /// Search ingested chunks.
    Search {
        /// The search query string.
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question from retrieved context.
    Ask {
        question: String,

        /// Continue an existing chat session.
        #[arg(long)]
        session: Option<String>,
    },

    /// List ingested documents, newest first.
    Documents,

    /// Delete a document and all of its chunks.
    Delete {
        /// Document UUID.
        id: String,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("initialized");
        }
        Commands::Ingest { path, filename } => {
            ingest::run_ingest(&cfg, &path, filename).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Ask { question, session } => {
            ask::run_ask(&cfg, &question, session).await?;
        }
        Commands::Documents => {
            documents::run_list(&cfg).await?;
        }
        Commands::Delete { id } => {
            documents::run_delete(&cfg, &id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
