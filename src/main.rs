//! # Rolegate CLI (`rolegate`)
//!
//! The `rolegate` binary is the primary interface for Rolegate. It provides
//! commands for database initialization, document ingestion, one-shot
//! queries, and starting the HTTP gateway.
//!
//! ## Usage
//!
//! ```bash
//! rolegate --config ./rolegate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rolegate init` | Create the SQLite index and run schema migrations |
//! | `rolegate ingest <dir>` | Index a role-tagged folder tree |
//! | `rolegate ask "<question>" --role <role>` | Query the pipeline without HTTP |
//! | `rolegate serve` | Start the HTTP gateway |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the index
//! rolegate init --config ./rolegate.toml
//!
//! # Index a folder tree (folder names become role tags)
//! rolegate ingest ./company_docs --config ./rolegate.toml
//!
//! # Preview what an ingest would do
//! rolegate ingest ./company_docs --dry-run
//!
//! # One-shot query as the Finance role
//! rolegate ask "What is the Q1 budget?" --role Finance
//!
//! # Start the gateway on [server].bind
//! rolegate serve --config ./rolegate.toml
//! ```

mod chunk;
mod config;
mod db;
mod embedding;
mod extract;
mod generate;
mod index;
mod ingest;
mod migrate;
mod models;
mod password;
mod policy;
mod rag;
mod server;
mod token;
mod users;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rolegate CLI — role-gated document question answering over a local
/// vector index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "rolegate",
    about = "Role-gated document question answering over a local vector index",
    version,
    long_about = "Rolegate ingests a folder tree of documents, tags every file with the role \
    derived from its parent folder name, and serves role-scoped retrieval-augmented answers \
    over HTTP with signup/login and signed bearer tokens."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./rolegate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and the chunks table. This command is
    /// idempotent — running it multiple times is safe.
    Init,

    /// Ingest a folder tree into the index.
    ///
    /// Walks the directory, tags every file with the role derived from its
    /// parent folder name, extracts text, chunks it, embeds the chunks, and
    /// stores them. Unchanged content is skipped via content hashing.
    Ingest {
        /// Root directory to ingest.
        dir: PathBuf,

        /// Scan and count without writing to the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask one question through the retrieval pipeline.
    ///
    /// Runs the same chain the HTTP gateway uses, scoped to the given
    /// role's allowed collections. Useful for operators and smoke tests.
    Ask {
        /// The question to answer.
        question: String,

        /// Role whose collection scope applies.
        #[arg(long)]
        role: String,
    },

    /// Start the HTTP gateway.
    ///
    /// Binds to the address in `[server].bind` and serves signup, login,
    /// and role-scoped query endpoints.
    Serve,
}

/// Configure tracing: `RUST_LOG` filtering (default `info`), compact
/// stdout output.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dir, dry_run } => {
            ingest::run_ingest(&cfg, &dir, dry_run).await?;
        }
        Commands::Ask { question, role } => {
            rag::run_ask(&cfg, &question, &role).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
