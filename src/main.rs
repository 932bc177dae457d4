//! # code-rag CLI
//!
//! | Command | Description |
//! |---------|-------------|
//! | `code-rag index <path> [--incremental]` | Index a project tree |
//! | `code-rag query "<question>" [--path <root>]` | Retrieve context and print the answer |
//! | `code-rag related <file> [--depth N]` | Files connected to a file by imports |
//! | `code-rag stats` | Graph and store counts |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use code_rag::{Config, IndexingMode, RagClient};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "code-rag",
    about = "Incremental codebase indexing with hybrid (BM25 + vector) retrieval",
    version,
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("CODE_RAG_GIT_COMMIT"),
        ", built ",
        env!("CODE_RAG_BUILD_TIMESTAMP"),
        ")"
    )
)]
struct Cli {
    /// Configuration file (TOML). Defaults to the platform config directory.
    #[arg(long, global = true, env = "CODE_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Embedding model, overrides the configuration
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project directory
    Index {
        path: PathBuf,

        /// Only process files whose content changed since the last run
        #[arg(long)]
        incremental: bool,
    },

    /// Retrieve context for a question and print the answer
    Query {
        query: String,

        /// Number of chunks to retrieve
        #[arg(long)]
        limit: Option<usize>,

        /// Project root refreshed before querying when the index is stale
        #[arg(long)]
        path: Option<PathBuf>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// List files related to a file through dependency edges
    Related {
        file: PathBuf,

        #[arg(long, default_value_t = 1)]
        depth: usize,
    },

    /// Show graph and store statistics
    Stats,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::new()?,
    };
    if let Some(model) = &cli.model {
        config.embedding.model_name = model.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).context("Failed to load configuration")?;
    let client = RagClient::with_config(config).await?;

    match cli.command {
        Commands::Index { path, incremental } => {
            let mode = if incremental {
                IndexingMode::Incremental
            } else {
                IndexingMode::Full
            };

            let cancel_token = CancellationToken::new();
            let on_interrupt = cancel_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping after the current file");
                    on_interrupt.cancel();
                }
            });

            let response = client
                .index_with_cancellation(&path, mode, cancel_token)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Query {
            query,
            limit,
            path,
            json,
        } => {
            if let Some(path) = path {
                client.set_project_root(&path).await;
            }
            let response = client.query(&query, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.answer);
            }
        }
        Commands::Related { file, depth } => {
            for related in client.related_files(&file, depth).await {
                println!("{}", related.display());
            }
        }
        Commands::Stats => {
            let stats = client.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
