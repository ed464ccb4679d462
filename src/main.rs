//! # PDF Q&A CLI (`pdfqa`)
//!
//! ## Usage
//!
//! ```bash
//! pdfqa --config ./config/pdfqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfqa serve` | Start the HTTP API |
//! | `pdfqa chat <paths…>` | Chat about local PDFs in the terminal |
//! | `pdfqa ingest <paths…>` | Show what extraction and chunking produce |
//!
//! When `--config` is not given and `./config/pdfqa.toml` does not exist,
//! built-in defaults are used.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdf_qa::config::{self, Config};
use pdf_qa::{chat, ingest, server};

const DEFAULT_CONFIG_PATH: &str = "./config/pdfqa.toml";

/// PDF Q&A: ask questions about PDF documents using retrieval and a hosted
/// chat model.
#[derive(Parser)]
#[command(name = "pdfqa", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdfqa.toml`; built-in defaults apply when that
    /// file is absent. See `config/pdfqa.example.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve {
        /// Address to listen on; overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,

        /// Refuse to start without an LLM API key.
        #[arg(long)]
        require_api_key: bool,
    },

    /// Chat about PDFs in the terminal.
    ///
    /// Files are used as given; directories are searched recursively for
    /// `*.pdf`.
    Chat {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Extract and chunk PDFs without embedding or calling the LLM.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print every chunk.
        #[arg(long)]
        show_chunks: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "pdf_qa={0},pdfqa={0},tower_http=info,warn",
            default_level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                config::load_config(&default_path)
            } else {
                Ok(Config::minimal())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut cfg = resolve_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve {
            bind,
            require_api_key,
        } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg, require_api_key).await?;
        }
        Commands::Chat { paths } => {
            chat::run_chat(&cfg, paths).await?;
        }
        Commands::Ingest { paths, show_chunks } => {
            ingest::run_ingest(&cfg, &paths, show_chunks).await?;
        }
    }

    Ok(())
}
