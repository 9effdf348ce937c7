//! # docqa CLI
//!
//! Ask questions about PDF, DOCX, and text documents in a multi-turn
//! conversation, from the terminal or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa chat <FILES>...` | Index files, then chat on stdin |
//! | `docqa ask <FILES>... --question Q` | Index files and answer one question |
//! | `docqa chunks <FILES>...` | Extract and chunk only (no embedding) |
//! | `docqa serve` | Start the HTTP server |
//! | `docqa completions <SHELL>` | Print shell completions |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `docqa=info`).

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docqa::chat;
use docqa::config::{self, DEFAULT_CONFIG_PATH};
use docqa::progress::ProgressMode;
use docqa::server;

/// docqa: conversational question answering over your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: ask questions about your documents in a multi-turn conversation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. If that file does not exist,
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Upload progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index files, then answer questions typed on stdin.
    ///
    /// Type `/history` to show the conversation, `/reset` to clear it,
    /// and `/quit` (or end of input) to exit.
    Chat {
        /// Files to index (.txt, .md, .pdf, .docx).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the retrieved chunks under each answer.
        #[arg(long)]
        sources: bool,
    },

    /// Index files and answer a single question.
    Ask {
        /// Files to index (.txt, .md, .pdf, .docx).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// The question to answer.
        #[arg(long, short)]
        question: String,

        /// Print the retrieved chunks under the answer.
        #[arg(long)]
        sources: bool,
    },

    /// Extract and chunk files without embedding them.
    ///
    /// Prints document, character, and chunk counts for the current
    /// chunking settings.
    Chunks {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print every chunk's text.
        #[arg(long)]
        show: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "docqa=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    // Commands that don't require config
    let command = match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "docqa", &mut std::io::stdout());
            return Ok(());
        }
        other => other,
    };

    let cfg = config::load_or_default(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match command {
        Commands::Chat { files, sources } => {
            chat::run_chat(&cfg, &files, sources, progress).await?;
        }
        Commands::Ask {
            files,
            question,
            sources,
        } => {
            chat::run_ask(&cfg, &files, &question, sources, progress).await?;
        }
        Commands::Chunks { files, show } => {
            chat::run_chunks(&cfg, &files, show)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
