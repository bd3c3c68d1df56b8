//! RagChat CLI - Command-line interface
//!
//! Usage:
//!   ragchat index [DIR]
//!   ragchat search <query> [-k N]
//!   ragchat ask <question> [--no-rag] [--conversation ID]
//!   ragchat chat
//!   ragchat conversations
//!   ragchat history <id>

mod commands;
mod state;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ragchat_core::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Chat with a local language model grounded on your documents")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from a directory of documents
    Index {
        /// Documents directory (defaults to the configured one)
        dir: Option<PathBuf>,
    },
    /// Show the chunks most similar to a query
    Search {
        /// Query text
        query: String,
        /// Number of results
        #[arg(short)]
        k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a single question
    Ask {
        /// Question to ask
        question: String,
        /// Answer without retrieved context
        #[arg(long)]
        no_rag: bool,
        /// Continue a stored conversation
        #[arg(long)]
        conversation: Option<i64>,
        /// List the retrieved sources after the answer
        #[arg(long)]
        sources: bool,
    },
    /// Start an interactive conversation
    Chat {
        /// Conversation title
        #[arg(long)]
        title: Option<String>,
        /// Answer without retrieved context
        #[arg(long)]
        no_rag: bool,
    },
    /// List stored conversations
    Conversations,
    /// Show the turns of a conversation
    History {
        /// Conversation ID
        id: i64,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ragchat={}", logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging);

    let state = AppState::new(config)?;

    match cli.command {
        Commands::Index { dir } => commands::index(&state, dir).await,
        Commands::Search { query, k, json } => commands::search(&state, &query, k, json).await,
        Commands::Ask {
            question,
            no_rag,
            conversation,
            sources,
        } => commands::ask(&state, &question, no_rag, conversation, sources).await,
        Commands::Chat { title, no_rag } => commands::chat(&state, title, no_rag).await,
        Commands::Conversations => commands::conversations(&state).await,
        Commands::History { id } => commands::history(&state, id).await,
    }
}
