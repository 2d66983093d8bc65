use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use ragent::errors::RagError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::{ask, chat, ingest, search, version};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log progress of every turn (otherwise only warnings, or RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the source PDF, split it and build the persisted index
    Ingest {
        /// PDF to index (defaults to RAG_STORE__DOCUMENT)
        #[arg(short, long)]
        document: Option<PathBuf>,
    },

    /// Query the index directly and print the matching passages
    Search {
        query: String,
    },

    /// Answer one question
    Ask {
        /// The question to ask
        question: Option<String>,

        /// Read the turn input from a JSON file: {"messages": [...]}
        #[arg(short, long, conflicts_with = "question")]
        input: Option<PathBuf>,

        /// Print the resulting conversation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask questions interactively, one turn each
    Chat,

    /// Print the version
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), err);
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest { document } => ingest::execute(document).await,
        Command::Search { query } => search::execute(&query).await,
        Command::Ask {
            question,
            input,
            json,
        } => ask::execute(question, input, json).await,
        Command::Chat => chat::execute().await,
        Command::Version => version::execute().await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Distinct exit statuses so scripts can tell retryable failures apart
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RagError>() {
        Some(RagError::Configuration(_)) => 2,
        Some(RagError::InvalidInput(_)) | Some(RagError::ContextLengthExceeded { .. }) => 3,
        Some(RagError::ServiceUnavailable { .. }) | Some(RagError::Timeout { .. }) => 4,
        Some(RagError::MalformedVerdict(_)) | Some(RagError::MalformedToolCall(_)) => 5,
        Some(RagError::UnboundedRewriteLoop { .. }) => 6,
        None => 1,
    }
}
