mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use memvault::config::MemvaultConfig;
use memvault::memory::{MemoryType, SearchMode, SearchQuery};

#[derive(Parser)]
#[command(name = "memvault", version, about = "Durable, searchable memory for coding sessions")]
struct Cli {
    /// Project whose store to use (defaults to `storage.default_project`)
    #[arg(short, long, global = true)]
    project: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save a memory and print its ID
    Remember {
        title: String,
        content: String,
        #[arg(short = 't', long = "type", default_value = "observation")]
        memory_type: MemoryType,
        /// Repeat for several tags
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Reuse an ID to replace that memory
        #[arg(long)]
        id: Option<String>,
    },
    /// Search memories
    Search {
        query: String,
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(short = 't', long = "type")]
        memory_type: Option<MemoryType>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show memories created around an anchor memory
    Timeline {
        anchor: String,
        #[arg(short, long, default_value_t = 3)]
        radius: usize,
    },
    /// Print full details for one or more memories
    Show {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Permanently delete a memory
    Forget { id: String },
    /// Display memory statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Run database diagnostics
    Doctor,
    /// Export all memories as JSON to stdout
    Export,
    /// Import memories from a JSON export
    Import { file: PathBuf },
    /// Rebuild the vector index from stored memories
    Reindex,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = MemvaultConfig::load()?;

    // Log to stderr so stdout stays clean for export and scripting.
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let project = cli.project.as_deref();

    match cli.command {
        Command::Remember {
            title,
            content,
            memory_type,
            tags,
            id,
        } => {
            let args = cli::remember::RememberArgs {
                memory_type,
                title,
                content,
                tags,
                id,
            };
            cli::remember::remember(&config, project, args)?;
        }
        Command::Search {
            query,
            mode,
            memory_type,
            limit,
        } => {
            let query = SearchQuery {
                query,
                mode,
                memory_type,
                limit,
            };
            cli::search::search(&config, project, &query)?;
        }
        Command::Timeline { anchor, radius } => {
            cli::timeline::timeline(&config, project, &anchor, radius)?;
        }
        Command::Show { ids } => cli::show::show(&config, project, &ids)?,
        Command::Forget { id } => cli::forget::forget(&config, project, &id)?,
        Command::Stats { json } => cli::stats::stats(&config, project, json)?,
        Command::Doctor => cli::doctor::doctor(&config, project)?,
        Command::Export => cli::export::export(&config, project)?,
        Command::Import { file } => cli::import::import(&config, project, &file).await?,
        Command::Reindex => cli::reindex::reindex(&config, project).await?,
    }

    Ok(())
}
