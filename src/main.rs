use clap::{Parser, Subcommand};
use semantic_code_mcp::Result;
use semantic_code_mcp::commands::{clear_index, run_index, run_search, serve_mcp, show_status};
use semantic_code_mcp::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "semantic-code-mcp")]
#[command(about = "Semantic code search over MCP with AST-aware chunking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio
    Serve {
        /// Repository root (defaults to SEMANTIC_CODE_ROOT, then cwd)
        root: Option<PathBuf>,
    },
    /// Index the repository
    Index {
        /// Repository root (defaults to SEMANTIC_CODE_ROOT, then cwd)
        root: Option<PathBuf>,
    },
    /// Run a one-shot query against the index
    Search {
        /// Natural-language query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Repository root (defaults to SEMANTIC_CODE_ROOT, then cwd)
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Show store and model endpoint health
    Status {
        /// Repository root (defaults to SEMANTIC_CODE_ROOT, then cwd)
        root: Option<PathBuf>,
    },
    /// Drop the index
    Clear {
        /// Repository root (defaults to SEMANTIC_CODE_ROOT, then cwd)
        root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout belongs to the MCP protocol stream.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { root } => {
            serve_mcp(Config::resolve(root)?).await?;
        }
        Commands::Index { root } => {
            run_index(Config::resolve(root)?).await?;
        }
        Commands::Search { query, limit, root } => {
            run_search(Config::resolve(root)?, query, limit).await?;
        }
        Commands::Status { root } => {
            show_status(Config::resolve(root)?).await?;
        }
        Commands::Clear { root } => {
            clear_index(Config::resolve(root)?).await?;
        }
    }

    Ok(())
}
