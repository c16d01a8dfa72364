use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Path escapes the indexed root: {0}")]
    PathTraversal(String),

    #[error("Malformed chunk id: {0}")]
    InvalidId(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunker;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod mcp;
pub mod search;
pub mod store;
pub mod watcher;
