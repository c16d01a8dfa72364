//! MCP (Model Context Protocol) server surface.
//!
//! JSON-RPC 2.0 over stdio with a single registered tool, `semantic_search`.

pub mod protocol;
pub mod server;
pub mod tools;


pub use protocol::*;
pub use server::{ConnectionState, McpServer, ToolHandler, classify_message};
pub use tools::SemanticSearchHandler;
