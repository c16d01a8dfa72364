//! The `semantic_search` tool.
//!
//! Validates tool-call arguments, drives the search engine, and shapes the
//! response rows. Every failure becomes a tool-call error response with a
//! stable textual message rather than a protocol-level error.

use crate::mcp::protocol::{CallToolParams, CallToolResult, Tool, ToolContent};
use crate::mcp::server::ToolHandler;
use crate::search::{
    DEFAULT_CANDIDATE_MULTIPLIER, DEFAULT_LIMIT, MAX_CANDIDATE_MULTIPLIER, MAX_LIMIT,
    SearchEngine, SearchRequest,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

pub struct SemanticSearchHandler {
    engine: Arc<SearchEngine>,
}

impl SemanticSearchHandler {
    #[inline]
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self { engine }
    }

    /// The tool definition advertised via `tools/list`.
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "semantic_search".to_string(),
            description: Some(
                "Search the indexed repository for code spans relevant to a natural-language query"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural-language search query"
                    },
                    "path": {
                        "type": "string",
                        "description": "Optional: restrict results to a directory under the indexed root"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "description": "Maximum number of results (default: 10)"
                    },
                    "file_pattern": {
                        "type": "string",
                        "description": "Optional: glob filter such as '*.ts' or '**/tests/*.py'"
                    },
                    "use_reranking": {
                        "type": "boolean",
                        "description": "Apply cross-encoder reranking to the candidates (default: true)"
                    },
                    "candidate_multiplier": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_CANDIDATE_MULTIPLIER,
                        "description": "Over-recall factor applied before reranking (default: 5)"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SemanticSearchHandler {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let request = match parse_search_arguments(&args) {
            Ok(request) => request,
            Err(e) => {
                return Ok(error_result(format!("Invalid arguments: {e}")));
            }
        };

        debug!(
            "semantic_search: query={:?} limit={} path={:?} pattern={:?}",
            request.query, request.limit, request.path, request.file_pattern
        );

        match self.engine.search(&request).await {
            Ok(hits) => {
                let results: Vec<Value> = hits
                    .iter()
                    .map(|hit| {
                        json!({
                            "file": hit.chunk.file_path,
                            "startLine": hit.chunk.start_line,
                            "endLine": hit.chunk.end_line,
                            "name": hit.chunk.name,
                            "nodeType": hit.chunk.node_type,
                            "score": hit.combined_score,
                            "content": hit.chunk.content,
                            "signature": hit.chunk.signature,
                        })
                    })
                    .collect();

                let response = json!({
                    "results": results,
                    "totalResults": results.len(),
                    "query": request.query,
                });

                Ok(CallToolResult {
                    content: vec![ToolContent::Text {
                        text: serde_json::to_string_pretty(&response)?,
                    }],
                    is_error: Some(false),
                })
            }
            Err(e) => {
                error!("semantic_search failed: {e}");
                Ok(error_result(format!("Search failed: {e}")))
            }
        }
    }
}

/// Validate and normalize tool-call arguments into a [`SearchRequest`].
pub(crate) fn parse_search_arguments(
    args: &HashMap<String, Value>,
) -> Result<SearchRequest> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| anyhow!("missing required parameter: query"))?
        .to_string();

    let limit = args
        .get("limit")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_LIMIT as i64)
        .clamp(1, MAX_LIMIT as i64) as usize;

    let candidate_multiplier = args
        .get("candidate_multiplier")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_CANDIDATE_MULTIPLIER as i64)
        .clamp(1, MAX_CANDIDATE_MULTIPLIER as i64) as usize;

    let path = args
        .get("path")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let file_pattern = args
        .get("file_pattern")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let use_reranking = args
        .get("use_reranking")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    Ok(SearchRequest {
        query,
        limit,
        path,
        file_pattern,
        use_reranking,
        candidate_multiplier,
    })
}

fn error_result(message: String) -> CallToolResult {
    CallToolResult {
        content: vec![ToolContent::Text { text: message }],
        is_error: Some(true),
    }
}
