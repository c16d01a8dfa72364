use serde::{Deserialize, Serialize};

/// Node type recorded for line-window chunks produced by the fallback path.
pub const FALLBACK_NODE_TYPE: &str = "fallback_chunk";

/// A semantically bounded span of source code together with its extracted
/// metadata. This is the atomic unit of indexing and search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier derived from the file path and start line.
    pub id: String,
    /// Absolute path of the source file.
    pub file_path: String,
    /// UTF-8 text of the span, BOM stripped.
    pub content: String,
    /// 1-indexed inclusive start line.
    pub start_line: u32,
    /// 1-indexed inclusive end line.
    pub end_line: u32,
    /// Symbol name, when one could be extracted.
    pub name: Option<String>,
    /// AST node type that produced the chunk, or `fallback_chunk`.
    pub node_type: String,
    /// Single-line declaration header, trimmed before the body delimiter.
    pub signature: Option<String>,
    /// Adjacent or leading documentation comment.
    pub docstring: Option<String>,
    /// Normalized language tag (`typescript`, `python`, ...).
    pub language: String,
}

impl Chunk {
    /// Count of lines that contain at least one non-whitespace character.
    #[inline]
    pub fn non_blank_lines(&self) -> usize {
        self.content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count()
    }
}

/// Collapse every character outside `[A-Za-z0-9_-]` to `_`.
///
/// Chunk ids and the path-scope filter predicate both pass through this
/// function, so a prefix filter built from a directory always admits the ids
/// of the chunks under that directory.
#[inline]
pub fn normalize_id_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Id for a whole AST-derived chunk.
#[inline]
pub fn chunk_id(file_path: &str, start_line: u32) -> String {
    format!("{}_L{}", normalize_id_component(file_path), start_line)
}

/// Id for one part of an oversized chunk that was split with overlap.
#[inline]
pub fn part_id(file_path: &str, start_line: u32, part_index: usize) -> String {
    format!("{}_p{}", chunk_id(file_path, start_line), part_index)
}

/// Id for a line-window chunk produced by the fallback path.
#[inline]
pub fn fallback_id(file_path: &str, start_line: u32, window_index: usize) -> String {
    format!("{}_fallback{}", chunk_id(file_path, start_line), window_index)
}

/// Check that an id stays within the alphabet the store predicates assume.
#[inline]
pub fn is_valid_chunk_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
