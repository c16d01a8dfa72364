//! AST-aware chunker.
//!
//! Converts `(file_path, content)` into an ordered sequence of [`Chunk`]s
//! using per-language tree-sitter grammars, with a line-window fallback when
//! parsing is unavailable or yields nothing.

pub mod chunk;
pub mod language;

#[cfg(test)]
mod tests;

pub use chunk::{
    Chunk, FALLBACK_NODE_TYPE, chunk_id, fallback_id, is_valid_chunk_id, normalize_id_component,
    part_id,
};
pub use language::Language;

use std::path::Path;
use tree_sitter::{Node, Parser};
use tracing::{debug, warn};

/// Spans smaller than this are not semantically substantial.
pub const MIN_CHUNK_CHARS: usize = 50;
/// Spans with fewer non-blank lines than this are skipped.
pub const MIN_NON_BLANK_LINES: usize = 2;
/// Spans larger than this are split into overlapping parts.
pub const MAX_CHUNK_CHARS: usize = 2000;
/// Target size of each split part.
pub const SPLIT_TARGET_CHARS: usize = 1500;
/// Fraction of a part's lines repeated at the start of the next part.
pub const SPLIT_OVERLAP_RATIO: f64 = 0.15;
/// Window size for line-based fallback chunking.
pub const FALLBACK_WINDOW_LINES: usize = 50;
/// Overlap between consecutive fallback windows.
pub const FALLBACK_OVERLAP_LINES: usize = 5;
/// Hard cap on AST traversal depth.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

struct ChunkContext<'a> {
    file_path: &'a str,
    source: &'a str,
    language: Language,
}

/// Chunk a file's content.
///
/// Falls back to line-window chunking when the extension is not recognized,
/// the grammar fails to parse, or the traversal finds no semantic spans.
#[inline]
pub fn chunk_file(file_path: &str, content: &str) -> Vec<Chunk> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.is_empty() {
        return Vec::new();
    }

    let extension = Path::new(file_path).extension().and_then(|e| e.to_str());
    let Some(language) = extension.and_then(Language::from_extension) else {
        return fallback_chunks(file_path, content);
    };

    let mut parser = Parser::new();
    if parser.set_language(&language.grammar()).is_err() {
        warn!(
            "grammar for {} failed to load, using line-based chunking for {}",
            language.name(),
            file_path
        );
        return fallback_chunks(file_path, content);
    }

    let Some(tree) = parser.parse(content, None) else {
        warn!("failed to parse {file_path}, using line-based chunking");
        return fallback_chunks(file_path, content);
    };

    let ctx = ChunkContext {
        file_path,
        source: content,
        language,
    };

    let mut chunks = Vec::new();
    let root = tree.root_node();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        collect_chunks(child, 1, &ctx, &mut chunks);
    }

    if chunks.is_empty() {
        warn!("no semantic chunks in {file_path}, using line-based chunking");
        return fallback_chunks(file_path, content);
    }

    debug!("chunked {} into {} spans", file_path, chunks.len());
    chunks
}

fn collect_chunks(node: Node, depth: usize, ctx: &ChunkContext, out: &mut Vec<Chunk>) {
    if depth > MAX_TRAVERSAL_DEPTH {
        warn!(
            "traversal depth cap reached in {} at line {}",
            ctx.file_path,
            node.start_position().row + 1
        );
        return;
    }

    if ctx.language.chunk_node_kinds().contains(&node.kind()) {
        build_chunks_for_node(&node, ctx, out);
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_chunks(child, depth + 1, ctx, out);
    }
}

fn build_chunks_for_node(node: &Node, ctx: &ChunkContext, out: &mut Vec<Chunk>) {
    let content = &ctx.source[node.byte_range()];
    if content.len() < MIN_CHUNK_CHARS || non_blank_lines(content) < MIN_NON_BLANK_LINES {
        return;
    }

    let start_line = node.start_position().row as u32 + 1;
    let end_line = node.end_position().row as u32 + 1;
    let name = extract_name(node, ctx);
    let signature = extract_signature(content);
    let docstring = extract_docstring(node, ctx);

    if content.len() <= MAX_CHUNK_CHARS {
        out.push(Chunk {
            id: chunk_id(ctx.file_path, start_line),
            file_path: ctx.file_path.to_string(),
            content: content.to_string(),
            start_line,
            end_line,
            name,
            node_type: node.kind().to_string(),
            signature,
            docstring,
            language: ctx.language.name().to_string(),
        });
        return;
    }

    split_oversized(
        content,
        start_line,
        node.kind(),
        name.as_deref(),
        signature,
        docstring,
        ctx,
        out,
    );
}

/// Split an oversized span into overlapping parts of roughly
/// [`SPLIT_TARGET_CHARS`] characters. Only the first part carries the
/// signature and docstring.
#[expect(clippy::too_many_arguments, reason = "split inherits full chunk metadata")]
fn split_oversized(
    content: &str,
    start_line: u32,
    node_type: &str,
    name: Option<&str>,
    signature: Option<String>,
    docstring: Option<String>,
    ctx: &ChunkContext,
    out: &mut Vec<Chunk>,
) {
    let lines: Vec<&str> = content.lines().collect();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0usize;

    while start < lines.len() {
        let mut end = start;
        let mut size = 0usize;
        while end < lines.len() && size < SPLIT_TARGET_CHARS {
            size += lines[end].len() + 1;
            end += 1;
        }
        ranges.push((start, end));
        if end >= lines.len() {
            break;
        }
        let overlap = (((end - start) as f64) * SPLIT_OVERLAP_RATIO).ceil() as usize;
        start = end.saturating_sub(overlap.max(1));
    }

    // A trailing sliver below the minimum threshold folds into the prior part.
    if ranges.len() > 1 {
        let (last_start, last_end) = ranges[ranges.len() - 1];
        let tail_len: usize = lines[last_start..last_end]
            .iter()
            .map(|l| l.len() + 1)
            .sum();
        if tail_len < MIN_CHUNK_CHARS {
            ranges.pop();
            let idx = ranges.len() - 1;
            ranges[idx].1 = last_end;
        }
    }

    for (part_index, (line_start, line_end)) in ranges.iter().copied().enumerate() {
        let part_content = lines[line_start..line_end].join("\n");
        out.push(Chunk {
            id: part_id(ctx.file_path, start_line, part_index),
            file_path: ctx.file_path.to_string(),
            content: part_content,
            start_line: start_line + line_start as u32,
            end_line: start_line + line_end as u32 - 1,
            name: name.map(|n| format!("{n} (part {})", part_index + 1)),
            node_type: node_type.to_string(),
            signature: if part_index == 0 {
                signature.clone()
            } else {
                None
            },
            docstring: if part_index == 0 {
                docstring.clone()
            } else {
                None
            },
            language: ctx.language.name().to_string(),
        });
    }
}

/// Line-window fallback chunking: 50-line windows with 5 lines of overlap,
/// skipping windows with no visible content.
#[inline]
pub fn fallback_chunks(file_path: &str, content: &str) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let language = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    let step = FALLBACK_WINDOW_LINES - FALLBACK_OVERLAP_LINES;
    let mut chunks = Vec::new();
    let mut window_index = 0usize;
    let mut start = 0usize;

    while start < lines.len() {
        let end = (start + FALLBACK_WINDOW_LINES).min(lines.len());
        let window = lines[start..end].join("\n");
        if !window.trim().is_empty() {
            chunks.push(Chunk {
                id: fallback_id(file_path, start as u32 + 1, window_index),
                file_path: file_path.to_string(),
                content: window,
                start_line: start as u32 + 1,
                end_line: end as u32,
                name: None,
                node_type: FALLBACK_NODE_TYPE.to_string(),
                signature: None,
                docstring: None,
                language: language.clone(),
            });
            window_index += 1;
        }
        if end >= lines.len() {
            break;
        }
        start += step;
    }

    chunks
}

fn non_blank_lines(content: &str) -> usize {
    content.lines().filter(|l| !l.trim().is_empty()).count()
}

fn extract_name(node: &Node, ctx: &ChunkContext) -> Option<String> {
    match node.kind() {
        // const/let/var: the name lives on the declarator.
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let declarator = node
                .children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")?;
            shallow_name(&declarator, ctx)
        }
        // Export wrappers: recurse one level into the exported declaration.
        "export_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if ctx.language.chunk_node_kinds().contains(&child.kind()) {
                    if let Some(name) = extract_name(&child, ctx) {
                        return Some(name);
                    }
                }
            }
            None
        }
        "decorated_definition" => {
            let inner = node.child_by_field_name("definition")?;
            shallow_name(&inner, ctx)
        }
        // Go groups type declarations under type_spec.
        "type_declaration" => {
            let mut cursor = node.walk();
            let spec = node
                .children(&mut cursor)
                .find(|c| c.kind() == "type_spec")?;
            shallow_name(&spec, ctx)
        }
        _ => shallow_name(node, ctx),
    }
}

fn shallow_name(node: &Node, ctx: &ChunkContext) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        return Some(ctx.source[name_node.byte_range()].to_string());
    }

    let kinds = ctx.language.name_node_kinds();
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|child| kinds.contains(&child.kind()))
        .map(|child| ctx.source[child.byte_range()].to_string())
}

/// First line of the declaration; when it holds neither `{` nor `:`, up to
/// four continuation lines are appended until one does. Truncated at `{`.
fn extract_signature(content: &str) -> Option<String> {
    let mut lines = content.lines();
    let mut signature = lines.next()?.trim().to_string();

    if !signature.contains('{') && !signature.contains(':') {
        for line in lines.take(4) {
            signature.push(' ');
            signature.push_str(line.trim());
            if signature.contains('{') || signature.contains(':') {
                break;
            }
        }
    }

    if let Some(pos) = signature.find('{') {
        signature.truncate(pos);
    }

    let signature = signature.trim();
    if signature.is_empty() {
        None
    } else {
        Some(signature.to_string())
    }
}

fn extract_docstring(node: &Node, ctx: &ChunkContext) -> Option<String> {
    if ctx.language == Language::Python {
        if let Some(doc) = python_body_docstring(node, ctx) {
            return Some(doc);
        }
    }

    let doc_kinds = ctx.language.doc_node_kinds();
    let mut pieces: Vec<String> = Vec::new();
    let mut boundary_row = node.start_position().row;
    let mut sibling = node.prev_sibling();

    while let Some(prev) = sibling {
        if !doc_kinds.contains(&prev.kind()) {
            break;
        }
        // A blank gap between comment and declaration breaks adjacency.
        if prev.end_position().row + 1 < boundary_row {
            break;
        }
        boundary_row = prev.start_position().row;
        pieces.push(ctx.source[prev.byte_range()].to_string());
        sibling = prev.prev_sibling();
    }

    if pieces.is_empty() {
        return None;
    }
    pieces.reverse();
    Some(pieces.join("\n"))
}

fn python_body_docstring(node: &Node, ctx: &ChunkContext) -> Option<String> {
    let target = if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")?
    } else {
        *node
    };
    if !matches!(target.kind(), "function_definition" | "class_definition") {
        return None;
    }
    let body = target.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    Some(ctx.source[expr.byte_range()].to_string())
}
