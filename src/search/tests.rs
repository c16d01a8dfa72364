use super::*;
use crate::chunker::Chunk;

fn chunk_with(name: Option<&str>, signature: Option<&str>, content: &str) -> Chunk {
    Chunk {
        id: "test_chunk_L1".to_string(),
        file_path: "/repo/src/test.ts".to_string(),
        content: content.to_string(),
        start_line: 1,
        end_line: 10,
        name: name.map(str::to_string),
        node_type: "function_declaration".to_string(),
        signature: signature.map(str::to_string),
        docstring: None,
        language: "typescript".to_string(),
    }
}

#[test]
fn tokenize_lowercases_and_splits_on_punctuation() {
    assert_eq!(tokenize("JWT Authentication!"), vec!["jwt", "authentication"]);
    assert_eq!(tokenize("parse_config file"), vec!["parse_config", "file"]);
    assert!(tokenize("  ...  ").is_empty());
}

#[test]
fn boost_rewards_name_token_match_most() {
    let keywords = tokenize("authenticate");

    let exact_name = chunk_with(
        Some("authenticate"),
        Some("function authenticate(jwt: string)"),
        "function authenticate(jwt) { return verify(jwt); }",
    );
    // Name substring + whole-token + signature + content.
    let boost = keyword_boost(&exact_name, &keywords);
    assert!((boost - 0.70).abs() < 1e-6);

    let content_only = chunk_with(None, None, "calls authenticate() somewhere");
    let boost = keyword_boost(&content_only, &keywords);
    assert!((boost - 0.10).abs() < 1e-6);
}

#[test]
fn boost_is_zero_without_matches() {
    let chunk = chunk_with(Some("render"), None, "function render() {}");
    assert_eq!(keyword_boost(&chunk, &tokenize("database migration")), 0.0);
    assert_eq!(keyword_boost(&chunk, &[]), 0.0);
}

#[test]
fn boost_accumulates_across_keywords() {
    let chunk = chunk_with(
        Some("parseConfig"),
        Some("function parseConfig(path: string)"),
        "function parseConfig(path) { return readFile(path); }",
    );
    let single = keyword_boost(&chunk, &tokenize("parseconfig"));
    let double = keyword_boost(&chunk, &tokenize("parseconfig path"));
    assert!(double > single);
}

#[test]
fn scope_resolution_keeps_descendants() {
    let root = Path::new("/repo");

    let resolved = resolve_scope(root, "src/auth").expect("descendant resolves");
    assert_eq!(resolved, PathBuf::from("/repo/src/auth"));

    let resolved = resolve_scope(root, "/repo/src").expect("absolute descendant resolves");
    assert_eq!(resolved, PathBuf::from("/repo/src"));

    let resolved = resolve_scope(root, "./src/../src/auth").expect("dotted path resolves");
    assert_eq!(resolved, PathBuf::from("/repo/src/auth"));
}

#[test]
fn scope_resolution_rejects_escapes() {
    let root = Path::new("/repo");

    assert!(matches!(
        resolve_scope(root, "../secrets"),
        Err(SearchError::PathTraversal(_))
    ));
    assert!(matches!(
        resolve_scope(root, "/etc/passwd"),
        Err(SearchError::PathTraversal(_))
    ));
    assert!(matches!(
        resolve_scope(root, "src/../../outside"),
        Err(SearchError::PathTraversal(_))
    ));
}

#[test]
fn passage_truncation_respects_char_boundaries() {
    let short = "short passage";
    assert_eq!(truncate_passage(short), short);

    let long = "é".repeat(600);
    let truncated = truncate_passage(&long);
    assert!(truncated.len() <= 512);
    assert!(truncated.chars().all(|c| c == 'é'));
}

#[test]
fn default_request_matches_tool_defaults() {
    let request = SearchRequest::default();
    assert_eq!(request.limit, DEFAULT_LIMIT);
    assert_eq!(request.candidate_multiplier, DEFAULT_CANDIDATE_MULTIPLIER);
    assert!(request.use_reranking);
    assert_eq!(request.path, None);
    assert_eq!(request.file_pattern, None);
}
