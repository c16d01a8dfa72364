use super::*;

const RUST_SOURCE: &str = r#"
/// Adds two numbers together.
/// Wraps on overflow.
fn add(left: i32, right: i32) -> i32 {
    let total = left.wrapping_add(right);
    total
}

struct Account {
    identifier: u64,
    balance_cents: i64,
}
"#;

#[test]
fn rust_functions_and_structs_chunked() {
    let chunks = chunk_file("/repo/src/math.rs", RUST_SOURCE);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].node_type, "function_item");
    assert_eq!(chunks[0].name.as_deref(), Some("add"));
    assert_eq!(chunks[0].language, "rust");
    assert_eq!(chunks[1].node_type, "struct_item");
    assert_eq!(chunks[1].name.as_deref(), Some("Account"));
}

#[test]
fn rust_doc_comments_collected_in_order() {
    let chunks = chunk_file("/repo/src/math.rs", RUST_SOURCE);

    let docstring = chunks[0].docstring.as_deref().expect("function has docs");
    assert!(docstring.starts_with("/// Adds two numbers"));
    assert!(docstring.ends_with("/// Wraps on overflow."));
}

#[test]
fn docstring_requires_adjacency() {
    let source = r#"
// A stray comment far above.


fn standalone(value: u32) -> u32 {
    value.rotate_left(3)
}
"#;
    let chunks = chunk_file("/repo/src/lone.rs", source);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].docstring, None);
}

#[test]
fn typescript_exports_and_declarations() {
    let source = r#"
export function authenticate(token: string): boolean {
    return verify(token);
}

const handler = async (event: Event) => {
    await process(event);
};
"#;
    let chunks = chunk_file("/repo/src/auth.ts", source);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].node_type, "export_statement");
    assert_eq!(chunks[0].name.as_deref(), Some("authenticate"));
    assert_eq!(chunks[1].node_type, "lexical_declaration");
    assert_eq!(chunks[1].name.as_deref(), Some("handler"));
    assert!(chunks.iter().all(|c| c.language == "typescript"));
}

#[test]
fn tsx_normalizes_to_typescript() {
    let source = r#"
export function Banner(props: { title: string }) {
    return <header className="banner">{props.title}</header>;
}
"#;
    let chunks = chunk_file("/repo/src/banner.tsx", source);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].language, "typescript");
    assert_eq!(chunks[0].name.as_deref(), Some("Banner"));
}

#[test]
fn python_body_docstring_extracted() {
    let source = r#"
def authenticate(token):
    """Check a bearer token against the session store."""
    session = lookup(token)
    return session is not None
"#;
    let chunks = chunk_file("/repo/src/auth.py", source);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].node_type, "function_definition");
    assert_eq!(chunks[0].name.as_deref(), Some("authenticate"));
    assert_eq!(
        chunks[0].docstring.as_deref(),
        Some(r#""""Check a bearer token against the session store.""""#)
    );
}

#[test]
fn python_decorated_definition_keeps_name() {
    let source = r#"
@lru_cache(maxsize=32)
def fetch_profile(user_id):
    """Load a profile, memoized."""
    return db.get(user_id)
"#;
    let chunks = chunk_file("/repo/src/profiles.py", source);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].node_type, "decorated_definition");
    assert_eq!(chunks[0].name.as_deref(), Some("fetch_profile"));
    assert!(chunks[0].docstring.as_deref().unwrap().contains("memoized"));
}

#[test]
fn signature_truncated_at_opening_brace() {
    let chunks = chunk_file("/repo/src/math.rs", RUST_SOURCE);

    assert_eq!(
        chunks[0].signature.as_deref(),
        Some("fn add(left: i32, right: i32) -> i32")
    );
}

#[test]
fn multiline_signature_concatenated() {
    let source = r#"
func Transfer(
    from Account,
    to Account,
    amount int64,
) error {
    return ledger.Move(from, to, amount)
}
"#;
    let chunks = chunk_file("/repo/src/ledger.go", source);

    assert_eq!(chunks.len(), 1);
    let signature = chunks[0].signature.as_deref().expect("has signature");
    assert!(signature.starts_with("func Transfer("));
    assert!(!signature.contains('{'));
}

#[test]
fn bom_is_stripped() {
    let source = "\u{feff}fn bom_test(flag: bool) -> bool {\n    !flag && flag != true\n}\n";
    let chunks = chunk_file("/repo/src/bom.rs", source);

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.starts_with("fn bom_test"));
}

#[test]
fn tiny_spans_are_skipped() {
    // Under 50 characters: not semantically substantial.
    let source = "fn a() {\n    1\n}\n";
    let chunks = chunk_file("/repo/src/tiny.rs", source);

    // The traversal finds nothing big enough, so the file falls back.
    assert!(chunks.iter().all(|c| c.node_type == FALLBACK_NODE_TYPE));
}

#[test]
fn oversized_span_splits_into_overlapping_parts() {
    let mut body = String::new();
    for i in 0..200 {
        body.push_str(&format!("    const value{i} = compute({i});\n"));
    }
    let source = format!("function massive(seed: number) {{\n{body}}}\n");

    let chunks = chunk_file("/repo/src/massive.ts", &source);

    assert!(chunks.len() >= 3, "expected >= 3 parts, got {}", chunks.len());
    for (i, part) in chunks.iter().enumerate() {
        assert!(
            part.content.len() <= MAX_CHUNK_CHARS + 200,
            "part {i} too large: {}",
            part.content.len()
        );
        assert_eq!(
            part.name.as_deref(),
            Some(format!("massive (part {})", i + 1).as_str())
        );
        assert!(part.id.ends_with(&format!("_p{i}")));
        if i > 0 {
            // Parts are contiguous with overlap.
            assert!(part.start_line <= chunks[i - 1].end_line + 1);
            assert!(part.start_line > chunks[i - 1].start_line);
            assert_eq!(part.signature, None);
            assert_eq!(part.docstring, None);
        }
    }
    assert!(chunks[0].signature.is_some());
}

#[test]
fn unsupported_extension_uses_line_windows() {
    let lines: Vec<String> = (0..120).map(|i| format!("record {i}")).collect();
    let source = lines.join("\n");

    let chunks = chunk_file("/repo/data/batch.xyz", &source);

    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.node_type == FALLBACK_NODE_TYPE));
    assert!(chunks.iter().all(|c| c.language == "xyz"));
    assert_eq!(chunks[0].start_line, 1);
    assert_eq!(chunks[0].end_line, 50);
    assert_eq!(chunks[1].start_line, 46);
    assert!(chunks[0].id.ends_with("_fallback0"));
    assert!(chunks[2].id.ends_with("_fallback2"));
}

#[test]
fn chunk_ids_stay_in_safe_alphabet() {
    let sources = [
        ("/tmp/My Project/src/a b.ts", "export function weird() {\n    return 'path with spaces';\n}\n"),
        ("/repo/@scope/pkg/índex.py", "def unicode_path():\n    \"\"\"Exercise odd path bytes.\"\"\"\n    return 42\n"),
        ("/repo/notes (draft).xyz", "line one\nline two\nline three\n"),
    ];

    for (path, source) in sources {
        for chunk in chunk_file(path, source) {
            assert!(
                is_valid_chunk_id(&chunk.id),
                "id {:?} escapes the safe alphabet",
                chunk.id
            );
        }
    }
}

#[test]
fn ids_share_the_directory_prefix() {
    let source = "export function scoped(input: string): string {\n    return input.trim();\n}\n";
    let chunks = chunk_file("/repo/src/util/strings.ts", source);

    let prefix = normalize_id_component("/repo/src/util");
    assert!(!chunks.is_empty());
    for chunk in chunks {
        assert!(chunk.id.starts_with(&prefix));
    }
}

#[test]
fn empty_content_yields_nothing() {
    assert!(chunk_file("/repo/src/empty.rs", "").is_empty());
    assert!(chunk_file("/repo/src/empty.xyz", "").is_empty());
}

#[test]
fn size_discipline_holds_for_semantic_chunks() {
    let source = format!(
        "{}\n{}\n",
        RUST_SOURCE,
        "fn third(input: &str) -> usize {\n    input.chars().filter(|c| c.is_alphabetic()).count()\n}"
    );
    let chunks = chunk_file("/repo/src/mixed.rs", &source);

    for chunk in &chunks {
        if chunk.node_type != FALLBACK_NODE_TYPE {
            assert!(chunk.content.len() >= MIN_CHUNK_CHARS);
            assert!(chunk.non_blank_lines() >= MIN_NON_BLANK_LINES);
            assert!(chunk.content.len() <= MAX_CHUNK_CHARS + 200);
        }
        assert!(chunk.start_line <= chunk.end_line);
    }
}
