//! Language table for AST-aware chunking.
//!
//! Maps file extensions to tree-sitter grammars and lists, per language, the
//! node kinds that bound a chunk, carry a symbol name, or hold documentation.

/// Languages with a wired-up tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Go,
    Rust,
}

impl Language {
    /// Resolve a language from a file extension.
    #[inline]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" | "pyw" => Some(Self::Python),
            "go" => Some(Self::Go),
            "rs" => Some(Self::Rust),
            _ => None,
        }
    }

    /// Every extension the indexer should pick up.
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &[
            "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "pyw", "go", "rs",
        ]
    }

    /// Normalized language tag stored on chunks and used by the
    /// bare-extension filter shortcut. TSX and JSX normalize to their base
    /// language.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript | Self::Tsx => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Rust => "rust",
        }
    }

    /// The tree-sitter grammar for this language.
    #[inline]
    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    /// Node kinds that bound a chunk. Traversal does not recurse into a
    /// matched node.
    #[inline]
    pub fn chunk_node_kinds(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript | Self::Tsx => &[
                "function_declaration",
                "method_definition",
                "class_declaration",
                "interface_declaration",
                "type_alias_declaration",
                "enum_declaration",
                "export_statement",
                "lexical_declaration",
                "variable_declaration",
            ],
            Self::JavaScript => &[
                "function_declaration",
                "method_definition",
                "class_declaration",
                "export_statement",
                "lexical_declaration",
                "variable_declaration",
            ],
            Self::Python => &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
            Self::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
            Self::Rust => &[
                "function_item",
                "impl_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "mod_item",
            ],
        }
    }

    /// Node kinds that carry a symbol name.
    #[inline]
    pub fn name_node_kinds(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript | Self::Tsx | Self::JavaScript => {
                &["identifier", "property_identifier", "type_identifier"]
            }
            Self::Python => &["identifier"],
            Self::Go => &["identifier", "field_identifier", "type_identifier"],
            Self::Rust => &["identifier", "type_identifier"],
        }
    }

    /// Node kinds that hold documentation adjacent to a chunk.
    #[inline]
    pub fn doc_node_kinds(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript | Self::Tsx | Self::JavaScript | Self::Go => &["comment"],
            Self::Python => &["string", "comment"],
            Self::Rust => &["line_comment", "block_comment"],
        }
    }
}
