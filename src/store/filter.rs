//! Safe filter builder for user-supplied directory and glob filters.
//!
//! The store's query dialect permits string interpolation, so every
//! interpolated token is collapsed to a closed alphabet and re-validated
//! against a whitelist before it reaches a predicate. Collapsing to `_` is
//! preferred over blacklisting because it stays closed against novel
//! injection vectors.

use crate::chunker::{Language, normalize_id_component};
use crate::{Result, SearchError};

/// Upper bound on the final predicate length.
const MAX_PREDICATE_LEN: usize = 500;

/// User-supplied search scope: a directory prefix and/or a file glob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Directory scope; becomes a prefix match on chunk ids.
    pub path: Option<String>,
    /// Glob such as `*.ts` or `**/tests/*.py`.
    pub file_pattern: Option<String>,
}

impl SearchFilter {
    #[inline]
    pub fn new(path: Option<String>, file_pattern: Option<String>) -> Self {
        Self { path, file_pattern }
    }

    /// Build the store predicate, or `None` when no filter applies.
    #[inline]
    pub fn build(&self) -> Result<Option<String>> {
        let mut clauses: Vec<String> = Vec::new();

        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            let token = normalize_id_component(path);
            validate_token(&token)?;
            clauses.push(format!("id LIKE '{token}%'"));
        }

        if let Some(pattern) = self.file_pattern.as_deref().filter(|p| !p.is_empty()) {
            if let Some(language) = bare_extension_language(pattern) {
                // Exact and cheaper than a suffix match, and avoids
                // `x.ts.bak` matching `*.ts`.
                clauses.push(format!("language = '{language}'"));
            } else {
                let token = glob_to_like(pattern);
                validate_token(&token)?;
                clauses.push(format!("id LIKE '%{token}'"));
            }
        }

        if clauses.is_empty() {
            return Ok(None);
        }

        let predicate = clauses.join(" AND ");
        if predicate.len() > MAX_PREDICATE_LEN {
            return Err(SearchError::InvalidFilter(format!(
                "predicate exceeds {MAX_PREDICATE_LEN} characters"
            )));
        }
        Ok(Some(predicate))
    }
}

/// `*.<ext>` globs map to a language equality when the extension is known.
fn bare_extension_language(pattern: &str) -> Option<&'static str> {
    let ext = pattern.strip_prefix("*.")?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }
    Language::from_extension(ext).map(|l| l.name())
}

/// Convert glob wildcards to LIKE wildcards, then collapse everything else
/// to the safe alphabet.
fn glob_to_like(pattern: &str) -> String {
    pattern
        .replace("**", "%")
        .replace('*', "%")
        .replace('?', "_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '%') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn validate_token(token: &str) -> Result<()> {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '%'));
    if safe {
        Ok(())
    } else {
        Err(SearchError::InvalidFilter(format!(
            "token failed the whitelist after sanitization: {token:?}"
        )))
    }
}
