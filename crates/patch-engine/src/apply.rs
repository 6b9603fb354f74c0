//! Fragment matching: exact literal first, whitespace-tolerant second.
//!
//! The match order is a fixed contract. A fragment is tried as a literal
//! substring; only when that fails is the search text compiled into a
//! pattern with every whitespace run relaxed to `\s+`. A fragment that
//! matches neither way aborts the whole candidate.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PatchError;

/// One search/replace pair from an AI-authored patch description.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiffFragment {
    pub search: String,
    pub replace: String,
}

/// Apply all fragments to `source`, all-or-nothing. On any miss the input
/// is discarded and the error names the offending fragment.
pub fn apply_fragments(source: &str, fragments: &[DiffFragment]) -> Result<String, PatchError> {
    let mut working = source.to_string();
    for (index, fragment) in fragments.iter().enumerate() {
        working = apply_one(&working, fragment).ok_or(PatchError::NoMatch { index })?;
    }
    Ok(working)
}

fn apply_one(source: &str, fragment: &DiffFragment) -> Option<String> {
    // 1. Literal match.
    if source.contains(&fragment.search) {
        debug!("fragment matched literally");
        return Some(source.replacen(&fragment.search, &fragment.replace, 1));
    }

    // 2. Whitespace-tolerant match.
    let pattern = tolerant_pattern(&fragment.search)?;
    let regex = Regex::new(&pattern).ok()?;
    let m = regex.find(source)?;
    debug!("fragment matched via whitespace-tolerant fallback");
    let mut out = String::with_capacity(source.len());
    out.push_str(&source[..m.start()]);
    out.push_str(&fragment.replace);
    out.push_str(&source[m.end()..]);
    Some(out)
}

/// Escape the search text and collapse each whitespace run into `\s+`.
fn tolerant_pattern(search: &str) -> Option<String> {
    let trimmed = search.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parts: Vec<String> = trimmed.split_whitespace().map(regex::escape).collect();
    Some(parts.join(r"\s+"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match_replaces_once() {
        let source = "fn a() {}\nfn b() {}\nfn a() {}";
        let out = apply_fragments(
            source,
            &[DiffFragment {
                search: "fn a() {}".into(),
                replace: "fn a() { todo() }".into(),
            }],
        )
        .unwrap();
        assert!(out.starts_with("fn a() { todo() }"));
        // Only the first occurrence changes.
        assert!(out.ends_with("fn a() {}"));
    }

    #[test]
    fn whitespace_differences_use_the_tolerant_fallback() {
        let source = "if  ready {\n        launch();\n}";
        let out = apply_fragments(
            source,
            &[DiffFragment {
                search: "if ready { launch(); }".into(),
                replace: "if ready { launch_checked(); }".into(),
            }],
        )
        .unwrap();
        assert!(out.contains("launch_checked()"));
    }

    #[test]
    fn tolerant_fallback_escapes_regex_metacharacters() {
        let source = "let x = items[0].len();";
        let out = apply_fragments(
            source,
            &[DiffFragment {
                search: "items[0].len()".into(),
                replace: "items[0].count()".into(),
            }],
        )
        .unwrap();
        assert!(out.contains("items[0].count()"));
    }

    #[test]
    fn no_match_aborts_with_fragment_index() {
        let source = "unrelated content";
        let err = apply_fragments(
            source,
            &[
                DiffFragment {
                    search: "unrelated".into(),
                    replace: "related".into(),
                },
                DiffFragment {
                    search: "does not exist".into(),
                    replace: "x".into(),
                },
            ],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::NoMatch { index: 1 }));
    }

    #[test]
    fn literal_wins_over_tolerant() {
        // Both could match here; the literal path must be taken first and
        // replace the exact span.
        let source = "a b";
        let out = apply_fragments(
            source,
            &[DiffFragment {
                search: "a b".into(),
                replace: "c".into(),
            }],
        )
        .unwrap();
        assert_eq!(out, "c");
    }

    #[test]
    fn empty_search_cannot_match() {
        let err = apply_fragments(
            "content",
            &[DiffFragment {
                search: "   ".into(),
                replace: "x".into(),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::NoMatch { index: 0 }));
    }
}
