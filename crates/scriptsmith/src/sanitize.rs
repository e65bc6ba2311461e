//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Requirements are free text typed by users and archive names are local
//! paths; spans only ever carry shortened or redacted forms of either.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Longest requirement prefix recorded in a span field.
pub const SPAN_TEXT_CHARS: usize = 48;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo and query string from an endpoint URL.
///
/// - `https://key@api.example.com/v1?token=x` → `https://****@api.example.com/v1`
/// - `https://api.example.com/v1` → unchanged
pub fn redact_endpoint(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &without_query[..scheme_end + 3];
            return format!("{}****@{}", scheme, &after_scheme[at_pos + 1..]);
        }
    }

    without_query.to_string()
}

/// First [`SPAN_TEXT_CHARS`] characters of `text` on one line, with an
/// ellipsis when shortened.
pub fn truncate_for_span(text: &str) -> String {
    let single_line: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let trimmed = single_line.trim();

    match trimmed.char_indices().nth(SPAN_TEXT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Short deterministic hash for correlating text across log lines without
/// recording it.
pub fn hash_text(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
