// Matching-span extraction for free-text search. The structured
// content document is a JSON value; only its string-valued fields are
// scanned, depth-bounded against adversarial nesting.

use serde_json::Value;

use crate::models::Post;

/// Characters of context kept on each side of the first match.
const SPAN_RADIUS: usize = 50;

/// Maximum nesting depth scanned inside the content document.
const MAX_SCAN_DEPTH: usize = 16;

/// Locate `query` in a post and return the context window around the
/// first case-insensitive occurrence, checked in priority order:
/// title, then summary, then a recursive scan of string fields in the
/// structured content. Returns `None` when no field matches.
pub fn match_span(post: &Post, query: &str) -> Option<String> {
    if query.is_empty() {
        return None;
    }

    if let Some(span) = window(&post.title, query) {
        return Some(span);
    }
    if let Some(span) = post.summary.as_deref().and_then(|text| window(text, query)) {
        return Some(span);
    }
    post.content
        .as_ref()
        .and_then(|value| scan_value(value, query, 0))
}

fn scan_value(value: &Value, query: &str, depth: usize) -> Option<String> {
    if depth > MAX_SCAN_DEPTH {
        return None;
    }
    match value {
        Value::String(text) => window(text, query),
        Value::Array(items) => items
            .iter()
            .find_map(|item| scan_value(item, query, depth + 1)),
        Value::Object(fields) => fields
            .values()
            .find_map(|field| scan_value(field, query, depth + 1)),
        _ => None,
    }
}

/// The ±SPAN_RADIUS-character window around the first occurrence of
/// `query` in `text`, or `None` when the text does not contain it.
fn window(text: &str, query: &str) -> Option<String> {
    let start = find_ignore_case(text, query)?;

    let prefix_start = text[..start]
        .char_indices()
        .rev()
        .take(SPAN_RADIUS)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);

    let match_chars = query.chars().count();
    let suffix_end = text[start..]
        .char_indices()
        .nth(match_chars + SPAN_RADIUS)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len());

    Some(text[prefix_start..suffix_end].to_string())
}

/// Byte offset of the first case-insensitive occurrence of `needle` in
/// `haystack`. Case folding is done per character on both sides, so
/// the offset always refers to the original haystack.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return Some(0);
    }

    for (offset, _) in haystack.char_indices() {
        let mut candidate = haystack[offset..].chars().flat_map(char::to_lowercase);
        if needle.iter().all(|&n| candidate.next() == Some(n)) {
            return Some(offset);
        }
    }
    None
}
