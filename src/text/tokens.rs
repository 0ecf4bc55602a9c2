//! Word tokens and the token-sequence regexes used by the span locator.

use std::sync::LazyLock;

use regex::Regex;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid regex"));

/// All word-like tokens of an already normalized string.
pub fn word_tokens(normalized: &str) -> Vec<&str> {
    WORD.find_iter(normalized).map(|m| m.as_str()).collect()
}

/// Up to `max` of the longest tokens with at least two chars, in their original order.
pub fn informative_tokens<'a>(tokens: &[&'a str], max: usize) -> Vec<&'a str> {
    let mut ranked: Vec<(usize, &str)> = tokens
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, t)| t.chars().count() >= 2)
        .collect();
    ranked.sort_by_key(|(_, t)| std::cmp::Reverse(t.chars().count()));
    ranked.truncate(max);
    ranked.sort_by_key(|(pos, _)| *pos);
    ranked.into_iter().map(|(_, t)| t).collect()
}

/// Build a regex matching `tokens` in order, each on word boundaries and
/// separated only by non-alphanumeric runs (spaces, punctuation).
pub fn sequence_regex(tokens: &[&str]) -> Option<Regex> {
    if tokens.is_empty() {
        return None;
    }
    let body = tokens
        .iter()
        .map(|t| format!(r"\b{}\b", regex::escape(t)))
        .collect::<Vec<_>>()
        .join(r"[^\p{L}\p{N}]+");
    Regex::new(&body).ok()
}
