//! Finds an LLM snippet inside normalized document text.
//!
//! Strategies are tried in a fixed order and the first hit wins:
//! exact substring, the informative tokens alone, all tokens, the first words
//! of a truncated snippet, and finally sliding windows of a few consecutive
//! tokens. Token sequences only ever allow punctuation and spaces in between.

use std::ops::Range;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::text::tokens::{informative_tokens, sequence_regex, word_tokens};
use crate::text::{clean_quote, ends_with_ellipsis, normalize, strip_markdown};

const MAX_INFORMATIVE_TOKENS: usize = 6;
const TRUNCATED_PREFIX_TOKENS: usize = 3;
const WINDOW_TOKENS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Substring,
    InformativeTokens,
    AllTokens,
    TruncatedPrefix,
    SlidingWindow,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::InformativeTokens => "informative-tokens",
            Self::AllTokens => "all-tokens",
            Self::TruncatedPrefix => "truncated-prefix",
            Self::SlidingWindow => "sliding-window",
        }
    }
}

/// Why a snippet could not be anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("empty-snippet")]
    EmptySnippet,
    #[error("not-found")]
    NotFound,
    #[error("crosses-tag")]
    CrossesTag,
}

impl LocateError {
    /// Short machine-readable reason used in the audit log.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::EmptySnippet => "empty-snippet",
            Self::NotFound => "not-found",
            Self::CrossesTag => "crosses-tag",
        }
    }
}

/// A located span in normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanMatch {
    pub strategy: Strategy,
    /// Byte range in the normalized haystack.
    pub range: Range<usize>,
    /// Matched length in chars.
    pub coverage: usize,
}

/// A snippet prepared once and matched against many candidate texts.
#[derive(Debug, Clone)]
pub struct SnippetMatcher {
    normalized: String,
    patterns: Vec<(Strategy, Regex)>,
}

impl SnippetMatcher {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(&strip_markdown(&clean_quote(raw)));
        let tokens = word_tokens(&normalized);
        let mut patterns = Vec::new();

        let informative = informative_tokens(&tokens, MAX_INFORMATIVE_TOKENS);
        if let Some(re) = sequence_regex(&informative) {
            patterns.push((Strategy::InformativeTokens, re));
        }
        if let Some(re) = sequence_regex(&tokens) {
            patterns.push((Strategy::AllTokens, re));
        }
        if ends_with_ellipsis(raw) {
            let prefix = &tokens[..tokens.len().min(TRUNCATED_PREFIX_TOKENS)];
            if let Some(re) = sequence_regex(prefix) {
                patterns.push((Strategy::TruncatedPrefix, re));
            }
        }
        let width = tokens.len().min(WINDOW_TOKENS);
        if width > 0 {
            for window in tokens.windows(width) {
                if let Some(re) = sequence_regex(window) {
                    patterns.push((Strategy::SlidingWindow, re));
                }
            }
        }

        Self {
            normalized,
            patterns,
        }
    }

    /// The snippet in matching form.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// First strategy that matches `haystack`, which must already be normalized.
    pub fn find(&self, haystack: &str) -> Option<SpanMatch> {
        if self.is_empty() || haystack.is_empty() {
            return None;
        }
        if let Some(pos) = haystack.find(&self.normalized) {
            return Some(span_match(
                haystack,
                Strategy::Substring,
                pos..pos + self.normalized.len(),
            ));
        }
        self.patterns.iter().find_map(|(strategy, re)| {
            re.find(haystack)
                .map(|m| span_match(haystack, *strategy, m.range()))
        })
    }
}

fn span_match(haystack: &str, strategy: Strategy, range: Range<usize>) -> SpanMatch {
    SpanMatch {
        strategy,
        coverage: haystack[range.clone()].chars().count(),
        range,
    }
}

/// Locate a raw snippet in normalized text.
pub fn locate(raw_snippet: &str, normalized_haystack: &str) -> Result<SpanMatch, LocateError> {
    let matcher = SnippetMatcher::new(raw_snippet);
    if matcher.is_empty() {
        return Err(LocateError::EmptySnippet);
    }
    matcher
        .find(normalized_haystack)
        .ok_or(LocateError::NotFound)
}
