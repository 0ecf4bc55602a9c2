//! Plain-text view of an HTML fragment with a path back to source bytes.
//!
//! Each plain char records the source byte span it came from: one char of a
//! text run, or a whole character reference. Block-level tag boundaries insert
//! a synthetic space with no source bytes so that words of adjacent cells or
//! paragraphs never fuse. The normalized view is derived from the plain text
//! with provenance, so a match in normalized text projects to source bytes
//! without any index-parallel assumption.

use std::ops::Range;

use super::markup::{is_block, Markup, MarkupError, TokenKind};
use crate::text::{entities, normalize_mapped, MappedText};

#[derive(Debug, Clone, Copy)]
struct PlainChar {
    c: char,
    /// Text token the char belongs to; `None` for synthetic separators.
    token: Option<usize>,
    start: usize,
    end: usize,
}

/// A contiguous piece of one text token covered by a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub token: usize,
    pub bytes: Range<usize>,
}

/// Result of mapping a normalized range back to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Char range in the plain text.
    pub plain: Range<usize>,
    /// Source byte range from the first to the last covered byte.
    pub bytes: Range<usize>,
    pub pieces: Vec<Piece>,
}

#[derive(Debug, Clone)]
pub struct PlainIndex {
    plain: String,
    chars: Vec<PlainChar>,
    normalized: MappedText,
}

impl PlainIndex {
    pub fn from_html(html: &str) -> Result<Self, MarkupError> {
        Ok(Self::build(&Markup::parse(html)?))
    }

    pub fn build(markup: &Markup<'_>) -> Self {
        let source = markup.source();
        let mut chars: Vec<PlainChar> = Vec::new();

        for (ti, tok) in markup.tokens().iter().enumerate() {
            match &tok.kind {
                TokenKind::Text => push_text(&mut chars, ti, tok.span.clone(), source),
                TokenKind::StartTag { name, .. } | TokenKind::EndTag { name } if is_block(name) => {
                    let needs_break = chars.last().is_some_and(|last| !last.c.is_whitespace());
                    if needs_break {
                        chars.push(PlainChar {
                            c: ' ',
                            token: None,
                            start: tok.span.start,
                            end: tok.span.start,
                        });
                    }
                }
                _ => {}
            }
        }
        // a separator only ever stands between two pieces of text
        while chars.last().is_some_and(|last| last.token.is_none()) {
            chars.pop();
        }

        let plain: String = chars.iter().map(|p| p.c).collect();
        let normalized = normalize_mapped(&MappedText::identity(&plain));
        Self {
            plain,
            chars,
            normalized,
        }
    }

    /// Decoded text with block separators, before normalization.
    pub fn plain(&self) -> &str {
        &self.plain
    }

    /// Matching form of [`plain`](Self::plain).
    pub fn normalized(&self) -> &str {
        self.normalized.as_str()
    }

    /// Map a byte range of the normalized text to source pieces.
    ///
    /// Leading and trailing whitespace and separators are not part of the result.
    pub fn project(&self, normalized: Range<usize>) -> Option<Projection> {
        let src = self.normalized.source_range(normalized)?;
        let mut start = src.start;
        let mut end = src.end.min(self.chars.len());
        while start < end && self.is_gap(start) {
            start += 1;
        }
        while end > start && self.is_gap(end - 1) {
            end -= 1;
        }
        if start == end {
            return None;
        }

        let mut pieces: Vec<Piece> = Vec::new();
        for ch in &self.chars[start..end] {
            let Some(token) = ch.token else { continue };
            match pieces.last_mut() {
                Some(p) if p.token == token && p.bytes.end == ch.start => p.bytes.end = ch.end,
                _ => pieces.push(Piece {
                    token,
                    bytes: ch.start..ch.end,
                }),
            }
        }

        let bytes = pieces.first()?.bytes.start..pieces.last()?.bytes.end;
        Some(Projection {
            plain: start..end,
            bytes,
            pieces,
        })
    }

    fn is_gap(&self, i: usize) -> bool {
        let ch = &self.chars[i];
        ch.token.is_none() || ch.c.is_whitespace()
    }
}

fn push_text(chars: &mut Vec<PlainChar>, token: usize, span: Range<usize>, source: &str) {
    let text = &source[span.clone()];
    let mut offset = 0;
    while offset < text.len() {
        let rest = &text[offset..];
        let at = span.start + offset;
        let (c, len) = match rest.starts_with('&').then(|| entities::decode_at(rest)).flatten() {
            Some(decoded) => decoded,
            None => {
                let Some(c) = rest.chars().next() else { break };
                (c, c.len_utf8())
            }
        };
        chars.push(PlainChar {
            c,
            token: Some(token),
            start: at,
            end: at + len,
        });
        offset += len;
    }
}
