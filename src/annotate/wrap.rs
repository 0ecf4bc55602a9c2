//! Inserts `error-id` markers around located ranges.

use super::locator::LocateError;
use super::markup::{Markup, TokenKind};
use super::plain_index::Projection;

pub const ERROR_ID_ATTR: &str = "error-id";

const CLOSE_SPAN: &str = "</span>";

#[derive(Debug)]
struct Insert {
    at: usize,
    text: String,
}

fn open_span(id: &str) -> String {
    format!("<span {ERROR_ID_ATTR}=\"{id}\">")
}

/// Wrap the projected range of `markup` with error-id spans.
///
/// A range that is balanced markup gets a single span. A range crossing only
/// inline tags gets one span per text run, all sharing the id, and runs holding
/// only punctuation are left alone. A run that is the entire content of a plain
/// `<span>` receives the attribute on that span instead. Ranges crossing any
/// other tag are refused.
pub fn wrap_projection(
    markup: &Markup<'_>,
    projection: &Projection,
    id: &str,
) -> Result<String, LocateError> {
    let source = markup.source();
    let range = projection.bytes.clone();

    let inserts = if markup.is_balanced(&range) {
        vec![
            Insert {
                at: range.start,
                text: open_span(id),
            },
            Insert {
                at: range.end,
                text: CLOSE_SPAN.to_string(),
            },
        ]
    } else if markup.only_inline_tags_within(&range) {
        per_run_inserts(markup, projection, id)
    } else {
        return Err(LocateError::CrossesTag);
    };

    if inserts.is_empty() {
        return Err(LocateError::NotFound);
    }
    Ok(apply(source, inserts))
}

fn per_run_inserts(markup: &Markup<'_>, projection: &Projection, id: &str) -> Vec<Insert> {
    let source = markup.source();
    let mut inserts = Vec::new();

    for piece in &projection.pieces {
        let text = &source[piece.bytes.clone()];
        let trimmed = text.trim();
        // punctuation between highlighted runs stays unwrapped
        if !trimmed.chars().any(char::is_alphanumeric) {
            continue;
        }
        let lead = text.len() - text.trim_start().len();
        let start = piece.bytes.start + lead;
        let end = start + trimmed.len();

        let whole_run = source[markup.tokens()[piece.token].span.clone()].trim() == trimmed;
        if whole_run {
            if let Some(at) = bare_span_attr_position(markup, piece.token) {
                inserts.push(Insert {
                    at,
                    text: format!(" {ERROR_ID_ATTR}=\"{id}\""),
                });
                continue;
            }
        }
        inserts.push(Insert {
            at: start,
            text: open_span(id),
        });
        inserts.push(Insert {
            at: end,
            text: CLOSE_SPAN.to_string(),
        });
    }
    inserts
}

/// Byte position right after `<span` when text token `token` is the only child
/// of a span that has no error id yet.
fn bare_span_attr_position(markup: &Markup<'_>, token: usize) -> Option<usize> {
    let tokens = markup.tokens();
    let prev = tokens.get(token.checked_sub(1)?)?;
    let next = tokens.get(token + 1)?;
    let opens_span = matches!(
        &prev.kind,
        TokenKind::StartTag { name, self_closing: false, .. } if name == "span"
    );
    let closes_span = matches!(&next.kind, TokenKind::EndTag { name } if name == "span");
    if !opens_span || !closes_span {
        return None;
    }
    if prev.attribute(ERROR_ID_ATTR).is_some() {
        return None;
    }
    Some(prev.span.start + "<span".len())
}

fn apply(source: &str, mut inserts: Vec<Insert>) -> String {
    inserts.sort_by_key(|i| i.at);
    let extra: usize = inserts.iter().map(|i| i.text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut last = 0;
    for insert in inserts {
        out.push_str(&source[last..insert.at]);
        out.push_str(&insert.text);
        last = insert.at;
    }
    out.push_str(&source[last..]);
    out
}
