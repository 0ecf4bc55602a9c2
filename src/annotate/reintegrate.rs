//! Splices edited blocks back into the HTML-with-ids document.

use std::collections::HashMap;
use std::ops::Range;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use super::markup::{Markup, MarkupError};
use super::wrap::ERROR_ID_ATTR;

pub const MAPPING_ID_ATTR: &str = "data-mapping-id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReintegrateError {
    #[error("cannot scan document: {0}")]
    Markup(#[from] MarkupError),
    #[error("block {0:?} is not closed in the document")]
    Unclosed(String),
}

/// Replace every element whose `data-mapping-id` has an entry in `updated`
/// with the updated outer HTML. Bytes outside replaced elements are kept.
///
/// An element nested inside an already replaced one is skipped; ids with no
/// element in the document are logged and ignored.
pub fn reintegrate(
    html_with_ids: &str,
    updated: &HashMap<String, String>,
) -> Result<String, ReintegrateError> {
    if updated.is_empty() {
        return Ok(html_with_ids.to_string());
    }
    let markup = Markup::parse(html_with_ids)?;

    let mut splices: Vec<(Range<usize>, &str)> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut last_end = 0;

    for el in markup.elements() {
        let Some(id) = markup.attribute(el, MAPPING_ID_ATTR) else {
            continue;
        };
        let Some(replacement) = updated.get(id) else {
            continue;
        };
        if !el.closed {
            return Err(ReintegrateError::Unclosed(id.to_string()));
        }
        if el.outer.start < last_end {
            debug!(mapping_id = id, "skipping block nested in a replaced block");
            continue;
        }
        last_end = el.outer.end;
        seen.push(id);
        splices.push((el.outer.clone(), replacement.as_str()));
    }

    for id in updated.keys().filter(|id| !seen.contains(&id.as_str())) {
        warn!(mapping_id = %id, "annotated block not found in document");
    }

    let mut out = String::with_capacity(html_with_ids.len() + updated.len() * 32);
    let mut last = 0;
    for (range, replacement) in splices {
        out.push_str(&html_with_ids[last..range.start]);
        out.push_str(replacement);
        last = range.end;
    }
    out.push_str(&html_with_ids[last..]);
    Ok(out)
}

/// Distinct `error-id` values in the order their first span appears.
pub fn error_ids_in_document_order(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(&format!("span[{ERROR_ID_ATTR}]")) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut ids: Vec<String> = Vec::new();
    for span in document.select(&selector) {
        if let Some(id) = span.value().attr(ERROR_ID_ATTR) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}
