//! Anchoring findings in the HTML document.
//!
//! For every invalid finding the block selector narrows the mapping table,
//! the locator searches each candidate (descending into leaves of containers),
//! the widest match is wrapped in its block, and finally all edited blocks are
//! spliced back into the HTML-with-ids document.

pub mod audit;
pub mod blocks;
pub mod locator;
pub mod markup;
pub mod plain_index;
pub mod reintegrate;
pub mod wrap;

use std::collections::HashMap;
use std::ops::Range;

use tracing::{debug, info, warn};

use crate::models::{InvalidFinding, Mapping};
use audit::{AuditEntry, AuditStatus};
use locator::{LocateError, SnippetMatcher, SpanMatch};
use markup::Markup;
use plain_index::PlainIndex;
use reintegrate::ReintegrateError;

pub use audit::to_tsv as audit_tsv;
pub use locator::Strategy;
pub use reintegrate::{error_ids_in_document_order, reintegrate, MAPPING_ID_ATTR};
pub use wrap::ERROR_ID_ATTR;

/// Output of [`annotate_document`].
#[derive(Debug, Clone)]
pub struct DocumentAnnotation {
    pub html: String,
    pub audit: Vec<AuditEntry>,
    /// Distinct error ids in the order they appear in `html`.
    pub document_order: Vec<String>,
    /// Set when the merge failed and `html` is the unannotated document.
    pub reintegration_error: Option<ReintegrateError>,
}

impl DocumentAnnotation {
    pub fn wrapped_count(&self) -> usize {
        self.audit
            .iter()
            .filter(|e| e.status == AuditStatus::Found)
            .count()
    }
}

/// Working copy of one mapped block.
struct Block {
    html: String,
    edited: bool,
}

/// The best match found for a finding.
struct Candidate {
    block: usize,
    /// Byte range of the leaf inside the block, or `None` for the whole block.
    leaf: Option<Range<usize>>,
    found: SpanMatch,
}

/// Wrap every invalid finding in its block and rebuild the document.
pub fn annotate_document(
    html_with_ids: &str,
    mappings: &[Mapping],
    findings: &[InvalidFinding],
) -> DocumentAnnotation {
    let mut blocks: Vec<Block> = mappings
        .iter()
        .map(|m| Block {
            html: m.html_content.clone(),
            edited: false,
        })
        .collect();

    let mut audit: Vec<AuditEntry> = findings
        .iter()
        .map(|finding| anchor_finding(&mut blocks, mappings, finding))
        .collect();

    let updated: HashMap<String, String> = blocks
        .iter()
        .zip(mappings)
        .filter(|(block, _)| block.edited)
        .filter_map(|(block, m)| m.element_id.clone().map(|id| (id, block.html.clone())))
        .collect();

    let (html, reintegration_error) = match reintegrate(html_with_ids, &updated) {
        Ok(html) => (html, None),
        Err(e) => {
            warn!(error = %e, "could not merge annotated blocks, returning document unannotated");
            for entry in audit.iter_mut().filter(|e| e.status == AuditStatus::Found) {
                entry.status = AuditStatus::Skipped;
                entry.reason = Some("dom-reintegration".to_string());
            }
            (html_with_ids.to_string(), Some(e))
        }
    };

    let document_order = error_ids_in_document_order(&html);
    let result = DocumentAnnotation {
        html,
        audit,
        document_order,
        reintegration_error,
    };
    info!(
        findings = findings.len(),
        wrapped = result.wrapped_count(),
        "document annotated"
    );
    result
}

fn anchor_finding(blocks: &mut [Block], mappings: &[Mapping], finding: &InvalidFinding) -> AuditEntry {
    let mut entry = AuditEntry {
        error_id: finding.html_id.clone(),
        group_id: finding.group_id.clone(),
        code: finding.error_code.clone(),
        line_start: finding.start_line,
        line_end: finding.end_line,
        candidates: 0,
        chosen_element: None,
        strategy: None,
        status: AuditStatus::NotFound,
        reason: None,
        snippet: finding.original_quote.clone(),
    };

    let matcher = SnippetMatcher::new(&finding.original_quote);
    if matcher.is_empty() {
        return fail(entry, AuditStatus::Skipped, LocateError::EmptySnippet);
    }

    let mut best: Option<Candidate> = None;
    for b in blocks::candidate_blocks(mappings, finding.start_line, finding.end_line) {
        let html = blocks[b].html.as_str();
        let markup = match Markup::parse(html) {
            Ok(markup) => markup,
            Err(e) => {
                debug!(block = b, error = %e, "skipping unparsable block");
                continue;
            }
        };

        let mut targets: Vec<Option<Range<usize>>> = Vec::new();
        if blocks::is_container(&markup) {
            targets.extend(blocks::leaf_ranges(&markup).into_iter().map(Some));
        }
        targets.push(None);

        for leaf in targets {
            let fragment = leaf.as_ref().map_or(html, |r| &html[r.clone()]);
            let Ok(index) = PlainIndex::from_html(fragment) else {
                continue;
            };
            entry.candidates += 1;
            if let Some(found) = matcher.find(index.normalized()) {
                if best.as_ref().map_or(true, |c| found.coverage > c.found.coverage) {
                    best = Some(Candidate {
                        block: b,
                        leaf,
                        found,
                    });
                }
            }
        }
    }

    let Some(candidate) = best else {
        return fail(entry, AuditStatus::NotFound, LocateError::NotFound);
    };
    entry.chosen_element = mappings[candidate.block].element_id.clone();
    entry.strategy = Some(candidate.found.strategy);

    match wrap_candidate(&blocks[candidate.block].html, &candidate, &finding.html_id) {
        Ok(html) => {
            let block = &mut blocks[candidate.block];
            block.html = html;
            block.edited = true;
            entry.status = AuditStatus::Found;
            debug!(
                error_id = %finding.html_id,
                strategy = candidate.found.strategy.as_str(),
                "finding anchored"
            );
            entry
        }
        Err(e) => fail(entry, AuditStatus::NotFound, e),
    }
}

fn wrap_candidate(block_html: &str, candidate: &Candidate, id: &str) -> Result<String, LocateError> {
    let leaf = candidate.leaf.clone().unwrap_or(0..block_html.len());
    let fragment = &block_html[leaf.clone()];
    let markup = Markup::parse(fragment).map_err(|_| LocateError::NotFound)?;
    let index = PlainIndex::build(&markup);
    let projection = index
        .project(candidate.found.range.clone())
        .ok_or(LocateError::NotFound)?;
    let wrapped = wrap::wrap_projection(&markup, &projection, id)?;
    Ok(format!(
        "{}{}{}",
        &block_html[..leaf.start],
        wrapped,
        &block_html[leaf.end..]
    ))
}

fn fail(mut entry: AuditEntry, status: AuditStatus, reason: LocateError) -> AuditEntry {
    warn!(
        error_id = %entry.error_id,
        code = %entry.code,
        reason = reason.reason(),
        "finding not anchored"
    );
    entry.status = status;
    entry.reason = Some(reason.reason().to_string());
    entry
}
