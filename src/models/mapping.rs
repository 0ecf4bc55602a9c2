//! Link between a Markdown line range and one block of the HTML document.

use serde::{Deserialize, Serialize};

/// One block of the HTML-with-ids document and the Markdown lines it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Value of the block's `data-mapping-id` attribute.
    #[serde(rename = "html_element_id", default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub html_tag: String,
    /// Outer HTML of the block.
    #[serde(default)]
    pub html_content: String,
    #[serde(rename = "markdown_line_start", default)]
    pub md_start_line: i64,
    #[serde(rename = "markdown_line_end", default)]
    pub md_end_line: i64,
    #[serde(rename = "markdown_content", default)]
    pub md_content: String,
}

impl Mapping {
    /// Whether the block's line range intersects `[start, end]`.
    pub fn intersects(&self, start: i64, end: i64) -> bool {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        self.md_start_line <= hi && lo <= self.md_end_line
    }
}
