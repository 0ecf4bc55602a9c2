//! Candidate block selection for a finding.

use std::collections::VecDeque;
use std::ops::Range;

use super::markup::Markup;
use crate::models::Mapping;

/// Elements whose children are evaluated one by one.
const CONTAINER_TAGS: &[&str] = &[
    "ul", "ol", "table", "thead", "tbody", "tr", "div", "section", "article", "aside", "nav",
];

/// Elements treated as independent fragments inside a container.
const LEAF_TAGS: &[&str] = &[
    "li", "p", "span", "a", "em", "strong", "i", "b", "u", "small", "td", "th",
];

/// Indices of the mappings to search for a finding reported at `[start, end]`.
///
/// With one line only, the range is that single line. When no mapping
/// intersects, or no line is known, every mapping is a candidate.
pub fn candidate_blocks(mappings: &[Mapping], start: Option<i64>, end: Option<i64>) -> Vec<usize> {
    let range = match (start, end) {
        (Some(s), Some(e)) => Some((s, e)),
        (Some(line), None) | (None, Some(line)) => Some((line, line)),
        (None, None) => None,
    };

    if let Some((s, e)) = range {
        let hits: Vec<usize> = mappings
            .iter()
            .enumerate()
            .filter(|(_, m)| m.intersects(s, e))
            .map(|(i, _)| i)
            .collect();
        if !hits.is_empty() {
            return hits;
        }
    }
    (0..mappings.len()).collect()
}

/// Whether the fragment's root element is a container.
pub fn is_container(markup: &Markup<'_>) -> bool {
    markup
        .root_element()
        .is_some_and(|root| CONTAINER_TAGS.contains(&root.name.as_str()))
}

/// Byte ranges of the topmost leaf elements that carry text, in document order.
///
/// Walks the element tree breadth-first with an explicit queue; once a leaf is
/// taken its descendants are not visited.
pub fn leaf_ranges(markup: &Markup<'_>) -> Vec<Range<usize>> {
    let elements = markup.elements();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); elements.len()];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for (i, el) in elements.iter().enumerate() {
        match el.parent {
            Some(p) => children[p].push(i),
            None => queue.push_back(i),
        }
    }

    let mut leaves = Vec::new();
    while let Some(i) = queue.pop_front() {
        let el = &elements[i];
        if LEAF_TAGS.contains(&el.name.as_str()) && el.closed {
            if !markup.text_of(el).trim().is_empty() {
                leaves.push(i);
            }
            continue;
        }
        queue.extend(children[i].iter().copied());
    }

    leaves.sort_unstable();
    leaves
        .into_iter()
        .map(|i| elements[i].outer.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(start: i64, end: i64) -> Mapping {
        Mapping {
            element_id: Some(format!("m{start}")),
            html_tag: "p".into(),
            html_content: "<p>x</p>".into(),
            md_start_line: start,
            md_end_line: end,
            md_content: "x".into(),
        }
    }

    #[test]
    fn test_cross_line_range_excludes_disjoint_blocks() {
        let mappings = vec![mapping(10, 20), mapping(5, 11), mapping(30, 31)];
        let picked = candidate_blocks(&mappings, Some(12), Some(18));
        assert_eq!(picked, vec![0]);
    }

    #[test]
    fn test_fallback_to_all_blocks() {
        let mappings = vec![mapping(1, 2), mapping(3, 4)];
        assert_eq!(candidate_blocks(&mappings, None, None), vec![0, 1]);
        assert_eq!(candidate_blocks(&mappings, Some(50), Some(60)), vec![0, 1]);
        assert_eq!(candidate_blocks(&mappings, Some(3), None), vec![1]);
    }

    #[test]
    fn test_leaves_of_list() {
        let html = "<ul><li>один</li><li>два <b>жирный</b></li><li> </li></ul>";
        let markup = Markup::parse(html).unwrap();
        assert!(is_container(&markup));
        let leaves: Vec<_> = leaf_ranges(&markup).into_iter().map(|r| &html[r]).collect();
        assert_eq!(leaves, vec!["<li>один</li>", "<li>два <b>жирный</b></li>"]);
    }

    #[test]
    fn test_list_items_without_end_tags_are_leaves() {
        let html = "<ul><li>один<li>два</ul>";
        let markup = Markup::parse(html).unwrap();
        let leaves: Vec<_> = leaf_ranges(&markup).into_iter().map(|r| &html[r]).collect();
        assert_eq!(leaves, vec!["<li>один", "<li>два"]);
    }

    #[test]
    fn test_table_cells_are_leaves() {
        let html = "<table><tr><td>a</td><td>b</td></tr></table>";
        let markup = Markup::parse(html).unwrap();
        assert_eq!(leaf_ranges(&markup).len(), 2);
        assert!(!is_container(&Markup::parse("<p>a</p>").unwrap()));
    }
}
