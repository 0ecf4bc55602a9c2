//! Markdown residue removal for LLM snippets.

use std::sync::LazyLock;

use regex::Regex;

static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new("`([^`]*)`").expect("valid regex"));

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]\((.*?)\)").expect("valid regex"));

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*][ \t]+)+").expect("valid regex"));

static BRACKET_DASH_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\] - ").expect("valid regex"));

static BOLD_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*{3}(.+?)\*{3}").expect("valid regex"));

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*{2}(.+?)\*{2}").expect("valid regex"));

static BOLD_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)_{2}(.+?)_{2}").expect("valid regex"));

/// Upper bound on strip passes; each pass can only shorten the string.
const MAX_STRIP_PASSES: usize = 8;

/// Remove emphasis markers, inline code ticks, link syntax and list bullets.
///
/// Runs to a fixed point so that `strip_markdown(strip_markdown(x)) == strip_markdown(x)`.
pub fn strip_markdown(s: &str) -> String {
    let mut current = s.to_string();
    for _ in 0..MAX_STRIP_PASSES {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn strip_once(s: &str) -> String {
    let s = INLINE_CODE.replace_all(s, "$1");
    let s = s.replace(['*', '_'], "");
    let s = LINK.replace_all(&s, "$1");
    BULLET.replace_all(&s, "").into_owned()
}

/// Clean a raw LLM quote: list and heading markers, `[ref]` prefixes, table
/// pipes, bold markers and leading/trailing ellipses.
pub fn clean_quote(raw: &str) -> String {
    let mut s = raw.strip_prefix("- ").unwrap_or(raw).to_string();
    s = BRACKET_DASH_PREFIX.replace_all(&s, "").into_owned();
    s = trim_bracket_prefix(&s).to_string();
    if let Some(rest) = s.strip_prefix("## ") {
        s = rest.to_string();
    }
    s = s.trim_matches(|c| c == '|' || c == ' ').to_string();
    s = remove_bold(&s);
    trim_ellipsis(&s).to_string()
}

/// Split a cleaned quote into its lines, or failing that its table cells.
///
/// Returns `None` when the quote is a single piece.
pub fn quote_lines(cleaned: &str) -> Option<Vec<String>> {
    let lines = split_no_empty(cleaned, "\n");
    if lines.len() > 1 {
        return Some(lines.iter().map(|l| clean_quote(l)).collect());
    }
    let cells = split_no_empty(cleaned, " | ");
    if cells.len() > 1 {
        return Some(cells.iter().map(|c| clean_quote(c)).collect());
    }
    None
}

/// Whether a raw snippet was cut short by the model.
pub fn ends_with_ellipsis(raw: &str) -> bool {
    let t = raw.trim_end();
    t.ends_with("...") || t.ends_with('…')
}

fn split_no_empty<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    s.split(sep)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Drop a leading `[something] ` reference marker.
fn trim_bracket_prefix(s: &str) -> &str {
    if !s.starts_with('[') {
        return s;
    }
    match s.find(']') {
        Some(close) if close > 1 => s[close + 1..].strip_prefix(' ').unwrap_or(s),
        _ => s,
    }
}

fn remove_bold(s: &str) -> String {
    let s = BOLD_ITALIC.replace_all(s, "$1");
    let s = BOLD.replace_all(&s, "$1");
    BOLD_UNDERSCORE.replace_all(&s, "$1").into_owned()
}

fn trim_ellipsis(mut s: &str) -> &str {
    while let Some(rest) = s.strip_prefix("...") {
        s = rest;
    }
    while let Some(rest) = s.strip_suffix("...") {
        s = rest;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown_basics() {
        assert_eq!(strip_markdown("**жирный** и _курсив_"), "жирный и курсив");
        assert_eq!(strip_markdown("см. `код` и [ссылка](http://x)"), "см. код и ссылка");
        assert_eq!(strip_markdown("- пункт\n  - второй"), "пункт\nвторой");
    }

    #[test]
    fn test_strip_markdown_is_idempotent() {
        let samples = [
            "- - вложенный пункт",
            "[[a](b)](c) текст",
            "**`код`** __x__",
            "* *звёзды* *",
            "обычный текст без разметки",
        ];
        for s in samples {
            let once = strip_markdown(s);
            assert_eq!(strip_markdown(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_clean_quote_prefixes() {
        assert_eq!(clean_quote("- [12] - Система должна"), "Система должна");
        assert_eq!(clean_quote("[4.1] Требования"), "Требования");
        assert_eq!(clean_quote("## Раздел"), "Раздел");
        assert_eq!(clean_quote("| ячейка |"), "ячейка");
        assert_eq!(clean_quote("**важно** ***очень***"), "важно очень");
        assert_eq!(clean_quote("...середина..."), "середина");
    }

    #[test]
    fn test_bracket_prefix_requires_content_and_space() {
        assert_eq!(clean_quote("[] текст"), "[] текст");
        assert_eq!(clean_quote("[x]текст"), "[x]текст");
    }

    #[test]
    fn test_quote_lines() {
        assert_eq!(
            quote_lines("первая\n\n- вторая"),
            Some(vec!["первая".to_string(), "вторая".to_string()])
        );
        assert_eq!(
            quote_lines("a | b | c"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(quote_lines("одна строка"), None);
    }

    #[test]
    fn test_ellipsis_detection() {
        assert!(ends_with_ellipsis("должна быть предусмотрена..."));
        assert!(ends_with_ellipsis("обрезано…  "));
        assert!(!ends_with_ellipsis("полное предложение."));
    }
}
