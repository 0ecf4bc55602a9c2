//! Position-preserving HTML scanning on top of `quick-xml`.
//!
//! The reader position after each event gives the byte span of every tag and
//! text run, so edits can be spliced into the original markup and untouched
//! bytes stay identical. The element tree adds the HTML rules an XML reader
//! does not know: void elements, raw-text bodies and optional end tags.

use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::text::entities;

/// Errors produced while scanning markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("malformed markup at byte {position}: {message}")]
    Syntax { position: usize, message: String },
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Tags that may be crossed when a match spans several text runs.
const INLINE_ELEMENTS: &[&str] = &[
    "span", "a", "em", "strong", "i", "b", "u", "s", "small", "sub", "sup", "mark", "code", "font",
    "abbr", "cite", "q", "del", "ins", "kbd", "var", "br", "wbr",
];

/// Tags whose boundaries separate words in the plain-text view.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "h1", "h2",
    "h3", "h4", "h5", "h6", "br", "hr", "section", "article", "aside", "nav", "blockquote", "pre",
    "header", "footer", "caption",
];

/// Elements whose end tag may be omitted.
const OPTIONAL_END_ELEMENTS: &[&str] = &[
    "li", "p", "dt", "dd", "td", "th", "tr", "thead", "tbody", "tfoot", "option",
];

/// Start tags that end an open `p`.
const P_CLOSERS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section",
    "table", "ul",
];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn is_inline(name: &str) -> bool {
    INLINE_ELEMENTS.contains(&name)
}

pub fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

/// Whether an open `open` element ends when a `next` start tag appears.
fn closed_by_start(open: &str, next: &str) -> bool {
    match open {
        "li" => next == "li",
        "dt" | "dd" => matches!(next, "dt" | "dd"),
        "p" => P_CLOSERS.contains(&next),
        "td" | "th" => matches!(next, "td" | "th" | "tr" | "thead" | "tbody" | "tfoot"),
        "tr" => matches!(next, "tr" | "thead" | "tbody" | "tfoot"),
        "thead" | "tbody" | "tfoot" => matches!(next, "thead" | "tbody" | "tfoot"),
        "option" => next == "option",
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    StartTag {
        name: String,
        self_closing: bool,
        /// Lowercased names with entity-decoded values, in source order.
        attributes: Vec<(String, String)>,
    },
    EndTag {
        name: String,
    },
    Text,
    /// Body of `script`/`style`; never part of the plain text.
    RawText,
    Comment,
    /// `<!DOCTYPE …>`, CDATA and processing instructions.
    Declaration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    /// Tag name for start and end tags.
    pub fn tag_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::StartTag { name, .. } | TokenKind::EndTag { name } => Some(name),
            _ => None,
        }
    }

    /// Attribute value of a start tag; valueless attributes read as `""`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.kind {
            TokenKind::StartTag { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    fn is_tag(&self) -> bool {
        self.tag_name().is_some()
    }
}

fn lowercase(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn start_tag(tag: &BytesStart<'_>, self_closing: bool) -> TokenKind {
    let attributes = tag
        .html_attributes()
        .filter_map(Result::ok)
        .map(|attr| {
            let value = entities::decode_all(&String::from_utf8_lossy(&attr.value));
            (lowercase(attr.key.as_ref()), value)
        })
        .collect();
    TokenKind::StartTag {
        name: lowercase(tag.name().as_ref()),
        self_closing,
        attributes,
    }
}

/// Split `html` into tags, text runs, comments and declarations.
///
/// Raw-text bodies are cut out by hand and the reader restarts after them, so
/// script and style content is never parsed as markup.
pub fn tokenize(html: &str) -> Result<Vec<Token>, MarkupError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut base = 0;
    while let Some(resume) = scan_from(html, base, &mut tokens)? {
        base = resume;
    }
    Ok(tokens)
}

/// Read events from `base` to the end of input, stopping after the start tag
/// of a raw-text element. Returns the offset to resume from in that case.
fn scan_from(html: &str, base: usize, tokens: &mut Vec<Token>) -> Result<Option<usize>, MarkupError> {
    let mut reader = Reader::from_str(&html[base..]);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut last = 0usize;
    loop {
        let event = reader.read_event().map_err(|e| MarkupError::Syntax {
            position: base + reader.buffer_position() as usize,
            message: e.to_string(),
        })?;
        let pos = reader.buffer_position() as usize;
        let span = base + last..base + pos;
        last = pos;

        let kind = match event {
            Event::Eof => return Ok(None),
            Event::Start(tag) => start_tag(&tag, false),
            Event::Empty(tag) => start_tag(&tag, true),
            Event::End(tag) => TokenKind::EndTag {
                name: lowercase(tag.name().as_ref()),
            },
            Event::Text(_) => TokenKind::Text,
            Event::Comment(_) => TokenKind::Comment,
            _ => TokenKind::Declaration,
        };

        let raw_body = match &kind {
            TokenKind::StartTag {
                name,
                self_closing: false,
                ..
            } if RAW_TEXT_ELEMENTS.contains(&name.as_str()) => Some(format!("</{name}")),
            _ => None,
        };

        // adjacent text events form one run
        let extends_text = kind == TokenKind::Text
            && matches!(tokens.last(), Some(prev) if prev.kind == TokenKind::Text && prev.span.end == span.start);
        if extends_text {
            if let Some(prev) = tokens.last_mut() {
                prev.span.end = span.end;
            }
        } else {
            tokens.push(Token { kind, span });
        }

        if let Some(close_tag) = raw_body {
            let body_start = base + pos;
            let close = find_ascii_ci(html, body_start, &close_tag).unwrap_or(html.len());
            if close > body_start {
                tokens.push(Token {
                    kind: TokenKind::RawText,
                    span: body_start..close,
                });
            }
            return Ok((close < html.len()).then_some(close));
        }
    }
}

fn find_ascii_ci(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || hay.len() < needle.len() || from > hay.len() - needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// An element located in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Token index of the start tag.
    pub open: usize,
    /// Token index of the matching end tag.
    pub close: Option<usize>,
    /// Byte range from the start tag to the end of the element.
    pub outer: Range<usize>,
    pub parent: Option<usize>,
    /// Closed by an end tag, self-closing, void, or ended where HTML lets
    /// the end tag be omitted.
    pub closed: bool,
}

/// Scanned markup with its element structure.
#[derive(Debug, Clone)]
pub struct Markup<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    elements: Vec<Element>,
}

impl<'a> Markup<'a> {
    pub fn parse(source: &'a str) -> Result<Self, MarkupError> {
        let tokens = tokenize(source)?;
        let mut elements: Vec<Element> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();

        for (ti, tok) in tokens.iter().enumerate() {
            match &tok.kind {
                TokenKind::StartTag {
                    name, self_closing, ..
                } => {
                    while let Some(&top) = stack.last() {
                        if !closed_by_start(&elements[top].name, name) {
                            break;
                        }
                        elements[top].closed = true;
                        elements[top].outer.end = tok.span.start;
                        stack.pop();
                    }

                    let void = *self_closing || is_void(name);
                    elements.push(Element {
                        name: name.clone(),
                        open: ti,
                        close: None,
                        outer: tok.span.clone(),
                        parent: stack.last().copied(),
                        closed: void,
                    });
                    if !void {
                        stack.push(elements.len() - 1);
                    }
                }
                TokenKind::EndTag { name } => {
                    let Some(pos) = stack.iter().rposition(|&e| elements[e].name == *name) else {
                        continue;
                    };
                    // anything still open above the match ends where this tag starts
                    for &e in &stack[pos + 1..] {
                        elements[e].outer.end = tok.span.start;
                        elements[e].closed = OPTIONAL_END_ELEMENTS.contains(&elements[e].name.as_str());
                    }
                    let e = stack[pos];
                    elements[e].close = Some(ti);
                    elements[e].closed = true;
                    elements[e].outer.end = tok.span.end;
                    stack.truncate(pos);
                }
                _ => {}
            }
        }
        for e in stack {
            elements[e].outer.end = source.len();
            elements[e].closed = OPTIONAL_END_ELEMENTS.contains(&elements[e].name.as_str());
        }

        Ok(Self {
            source,
            tokens,
            elements,
        })
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Attribute of an element's start tag.
    pub fn attribute(&self, element: &Element, name: &str) -> Option<&str> {
        self.tokens[element.open].attribute(name)
    }

    /// First top-level element.
    pub fn root_element(&self) -> Option<&Element> {
        self.elements.iter().find(|e| e.parent.is_none())
    }

    /// Decoded text content of an element.
    pub fn text_of(&self, element: &Element) -> String {
        let mut out = String::new();
        for tok in &self.tokens {
            if tok.kind == TokenKind::Text
                && tok.span.start >= element.outer.start
                && tok.span.end <= element.outer.end
            {
                out.push_str(&entities::decode_all(&self.source[tok.span.clone()]));
            }
        }
        out
    }

    /// True when `range` cuts no tag in half and its tags nest properly.
    pub fn is_balanced(&self, range: &Range<usize>) -> bool {
        let mut open: Vec<&str> = Vec::new();
        for tok in self.tokens.iter().filter(|t| overlaps(&t.span, range)) {
            let inside = tok.span.start >= range.start && tok.span.end <= range.end;
            if !inside {
                if tok.is_tag() {
                    return false;
                }
                continue;
            }
            match &tok.kind {
                TokenKind::StartTag {
                    name, self_closing, ..
                } if !*self_closing && !is_void(name) => open.push(name),
                TokenKind::EndTag { name } => {
                    if open.pop() != Some(name.as_str()) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        open.is_empty()
    }

    /// True when every tag inside `range` is an inline element.
    pub fn only_inline_tags_within(&self, range: &Range<usize>) -> bool {
        self.tokens
            .iter()
            .filter(|t| overlaps(&t.span, range))
            .filter_map(Token::tag_name)
            .all(is_inline)
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(markup: &Markup<'_>) -> Vec<String> {
        markup.elements().iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_tokenize_spans_cover_source() {
        let html = r#"<P class="a>b">x &amp; y<br/>z</p><!-- c -->"#;
        let tokens = tokenize(html).unwrap();
        let rebuilt: String = tokens.iter().map(|t| &html[t.span.clone()]).collect();
        assert_eq!(rebuilt, html);
        assert_eq!(tokens[0].tag_name(), Some("p"));
        assert_eq!(tokens[0].attribute("class"), Some("a>b"));
        assert_eq!(tokens[1].kind, TokenKind::Text);
        assert_eq!(&html[tokens[1].span.clone()], "x &amp; y");
        assert!(matches!(
            tokens[2].kind,
            TokenKind::StartTag {
                self_closing: true,
                ..
            }
        ));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Comment);
    }

    #[test]
    fn test_raw_text_elements() {
        let html = "<style>p > a { }</style><script>if (a < b) {}</script><p>t</p>";
        let tokens = tokenize(html).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::RawText);
        assert_eq!(&html[tokens[1].span.clone()], "p > a { }");
        assert_eq!(tokens[2].tag_name(), Some("style"));
        assert_eq!(&html[tokens[4].span.clone()], "if (a < b) {}");
        assert_eq!(tokens.last().unwrap().tag_name(), Some("p"));
    }

    #[test]
    fn test_malformed_markup_is_error() {
        assert!(matches!(
            tokenize("<p class=\"x"),
            Err(MarkupError::Syntax { .. })
        ));
        assert!(matches!(
            tokenize("a<!-- open"),
            Err(MarkupError::Syntax { .. })
        ));
    }

    #[test]
    fn test_html_attributes() {
        let html = r#"<div data-mapping-id="m-7" hidden class='x y' data-n=3 title="a &amp; b">"#;
        let tokens = tokenize(html).unwrap();
        let tag = &tokens[0];
        assert_eq!(tag.attribute("data-mapping-id"), Some("m-7"));
        assert_eq!(tag.attribute("class"), Some("x y"));
        assert_eq!(tag.attribute("data-n"), Some("3"));
        assert_eq!(tag.attribute("hidden"), Some(""));
        assert_eq!(tag.attribute("title"), Some("a & b"));
        assert_eq!(tag.attribute("id"), None);
    }

    #[test]
    fn test_omitted_list_item_end_tags() {
        let html = "<ul><li>один<li>два</ul><p>c";
        let markup = Markup::parse(html).unwrap();
        assert_eq!(names(&markup), vec!["ul", "li", "li", "p"]);

        let els = markup.elements();
        assert!(els[0].closed);
        assert_eq!(&html[els[0].outer.clone()], "<ul><li>один<li>два</ul>");
        assert!(els[1].closed);
        assert_eq!(&html[els[1].outer.clone()], "<li>один");
        assert_eq!(els[2].parent, Some(0));
        assert_eq!(&html[els[2].outer.clone()], "<li>два");
        // p may end at the end of input
        assert!(els[3].closed);
        assert_eq!(els[3].outer.end, html.len());
    }

    #[test]
    fn test_table_cells_close_implicitly() {
        let html = "<table><tr><td>a<td>b<tr><td>c</table>";
        let markup = Markup::parse(html).unwrap();
        let cells: Vec<_> = markup
            .elements()
            .iter()
            .filter(|e| e.name == "td")
            .map(|e| (&html[e.outer.clone()], e.closed))
            .collect();
        assert_eq!(cells, vec![("<td>a", true), ("<td>b", true), ("<td>c", true)]);
    }

    #[test]
    fn test_paragraph_closed_by_block_start() {
        let html = "<div><p>раз<div>два</div></div>";
        let markup = Markup::parse(html).unwrap();
        let p = &markup.elements()[1];
        assert!(p.closed);
        assert_eq!(&html[p.outer.clone()], "<p>раз");
        assert_eq!(markup.elements()[2].parent, Some(0));
    }

    #[test]
    fn test_unclosed_div_stays_open() {
        let markup = Markup::parse("<div>x").unwrap();
        assert!(!markup.elements()[0].closed);
    }

    #[test]
    fn test_balance_checks() {
        let html = "<p>a <b>bold</b> c</p>";
        let markup = Markup::parse(html).unwrap();
        let whole = html.find('a').unwrap()..html.find(" c").unwrap() + 2;
        assert!(markup.is_balanced(&whole));
        let cut = html.find("bold").unwrap()..html.find(" c").unwrap();
        assert!(!markup.is_balanced(&cut));
        assert!(markup.only_inline_tags_within(&cut));
    }
}
