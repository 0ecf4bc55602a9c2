//! Text that remembers where each of its characters came from.
//!
//! Every transformation keeps an `origin` entry per output character pointing at
//! the source character it was derived from. Origins never decrease, so a span in
//! the transformed text always maps back to a contiguous span of the source.

use std::ops::Range;

use regex::{Captures, Regex};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedText {
    text: String,
    origin: Vec<usize>,
}

impl MappedText {
    /// Wrap `s` with an identity mapping.
    pub fn identity(s: &str) -> Self {
        Self {
            text: s.to_string(),
            origin: (0..s.chars().count()).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Source char index for each char of this text.
    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    /// Rewrite char by char; every produced char inherits the source char's origin.
    pub fn map_chars<F>(&self, mut f: F) -> Self
    where
        F: FnMut(char, &mut String),
    {
        let mut text = String::with_capacity(self.text.len());
        let mut origin = Vec::with_capacity(self.origin.len());
        let mut buf = String::new();
        for (c, &o) in self.text.chars().zip(&self.origin) {
            buf.clear();
            f(c, &mut buf);
            for out in buf.chars() {
                text.push(out);
                origin.push(o);
            }
        }
        Self { text, origin }
    }

    /// Replace every match of `re` with the string produced by `rep`.
    ///
    /// Replacement chars take the origins of the matched chars position by position;
    /// the last replacement char always takes the last matched char's origin.
    pub fn replace_regex<F>(&self, re: &Regex, mut rep: F) -> Self
    where
        F: FnMut(&Captures) -> String,
    {
        let mut text = String::with_capacity(self.text.len());
        let mut origin = Vec::with_capacity(self.origin.len());
        let mut last_byte = 0;
        let mut last_char = 0;

        for caps in re.captures_iter(&self.text) {
            let Some(m) = caps.get(0) else { continue };
            let gap = &self.text[last_byte..m.start()];
            let start_char = last_char + gap.chars().count();
            text.push_str(gap);
            origin.extend_from_slice(&self.origin[last_char..start_char]);

            let match_chars = m.as_str().chars().count();
            let src = &self.origin[start_char..start_char + match_chars];
            let anchor = src
                .first()
                .or_else(|| self.origin.get(start_char))
                .or_else(|| self.origin.last())
                .copied()
                .unwrap_or(0);

            let replacement = rep(&caps);
            let count = replacement.chars().count();
            for (i, c) in replacement.chars().enumerate() {
                let o = if i + 1 == count {
                    src.last().copied()
                } else {
                    src.get(i).or(src.last()).copied()
                };
                text.push(c);
                origin.push(o.unwrap_or(anchor));
            }

            last_byte = m.end();
            last_char = start_char + match_chars;
        }

        text.push_str(&self.text[last_byte..]);
        origin.extend_from_slice(&self.origin[last_char..]);
        Self { text, origin }
    }

    /// Trim both ends and collapse every whitespace run into one space.
    pub fn trim_collapse_whitespace(&self) -> Self {
        let mut text = String::with_capacity(self.text.len());
        let mut origin = Vec::with_capacity(self.origin.len());
        let mut pending_space: Option<usize> = None;

        for (c, &o) in self.text.chars().zip(&self.origin) {
            if c.is_whitespace() {
                if pending_space.is_none() {
                    pending_space = Some(o);
                }
                continue;
            }
            if let Some(space_origin) = pending_space.take() {
                if !text.is_empty() {
                    text.push(' ');
                    origin.push(space_origin);
                }
            }
            text.push(c);
            origin.push(o);
        }

        Self { text, origin }
    }

    /// Map a byte range of this text to the source char range it was derived from.
    pub fn source_range(&self, bytes: Range<usize>) -> Option<Range<usize>> {
        if bytes.start >= bytes.end || bytes.end > self.text.len() {
            return None;
        }
        let first = self.text[..bytes.start].chars().count();
        let len = self.text[bytes.clone()].chars().count();
        let start = *self.origin.get(first)?;
        let end = *self.origin.get(first + len - 1)?;
        Some(start..end + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_chars_expands_with_origin() {
        let t = MappedText::identity("a…b");
        let mapped = t.map_chars(|c, out| match c {
            '…' => out.push_str("..."),
            other => out.push(other),
        });
        assert_eq!(mapped.as_str(), "a...b");
        assert_eq!(mapped.origin(), &[0, 1, 1, 1, 2]);
    }

    #[test]
    fn test_collapse_keeps_first_space_origin() {
        let t = MappedText::identity("  a \n\t b  ");
        let collapsed = t.trim_collapse_whitespace();
        assert_eq!(collapsed.as_str(), "a b");
        assert_eq!(collapsed.origin(), &[2, 3, 7]);
    }

    #[test]
    fn test_replace_regex_shrinks() {
        let re = Regex::new(r"\s*°\s*C").unwrap();
        let t = MappedText::identity("20 ° C");
        let out = t.replace_regex(&re, |_| "°C".to_string());
        assert_eq!(out.as_str(), "20°C");
        assert_eq!(out.origin(), &[0, 1, 2, 5]);
    }

    #[test]
    fn test_source_range_over_multibyte() {
        let t = MappedText::identity("тест  xyz").trim_collapse_whitespace();
        let pos = t.as_str().find("xyz").unwrap();
        assert_eq!(t.source_range(pos..pos + 3), Some(6..9));
        assert_eq!(t.source_range(0..0), None);
    }
}
