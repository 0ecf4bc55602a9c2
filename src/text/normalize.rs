//! Canonical matching form for document text and LLM snippets.

use std::sync::LazyLock;

use regex::Regex;

use super::entities;
use super::mapped::MappedText;

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid regex")
});

static DOUBLE_APOSTROPHE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("’’").expect("valid regex"));

static CELSIUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*°\s*[CС]").expect("valid regex"));

static INCHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b([0-9]+)\s*["”″]"#).expect("valid regex"));

static FOUR_K: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b4\s*[KК]\b").expect("valid regex"));

/// Normalize `s` for comparison.
pub fn normalize(s: &str) -> String {
    normalize_mapped(&MappedText::identity(s)).into_string()
}

/// Normalize keeping provenance back to the input characters.
pub fn normalize_mapped(input: &MappedText) -> MappedText {
    let decoded = input.replace_regex(&ENTITY, |caps| {
        let whole = &caps[0];
        let body = &whole[1..whole.len() - 1];
        entities::decode_reference(body)
            .map(String::from)
            .unwrap_or_else(|| whole.to_string())
    });

    let symbols = decoded
        .replace_regex(&DOUBLE_APOSTROPHE, |_| "\"".to_string())
        .map_chars(canonical_symbol);

    let units = symbols
        .replace_regex(&CELSIUS, |_| "°C".to_string())
        .replace_regex(&INCHES, |caps| format!("{}\"", &caps[1]))
        .replace_regex(&FOUR_K, |_| "4K".to_string());

    let out = units
        .map_chars(|c, out| out.extend(fold_confusable(c).to_lowercase()))
        .trim_collapse_whitespace();

    // Decoding or case folding can expose another reference (`&amp;amp;`,
    // `&AMP;`); every further pass decodes one, so this terminates.
    if has_known_reference(out.as_str()) {
        normalize_mapped(&out)
    } else {
        out
    }
}

fn has_known_reference(s: &str) -> bool {
    ENTITY.find_iter(s).any(|m| {
        let whole = m.as_str();
        entities::decode_reference(&whole[1..whole.len() - 1]).is_some()
    })
}

fn canonical_symbol(c: char, out: &mut String) {
    match c {
        '“' | '”' | '„' | '«' | '»' | '″' => out.push('"'),
        '‘' | '’' => out.push('\''),
        '—' | '–' | '‒' | '−' => out.push('-'),
        '…' => out.push_str("..."),
        '\u{a0}' | '\u{2009}' | '\u{202f}' => out.push(' '),
        '×' | '·' => out.push('x'),
        '˚' => out.push('°'),
        // soft hyphen and zero-width space vanish
        '\u{ad}' | '\u{200b}' => {}
        other => out.push(other),
    }
}

/// Cyrillic letters that render like Latin ones fold to the Latin letter.
fn fold_confusable(c: char) -> char {
    match c {
        'А' => 'A',
        'В' => 'B',
        'Е' => 'E',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Т' => 'T',
        'Х' => 'X',
        'У' => 'Y',
        'а' => 'a',
        'е' => 'e',
        'к' => 'k',
        'м' => 'm',
        'н' => 'h',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'т' => 't',
        'х' => 'x',
        'у' => 'y',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typography_folds_to_ascii() {
        assert_eq!(
            normalize("«Система»\u{a0}— это…"),
            normalize("\"Система\" - это...")
        );
        assert_eq!(normalize("a\u{2009}×\u{202f}b"), "a x b");
    }

    #[test]
    fn test_units_are_rewritten() {
        assert_eq!(normalize("от -40 ˚ С до +50 °C"), "ot -40°c дo +50°c");
        assert_eq!(normalize("экран 27 ″"), "эkpah 27\"");
        assert_eq!(normalize("разрешение 4 К"), "paзpeшehиe 4k");
    }

    #[test]
    fn test_confusables_fold_both_alphabets() {
        assert_eq!(normalize("СИСТЕМА"), normalize("CИCTEMA"));
        assert_eq!(normalize("Тест"), "tect");
    }

    #[test]
    fn test_entities_and_whitespace() {
        assert_eq!(normalize("  a&nbsp;&amp;\n\n b  "), "a & b");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_soft_hyphen_dropped() {
        assert_eq!(normalize("функцио\u{ad}нирования"), normalize("функционирования"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Требования к режимам функционирования системы . MES-система…",
            "«Кавычки» и „лапки“, ‘одиночные’ и ’’двойные’’",
            "Температура −10 ˚ С, экран 15 ″, видео 4 K",
            "  много\u{a0}\u{a0}пробелов\t\tи\nстрок  ",
            "Размер 10×20 · 30 — итого",
            "ВЕРХНИЙ РЕГИСТР и Mixed Case",
            "AT&amp;amp;T",
            "&amp;laquo;цитата&amp;raquo;",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_nested_references_decode_fully() {
        assert_eq!(normalize("AT&amp;amp;T"), "at&t");
        assert_eq!(normalize("&amp;laquo;x&amp;raquo;"), "\"x\"");
        assert_eq!(normalize("a &unknown; b"), "a &unknown; b");
    }

    #[test]
    fn test_mapped_origin_points_into_input() {
        let input = MappedText::identity("Ab  «C»");
        let out = normalize_mapped(&input);
        assert_eq!(out.as_str(), "ab \"c\"");
        assert_eq!(out.origin(), &[0, 1, 2, 4, 5, 6]);
    }
}
