//! HTML character reference decoding.

/// Longest reference body we try to decode (`&` and `;` excluded).
const MAX_REFERENCE_LEN: usize = 32;

/// Decode a named or numeric character reference body (the part between `&` and `;`).
pub fn decode_reference(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "thinsp" => '\u{2009}',
        "shy" => '\u{ad}',
        "laquo" => '«',
        "raquo" => '»',
        "ldquo" => '“',
        "rdquo" => '”',
        "bdquo" => '„',
        "lsquo" => '‘',
        "rsquo" => '’',
        "mdash" => '—',
        "ndash" => '–',
        "minus" => '−',
        "hellip" => '…',
        "times" => '×',
        "middot" => '·',
        "deg" => '°',
        "prime" => '′',
        "Prime" => '″',
        "copy" => '©',
        "reg" => '®',
        "sect" => '§',
        "numero" => '№',
        "plusmn" => '±',
        "le" => '≤',
        "ge" => '≥',
        _ => return None,
    };
    Some(c)
}

/// Try to decode a reference starting at `s[0] == '&'`.
///
/// Returns the decoded char and the byte length consumed (including `&` and `;`).
pub fn decode_at(s: &str) -> Option<(char, usize)> {
    let rest = s.strip_prefix('&')?;
    let window = &rest[..floor_char_boundary(rest, MAX_REFERENCE_LEN + 1)];
    let semi = window.find(';')?;
    let body = &rest[..semi];
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '#') {
        return None;
    }
    decode_reference(body).map(|c| (c, semi + 2))
}

/// Decode every recognised reference in `s`; unknown ones are kept verbatim.
pub fn decode_all(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while let Some(pos) = s[i..].find('&') {
        out.push_str(&s[i..i + pos]);
        i += pos;
        match decode_at(&s[i..]) {
            Some((c, len)) => {
                out.push(c);
                i += len;
            }
            None => {
                out.push('&');
                i += 1;
            }
        }
    }
    out.push_str(&s[i..]);
    out
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
