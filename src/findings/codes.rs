//! Ordering of error codes such as `E7`, `E12`, `E12A`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::ErrorGroup;

static CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E(\d+)([A-Z]?)$").expect("valid regex"));

fn parse(code: &str) -> Option<(u64, &str)> {
    let caps = CODE.captures(code)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    let letter = caps.get(2).map_or("", |m| m.as_str());
    Some((number, letter))
}

/// Well-formed codes first, by number and then letter (bare number before
/// lettered variants); malformed codes after them, lexically.
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some((na, la)), Some((nb, lb))) => na
            .cmp(&nb)
            .then_with(|| la.is_empty().cmp(&lb.is_empty()).reverse())
            .then_with(|| la.cmp(lb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Stable sort of error groups by code.
pub fn sort_by_code(errors: &mut [ErrorGroup]) {
    errors.sort_by(|a, b| compare_codes(&a.error_code, &b.error_code));
}
