//! Page-range normalisation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize_hyphens;

static ROMAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ivxlcdmIVXLCDM]+$").unwrap());

/// Born-digital page labels: a letter block followed by digits ("G27", "e1017").
static BORN_DIGITAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{1,3}\d+$").unwrap());

/// Normalise a single page token, or reject it.
///
/// Accepts all-digit, all-Roman-numeral and born-digital tokens as they are;
/// tokens that mix digits with stray letters ("583b") keep only the digits.
fn clean_page_token(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return Some(token.to_string());
    }
    if ROMAN_RE.is_match(token) || BORN_DIGITAL_RE.is_match(token) {
        return Some(token.to_string());
    }
    let digits: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Normalise a page field to `start-end` or `start`.
///
/// The separator is any single run boundary of non-alphanumeric characters;
/// more than two parts, or an unusable start page, yields the empty string.
pub fn clean_pages(s: &str) -> String {
    let s = normalize_hyphens(s);
    let s = s.trim();
    if s.is_empty() {
        return String::new();
    }
    let parts: Vec<&str> = s
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [start] => clean_page_token(start).unwrap_or_default(),
        [start, end] => match (clean_page_token(start), clean_page_token(end)) {
            (Some(a), Some(b)) => format!("{a}-{b}"),
            (Some(a), None) => a,
            _ => String::new(),
        },
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_range() {
        assert_eq!(clean_pages("583-602"), "583-602");
    }

    #[test]
    fn single_page() {
        assert_eq!(clean_pages("583"), "583");
    }

    #[test]
    fn stray_letters_stripped() {
        assert_eq!(clean_pages("583b-602"), "583-602");
    }

    #[test]
    fn roman_numerals_kept() {
        assert_eq!(clean_pages("iv-xii"), "iv-xii");
    }

    #[test]
    fn born_digital_kept() {
        assert_eq!(clean_pages("G27"), "G27");
        assert_eq!(clean_pages("e1017-e1023"), "e1017-e1023");
    }

    #[test]
    fn en_dash_separator() {
        assert_eq!(clean_pages("12\u{2013}34"), "12-34");
    }

    #[test]
    fn garbage_is_empty() {
        assert_eq!(clean_pages("n/a-n/a-n/a"), "");
        assert_eq!(clean_pages("??"), "");
    }

    #[test]
    fn idempotent() {
        for s in ["583b-602", "G27", "iv-xii", "1-2-3", ""] {
            let once = clean_pages(s);
            assert_eq!(clean_pages(&once), once);
        }
    }
}
