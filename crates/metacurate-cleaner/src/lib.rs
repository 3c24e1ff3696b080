//! Deterministic text cleaning for bibliographic metadata fields.
//!
//! Every function in this crate is pure and idempotent: feeding a function
//! its own output returns the output unchanged. The Curator relies on that
//! when it re-cleans rows that were emitted by an earlier batch.

pub mod dates;
pub mod pages;

pub use dates::clean_date;
pub use pages::clean_pages;

/// Dash-like code points unified to U+002D HYPHEN-MINUS.
const HYPHEN_LIKE: &[char] = &[
    '\u{00AD}', '\u{06D4}', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}',
    '\u{2043}', '\u{2212}', '\u{2796}', '\u{2CBA}', '\u{FE58}',
];

/// Space-like code points unified to U+0020 SPACE.
const SPACE_LIKE: &[char] = &[
    '\u{0009}', '\u{00A0}', '\u{200B}', '\u{202F}', '\u{2003}', '\u{2005}', '\u{2009}',
];

/// Replace typographic dashes, soft hyphens and minus signs with `-`.
pub fn normalize_hyphens(s: &str) -> String {
    s.chars()
        .map(|c| if HYPHEN_LIKE.contains(&c) { '-' } else { c })
        .collect()
}

/// Replace tabs, non-breaking and typographic spaces with a plain space.
pub fn normalize_spaces(s: &str) -> String {
    s.chars()
        .map(|c| if SPACE_LIKE.contains(&c) { ' ' } else { c })
        .collect()
}

/// Title-case a single token unless it already carries an inner capital.
///
/// Tokens with uppercase characters after the first position ("FaBiO",
/// "McDonald", "mRNA") are acronym-like and left untouched.
fn capitalize_token(token: &str) -> String {
    let has_inner_upper = token.chars().skip(1).any(|c| c.is_uppercase());
    if has_inner_upper {
        return token.to_string();
    }
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Clean a title: de-shout fully upper-case strings, then title-case every
/// token that does not carry an inner capital. Whitespace collapses to
/// single spaces.
pub fn clean_title(s: &str) -> String {
    let s = normalize_spaces(s);
    let s = s.trim();
    if s.is_empty() {
        return String::new();
    }
    let has_lower = s.chars().any(|c| c.is_lowercase());
    let lowered;
    let source = if !has_lower && s.chars().any(|c| c.is_uppercase()) {
        lowered = s.to_lowercase();
        lowered.as_str()
    } else {
        s
    };
    source
        .split_whitespace()
        .map(capitalize_token)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Clean a person name of the form `Family, Given` (or a standalone name).
///
/// Each token on either side of the first comma is title-cased; initials
/// ending in `.` keep their dot. Callers strip `et al` before calling.
pub fn clean_name(s: &str) -> String {
    let s = normalize_spaces(s);
    let s = s.trim();
    if s.is_empty() {
        return String::new();
    }
    match s.split_once(',') {
        Some((family, given)) => {
            let family = clean_name_part(family);
            let given = clean_name_part(given);
            if family.is_empty() {
                given
            } else if given.is_empty() {
                family
            } else {
                format!("{family}, {given}")
            }
        }
        None => clean_name_part(s),
    }
}

fn clean_name_part(part: &str) -> String {
    part.split_whitespace()
        .map(capitalize_token)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip characters that carry no bibliographic meaning.
///
/// Unescapes common HTML entities, unifies hyphens, drops `[]{}()?;,`,
/// keeps `.` only when it follows a letter (initials survive, stray dots
/// do not) and collapses runs of whitespace.
pub fn remove_unwanted_characters(s: &str) -> String {
    let s = unescape_html(s);
    let s = normalize_hyphens(&s);
    let s = normalize_spaces(&s);
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        match c {
            '[' | ']' | '{' | '}' | '(' | ')' | '?' | ';' | ',' => {}
            '.' => {
                if prev.map(|p| p.is_alphabetic()).unwrap_or(false) {
                    out.push('.');
                }
            }
            _ => out.push(c),
        }
        prev = Some(c);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unescape the HTML entities that show up in harvested metadata.
fn unescape_html(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphens_unify_to_ascii() {
        assert_eq!(normalize_hyphens("12\u{2013}34"), "12-34");
        assert_eq!(normalize_hyphens("a\u{2014}b\u{2212}c"), "a-b-c");
    }

    #[test]
    fn hyphens_idempotent() {
        let once = normalize_hyphens("1\u{2010}2");
        assert_eq!(normalize_hyphens(&once), once);
    }

    #[test]
    fn spaces_unify_to_ascii() {
        assert_eq!(normalize_spaces("a\u{00A0}b\tc"), "a b c");
    }

    #[test]
    fn title_deshouts_all_caps() {
        assert_eq!(clean_title("A STUDY OF THINGS"), "A Study Of Things");
    }

    #[test]
    fn title_preserves_acronyms() {
        assert_eq!(
            clean_title("the FaBiO and CiTO ontologies"),
            "The FaBiO And CiTO Ontologies"
        );
        assert_eq!(clean_title("mRNA translation"), "mRNA Translation");
    }

    #[test]
    fn title_idempotent() {
        let once = clean_title("SHOUTED title WITH mRNA");
        assert_eq!(clean_title(&once), once);
    }

    #[test]
    fn title_collapses_whitespace() {
        assert_eq!(clean_title("hello   world"), "Hello World");
    }

    #[test]
    fn name_family_given() {
        assert_eq!(clean_name("smith, john"), "Smith, John");
        assert_eq!(clean_name("van den berg, J."), "Van Den Berg, J.");
    }

    #[test]
    fn name_initials_keep_dot() {
        assert_eq!(clean_name("doe, j. r."), "Doe, J. R.");
    }

    #[test]
    fn name_family_only() {
        assert_eq!(clean_name("doe,"), "Doe");
        assert_eq!(clean_name("world health organization"), "World Health Organization");
    }

    #[test]
    fn name_preserves_inner_capitals() {
        assert_eq!(clean_name("McDonald, Ronald"), "McDonald, Ronald");
    }

    #[test]
    fn name_idempotent() {
        let once = clean_name("mcARTHUR, jane");
        assert_eq!(clean_name(&once), once);
    }

    #[test]
    fn unwanted_characters_dropped() {
        assert_eq!(
            remove_unwanted_characters("A (short) title; really?"),
            "A short title really"
        );
    }

    #[test]
    fn dot_kept_after_letter_only() {
        assert_eq!(remove_unwanted_characters("J. Doe ."), "J. Doe");
    }

    #[test]
    fn html_entities_unescaped() {
        assert_eq!(remove_unwanted_characters("salt &amp; pepper"), "salt & pepper");
    }

    #[test]
    fn unwanted_idempotent() {
        let once = remove_unwanted_characters("odd [input] &amp; {stuff}, ok?");
        assert_eq!(remove_unwanted_characters(&once), once);
    }
}
