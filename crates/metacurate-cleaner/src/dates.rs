//! Date narrowing: coerce free-form date strings to the longest valid
//! `YYYY[-MM[-DD]]` prefix.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize_hyphens;

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,4})(?:-(\d{1,2})(?:-(\d{1,2}))?)?").unwrap());

/// Number of days in `month` of `year` (proleptic Gregorian).
fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Coerce `s` to the narrowest valid ISO date prefix.
///
/// An invalid day truncates to `YYYY-MM`; an invalid month truncates to
/// `YYYY`; a year outside `[0001, 9999]` yields the empty string. The
/// output is zero-padded, so a valid ISO input round-trips unchanged.
pub fn clean_date(s: &str) -> String {
    let s = normalize_hyphens(s);
    let caps = match DATE_RE.captures(&s) {
        Some(c) => c,
        None => return String::new(),
    };
    let year: u32 = match caps.get(1).and_then(|m| m.as_str().parse().ok()) {
        Some(y) if (1..=9999).contains(&y) => y,
        _ => return String::new(),
    };
    let month: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
    let month = match month {
        Some(m) if (1..=12).contains(&m) => m,
        Some(_) => return format!("{year:04}"),
        None => return format!("{year:04}"),
    };
    let day: Option<u32> = caps.get(3).and_then(|m| m.as_str().parse().ok());
    match day {
        Some(d) if d >= 1 && d <= days_in_month(year, month) => {
            format!("{year:04}-{month:02}-{day:02}", day = d)
        }
        Some(_) => format!("{year:04}-{month:02}"),
        None => format!("{year:04}-{month:02}"),
    }
}
