//! Check-digit algorithms for the schemes that define one.

/// ISSN mod-11 check over `NNNNNNNX` (8 characters, hyphen already stripped).
pub fn issn_check(digits: &str) -> bool {
    let chars: Vec<char> = digits.chars().collect();
    if chars.len() != 8 {
        return false;
    }
    let mut sum = 0u32;
    for (i, &c) in chars.iter().take(7).enumerate() {
        let d = match c.to_digit(10) {
            Some(d) => d,
            None => return false,
        };
        sum += d * (8 - i as u32);
    }
    let expected = (11 - sum % 11) % 11;
    match chars[7] {
        'X' => expected == 10,
        c => c.to_digit(10) == Some(expected),
    }
}

/// ISBN-10 checksum (last character may be `X`).
pub fn isbn10_check(isbn: &str) -> bool {
    let chars: Vec<char> = isbn.chars().collect();
    if chars.len() != 10 {
        return false;
    }
    let mut sum = 0u32;
    for (i, &c) in chars.iter().enumerate() {
        let value = if c == 'X' {
            if i != 9 {
                return false;
            }
            10
        } else {
            match c.to_digit(10) {
                Some(d) => d,
                None => return false,
            }
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

/// ISBN-13 checksum (digits only).
pub fn isbn13_check(isbn: &str) -> bool {
    if isbn.len() != 13 || !isbn.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = isbn
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let d = c.to_digit(10).unwrap();
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    sum % 10 == 0
}

/// ORCID ISO 7064 mod 11-2 check over `NNNN-NNNN-NNNN-NNNX`.
pub fn orcid_check(orcid: &str) -> bool {
    let digits: Vec<char> = orcid.chars().filter(|c| *c != '-').collect();
    if digits.len() != 16 {
        return false;
    }
    let mut total = 0u32;
    for &c in digits.iter().take(15) {
        let d = match c.to_digit(10) {
            Some(d) => d,
            None => return false,
        };
        total = (total + d) * 2;
    }
    let remainder = total % 11;
    let expected = (12 - remainder) % 11;
    match digits[15] {
        'X' => expected == 10,
        c => c.to_digit(10) == Some(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issn_valid() {
        assert!(issn_check("03785955")); // 0378-5955
        assert!(issn_check("2090424X")); // 2090-424X
    }

    #[test]
    fn issn_invalid() {
        assert!(!issn_check("03785954"));
        assert!(!issn_check("1234"));
    }

    #[test]
    fn isbn10_valid() {
        assert!(isbn10_check("0306406152"));
        assert!(isbn10_check("080442957X"));
    }

    #[test]
    fn isbn10_invalid() {
        assert!(!isbn10_check("0306406151"));
        assert!(!isbn10_check("030640615X"));
    }

    #[test]
    fn isbn13_valid() {
        assert!(isbn13_check("9780321125217"));
        assert!(isbn13_check("9780306406157"));
    }

    #[test]
    fn isbn13_invalid() {
        assert!(!isbn13_check("9780321125218"));
    }

    #[test]
    fn orcid_valid() {
        assert!(orcid_check("0000-0002-1825-0097"));
        assert!(orcid_check("0000-0002-1694-233X"));
    }

    #[test]
    fn orcid_invalid() {
        assert!(!orcid_check("0000-0002-1825-0098"));
        assert!(!orcid_check("0000-0002-1825"));
    }
}
