//! The closed set of recognised identifier schemes and their per-scheme
//! normalisation and validation rules.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::checksum;

/// A recognised external identifier scheme.
///
/// `omid:` tokens are internal meta-ids, handled by the curator, and are
/// deliberately not part of this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Doi,
    Issn,
    Isbn,
    Orcid,
    Pmid,
    Pmcid,
    Viaf,
    Ror,
    Wikidata,
    Wikipedia,
    Jid,
    Url,
    Crossref,
    Openalex,
    Arxiv,
}

static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());
static ISSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{3}[\dX]$").unwrap());
static ISBN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").unwrap());
static ORCID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").unwrap());
static PMID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9]\d*$").unwrap());
static PMCID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^PMC\d+$").unwrap());
static VIAF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static ROR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0[a-z0-9]{8}$").unwrap());
static WIKIDATA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q\d+$").unwrap());
static JID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9.\-]*$").unwrap());
static CROSSREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static OPENALEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[WAISPC]\d+$").unwrap());
static ARXIV_NEW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").unwrap());
static ARXIV_OLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z-]+(\.[a-z]{2})?/\d{7}(v\d+)?$").unwrap());

impl Scheme {
    /// All schemes, in the order used for deterministic output.
    pub const ALL: [Scheme; 15] = [
        Scheme::Doi,
        Scheme::Issn,
        Scheme::Isbn,
        Scheme::Orcid,
        Scheme::Pmid,
        Scheme::Pmcid,
        Scheme::Viaf,
        Scheme::Ror,
        Scheme::Wikidata,
        Scheme::Wikipedia,
        Scheme::Jid,
        Scheme::Url,
        Scheme::Crossref,
        Scheme::Openalex,
        Scheme::Arxiv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Doi => "doi",
            Scheme::Issn => "issn",
            Scheme::Isbn => "isbn",
            Scheme::Orcid => "orcid",
            Scheme::Pmid => "pmid",
            Scheme::Pmcid => "pmcid",
            Scheme::Viaf => "viaf",
            Scheme::Ror => "ror",
            Scheme::Wikidata => "wikidata",
            Scheme::Wikipedia => "wikipedia",
            Scheme::Jid => "jid",
            Scheme::Url => "url",
            Scheme::Crossref => "crossref",
            Scheme::Openalex => "openalex",
            Scheme::Arxiv => "arxiv",
        }
    }

    pub fn parse(s: &str) -> Option<Scheme> {
        match s.to_ascii_lowercase().as_str() {
            "doi" => Some(Scheme::Doi),
            "issn" => Some(Scheme::Issn),
            "isbn" => Some(Scheme::Isbn),
            "orcid" => Some(Scheme::Orcid),
            "pmid" => Some(Scheme::Pmid),
            "pmcid" => Some(Scheme::Pmcid),
            "viaf" => Some(Scheme::Viaf),
            "ror" => Some(Scheme::Ror),
            "wikidata" => Some(Scheme::Wikidata),
            "wikipedia" => Some(Scheme::Wikipedia),
            "jid" => Some(Scheme::Jid),
            "url" => Some(Scheme::Url),
            "crossref" => Some(Scheme::Crossref),
            "openalex" => Some(Scheme::Openalex),
            "arxiv" => Some(Scheme::Arxiv),
            _ => None,
        }
    }

    /// Normalise a raw value to its canonical form, or reject it.
    ///
    /// Idempotent: `normalise(normalise(x)) == normalise(x)`. With
    /// `with_prefix` the result carries the `scheme:` prefix.
    pub fn normalise(&self, raw: &str, with_prefix: bool) -> Option<String> {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix(&format!("{}:", self.as_str()))
            .unwrap_or(raw)
            .trim();
        if raw.is_empty() {
            return None;
        }
        let canonical = match self {
            Scheme::Doi => normalise_doi(raw),
            Scheme::Issn => normalise_issn(raw),
            Scheme::Isbn => normalise_isbn(raw),
            Scheme::Orcid => normalise_orcid(raw),
            Scheme::Pmid => normalise_pmid(raw),
            Scheme::Pmcid => normalise_pmcid(raw),
            Scheme::Viaf => normalise_digits(raw),
            Scheme::Ror => normalise_ror(raw),
            Scheme::Wikidata => normalise_wikidata(raw),
            Scheme::Wikipedia => normalise_wikipedia(raw),
            Scheme::Jid => Some(raw.to_lowercase()),
            Scheme::Url => normalise_url(raw),
            Scheme::Crossref => normalise_digits(raw),
            Scheme::Openalex => normalise_openalex(raw),
            Scheme::Arxiv => normalise_arxiv(raw),
        }?;
        if with_prefix {
            Some(format!("{}:{}", self.as_str(), canonical))
        } else {
            Some(canonical)
        }
    }

    /// Structural validation of a canonical value. Regex only, no I/O.
    pub fn syntax_ok(&self, canonical: &str) -> bool {
        match self {
            Scheme::Doi => DOI_RE.is_match(canonical),
            Scheme::Issn => ISSN_RE.is_match(canonical),
            Scheme::Isbn => ISBN_RE.is_match(canonical),
            Scheme::Orcid => ORCID_RE.is_match(canonical),
            Scheme::Pmid => PMID_RE.is_match(canonical),
            Scheme::Pmcid => PMCID_RE.is_match(canonical),
            Scheme::Viaf => VIAF_RE.is_match(canonical),
            Scheme::Ror => ROR_RE.is_match(canonical),
            Scheme::Wikidata => WIKIDATA_RE.is_match(canonical),
            Scheme::Wikipedia => !canonical.is_empty() && !canonical.contains(char::is_whitespace),
            Scheme::Jid => JID_RE.is_match(canonical),
            Scheme::Url => !canonical.is_empty() && !canonical.contains(char::is_whitespace),
            Scheme::Crossref => CROSSREF_RE.is_match(canonical),
            Scheme::Openalex => OPENALEX_RE.is_match(canonical),
            Scheme::Arxiv => ARXIV_NEW_RE.is_match(canonical) || ARXIV_OLD_RE.is_match(canonical),
        }
    }

    /// Check-digit validation where the scheme defines one; `true` elsewhere.
    pub fn check_digit(&self, canonical: &str) -> bool {
        match self {
            Scheme::Issn => checksum::issn_check(&canonical.replace('-', "")),
            Scheme::Isbn => match canonical.len() {
                10 => checksum::isbn10_check(canonical),
                13 => checksum::isbn13_check(canonical),
                _ => false,
            },
            Scheme::Orcid => checksum::orcid_check(canonical),
            _ => true,
        }
    }

    /// Whether an [`exists`](crate::probe::ProbeClient::exists) probe is
    /// defined for this scheme.
    pub fn probeable(&self) -> bool {
        matches!(
            self,
            Scheme::Doi | Scheme::Orcid | Scheme::Pmid | Scheme::Pmcid | Scheme::Ror
        )
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scheme::parse(s).ok_or(())
    }
}

/// Strip a URL prefix from `raw` if any of `prefixes` matches,
/// case-insensitively.
fn strip_any_prefix<'a>(raw: &'a str, prefixes: &[&str]) -> &'a str {
    let lower = raw.to_ascii_lowercase();
    for p in prefixes {
        if lower.starts_with(p) {
            return &raw[p.len()..];
        }
    }
    raw
}

fn normalise_doi(raw: &str) -> Option<String> {
    let raw = strip_any_prefix(
        raw,
        &[
            "https://doi.org/",
            "http://doi.org/",
            "https://dx.doi.org/",
            "http://dx.doi.org/",
            "doi.org/",
        ],
    );
    let doi = raw.trim().trim_end_matches(['.', ',', ';']).to_lowercase();
    if doi.is_empty() { None } else { Some(doi) }
}

fn normalise_issn(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .collect::<String>()
        .to_uppercase();
    if digits.len() != 8 {
        return None;
    }
    Some(format!("{}-{}", &digits[..4], &digits[4..]))
}

fn normalise_isbn(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .collect::<String>()
        .to_uppercase();
    match digits.len() {
        10 | 13 => Some(digits),
        _ => None,
    }
}

fn normalise_orcid(raw: &str) -> Option<String> {
    let raw = strip_any_prefix(raw, &["https://orcid.org/", "http://orcid.org/", "orcid.org/"]);
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .collect::<String>()
        .to_uppercase();
    if digits.len() != 16 {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}",
        &digits[..4],
        &digits[4..8],
        &digits[8..12],
        &digits[12..]
    ))
}

fn normalise_pmid(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalise_pmcid(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("PMC{digits}"))
    }
}

fn normalise_digits(raw: &str) -> Option<String> {
    let raw = raw.rsplit('/').next().unwrap_or(raw);
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

fn normalise_ror(raw: &str) -> Option<String> {
    // The canonical form is the trailing nine-character code.
    let code = raw.rsplit('/').next().unwrap_or(raw).trim().to_lowercase();
    if code.is_empty() { None } else { Some(code) }
}

fn normalise_wikidata(raw: &str) -> Option<String> {
    let raw = raw.rsplit('/').next().unwrap_or(raw).trim();
    let upper = raw.to_uppercase();
    if upper.is_empty() { None } else { Some(upper) }
}

fn normalise_wikipedia(raw: &str) -> Option<String> {
    let raw = match raw.find("/wiki/") {
        Some(pos) => &raw[pos + "/wiki/".len()..],
        None => raw,
    };
    let title = raw.trim().replace(' ', "_");
    if title.is_empty() { None } else { Some(title) }
}

fn normalise_url(raw: &str) -> Option<String> {
    let raw = strip_any_prefix(raw, &["https://", "http://"]);
    let raw = strip_any_prefix(raw, &["www."]);
    let url = raw.trim_end_matches('/').to_lowercase();
    if url.is_empty() {
        return None;
    }
    // Conservative percent-encoding: only characters that cannot appear
    // verbatim in an IRI reference.
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            ' ' => out.push_str("%20"),
            '"' => out.push_str("%22"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            '\\' => out.push_str("%5C"),
            '^' => out.push_str("%5E"),
            '`' => out.push_str("%60"),
            '|' => out.push_str("%7C"),
            _ => out.push(c),
        }
    }
    Some(out)
}

fn normalise_openalex(raw: &str) -> Option<String> {
    let raw = raw.rsplit('/').next().unwrap_or(raw).trim();
    let upper = raw.to_uppercase();
    if upper.is_empty() { None } else { Some(upper) }
}

fn normalise_arxiv(raw: &str) -> Option<String> {
    let raw = strip_any_prefix(
        raw,
        &["https://arxiv.org/abs/", "http://arxiv.org/abs/", "arxiv.org/abs/"],
    );
    let id = raw.trim();
    if id.is_empty() {
        return None;
    }
    // Old-format archive names are lower-case; version suffixes keep their v.
    if id.contains('/') {
        Some(id.to_lowercase())
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doi_strips_url_and_lowercases() {
        assert_eq!(
            Scheme::Doi.normalise("https://doi.org/10.1162/QSS_a_00023", false),
            Some("10.1162/qss_a_00023".into())
        );
        assert_eq!(
            Scheme::Doi.normalise("doi:10.1000/182.", false),
            Some("10.1000/182".into())
        );
    }

    #[test]
    fn doi_with_prefix() {
        assert_eq!(
            Scheme::Doi.normalise("10.1000/182", true),
            Some("doi:10.1000/182".into())
        );
    }

    #[test]
    fn orcid_grouped_uppercase() {
        assert_eq!(
            Scheme::Orcid.normalise("https://orcid.org/0000000216942 33x", false),
            Some("0000-0002-1694-233X".into())
        );
    }

    #[test]
    fn issn_grouped() {
        assert_eq!(Scheme::Issn.normalise("0378 5955", false), Some("0378-5955".into()));
        assert_eq!(Scheme::Issn.normalise("03785955123", false), None);
    }

    #[test]
    fn isbn_stripped() {
        assert_eq!(
            Scheme::Isbn.normalise("978-0-321-12521-7", false),
            Some("9780321125217".into())
        );
    }

    #[test]
    fn pmid_leading_zeros_stripped() {
        assert_eq!(Scheme::Pmid.normalise("000123", false), Some("123".into()));
        assert_eq!(Scheme::Pmid.normalise("0", false), None);
    }

    #[test]
    fn pmcid_prefixed() {
        assert_eq!(Scheme::Pmcid.normalise("pmc7554788", false), Some("PMC7554788".into()));
    }

    #[test]
    fn ror_trailing_code() {
        assert_eq!(
            Scheme::Ror.normalise("https://ror.org/02mhbdp94", false),
            Some("02mhbdp94".into())
        );
        assert!(Scheme::Ror.syntax_ok("02mhbdp94"));
        assert!(!Scheme::Ror.syntax_ok("12mhbdp94"));
    }

    #[test]
    fn url_stripped_and_encoded() {
        assert_eq!(
            Scheme::Url.normalise("https://www.Example.org/Path/", false),
            Some("example.org/path".into())
        );
        assert_eq!(
            Scheme::Url.normalise("example.org/a b", false),
            Some("example.org/a%20b".into())
        );
    }

    #[test]
    fn wikidata_uppercased() {
        assert_eq!(
            Scheme::Wikidata.normalise("https://www.wikidata.org/wiki/q5", false),
            Some("Q5".into())
        );
    }

    #[test]
    fn arxiv_forms() {
        assert!(Scheme::Arxiv.syntax_ok("2301.12345"));
        assert!(Scheme::Arxiv.syntax_ok("1905.07890v2"));
        assert!(Scheme::Arxiv.syntax_ok("cond-mat/9901001"));
        assert!(!Scheme::Arxiv.syntax_ok("2301.123"));
    }

    #[test]
    fn normalise_is_idempotent() {
        let cases = [
            (Scheme::Doi, "HTTPS://DOI.ORG/10.1/AbC"),
            (Scheme::Orcid, "0000-0002-1694-233x"),
            (Scheme::Issn, "03785955"),
            (Scheme::Isbn, "978-0-321-12521-7"),
            (Scheme::Url, "https://www.example.org/x/"),
            (Scheme::Pmcid, "PMC123"),
            (Scheme::Ror, "https://ror.org/02mhbdp94"),
        ];
        for (scheme, raw) in cases {
            let once = scheme.normalise(raw, false).unwrap();
            assert_eq!(scheme.normalise(&once, false), Some(once.clone()), "{scheme}");
        }
    }

    #[test]
    fn scheme_round_trip() {
        for scheme in Scheme::ALL {
            assert_eq!(Scheme::parse(scheme.as_str()), Some(scheme));
        }
    }
}
