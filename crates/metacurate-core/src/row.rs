//! The CSV-facing row and the low-level field grammar: `scheme:value`
//! tokens, bracketed attributions and multi-person splitting.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use metacurate_identifiers::Scheme;

use crate::entity::MetaId;

/// One input/output row. All fields are strings, possibly empty; semantics
/// are defined by the curation pipeline, not the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub page: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub editor: String,
}

/// Bracketed attribution: `Name [scheme:value scheme:value ...]`.
static BRACKETED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(.*?)\s*\[\s*((?:[^\s]+:[^\s]+)(?:\s+[^\s]+:[^\s]+)*)\s*\]").unwrap()
});

/// A raw `scheme:value` token before registry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawToken {
    External { scheme: Scheme, value: String },
    Omid(MetaId),
    Unrecognised(String),
}

/// Parse a whitespace-separated list of `scheme:value` tokens.
pub fn parse_id_tokens(field: &str) -> Vec<RawToken> {
    field
        .split_whitespace()
        .map(|token| match token.split_once(':') {
            Some(("omid", rest)) => match MetaId::parse(rest) {
                Some(meta) => RawToken::Omid(meta),
                None => RawToken::Unrecognised(token.to_string()),
            },
            Some((scheme, value)) if !value.is_empty() => match Scheme::parse(scheme) {
                Some(scheme) => RawToken::External {
                    scheme,
                    value: value.to_string(),
                },
                None => RawToken::Unrecognised(token.to_string()),
            },
            _ => RawToken::Unrecognised(token.to_string()),
        })
        .collect()
}

/// Split a bracketed attribution into `(name, id tokens)`.
///
/// Without brackets the whole field is the name.
pub fn parse_bracketed(field: &str) -> (String, Vec<RawToken>) {
    match BRACKETED_RE.captures(field) {
        Some(caps) => {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            let tokens = parse_id_tokens(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            (name, tokens)
        }
        None => (field.trim().to_string(), Vec::new()),
    }
}

/// Split a multi-person field on `;`.
///
/// A semicolon splits only when it sits outside `[ ]` and, in the text that
/// follows, a comma (the `family, given` separator) occurs before the next
/// `[`. Semicolons that separate identifiers inside one bracket group never
/// split.
pub fn split_agents(field: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (pos, c) in field.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                let rest = &field[pos + 1..];
                let splits_here = match rest.find('[') {
                    Some(bracket) => rest[..bracket].contains(','),
                    None => true,
                };
                if splits_here {
                    let part = field[start..pos].trim();
                    if !part.is_empty() {
                        out.push(part.to_string());
                    }
                    start = pos + 1;
                }
            }
            _ => {}
        }
    }
    let tail = field[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}
