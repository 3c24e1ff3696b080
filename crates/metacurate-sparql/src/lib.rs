//! Minimal read-only SPARQL client.
//!
//! Issues SELECT queries against a single endpoint and returns fully
//! materialised JSON result bindings, so the HTTP connection is released on
//! every path. Literal and IRI escaping lives here: callers hand over raw
//! values and never interpolate them into query text themselves.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const ATTEMPTS: u32 = 3;
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_millis(300);

#[derive(Error, Debug)]
pub enum SparqlError {
    #[error("endpoint unreachable after {ATTEMPTS} attempts: {0}")]
    Exhausted(String),
    #[error("malformed SPARQL results: {0}")]
    Malformed(String),
}

/// One variable binding in a result row.
#[derive(Debug, Clone, Deserialize)]
pub struct Term {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// One result row: variable name to bound term.
pub type Row = HashMap<String, Term>;

#[derive(Deserialize)]
struct ResultsEnvelope {
    results: ResultsBody,
}

#[derive(Deserialize)]
struct ResultsBody {
    bindings: Vec<Row>,
}

/// Escape a string for use inside a double-quoted SPARQL literal.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a quoted literal term.
pub fn literal(value: &str) -> String {
    format!("\"{}\"", escape_literal(value))
}

/// Render an IRI term, rejecting characters that would break out of the
/// angle brackets.
pub fn iri(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | ' ' | '{' | '}' | '|' | '^' | '`'))
        .collect();
    format!("<{cleaned}>")
}

/// SPARQL SELECT client bound to one endpoint.
pub struct SparqlClient {
    endpoint: String,
    client: reqwest::Client,
}

impl SparqlClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a SELECT query, retrying transient failures with exponential
    /// back-off (base 0.3 s, doubled per attempt, jittered).
    pub async fn select(&self, query: &str) -> Result<Vec<Row>, SparqlError> {
        let mut last_error = String::new();
        for attempt in 0..ATTEMPTS {
            if attempt > 0 {
                let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
                let jitter = Duration::from_millis(fastrand::u64(0..100));
                tokio::time::sleep(backoff + jitter).await;
            }
            let result = self
                .client
                .post(&self.endpoint)
                .header("Accept", "application/sparql-results+json")
                .header("User-Agent", "metacurate/0.1")
                .form(&[("query", query)])
                .timeout(READ_TIMEOUT)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    let envelope: ResultsEnvelope = resp
                        .json()
                        .await
                        .map_err(|e| SparqlError::Malformed(e.to_string()))?;
                    return Ok(envelope.results.bindings);
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    tracing::debug!(endpoint = %self.endpoint, attempt, status = %resp.status(),
                        "SPARQL retry");
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(endpoint = %self.endpoint, attempt, error = %e, "SPARQL retry");
                }
            }
        }
        Err(SparqlError::Exhausted(last_error))
    }
}
