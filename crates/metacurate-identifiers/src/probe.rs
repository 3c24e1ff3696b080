//! Optional live existence probes against the authorities behind a scheme.
//!
//! Probes are off by default. Every probe makes up to three attempts with a
//! 30 s read timeout and a 5 s pause after a connection error. A 404 is a
//! definitive "does not exist"; any other success status counts as existing.

use std::time::Duration;

use thiserror::Error;

use crate::scheme::Scheme;

const ATTEMPTS: u32 = 3;
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("no probe endpoint for scheme {0}")]
    Unsupported(Scheme),
    #[error("probe exhausted retries: {0}")]
    Exhausted(String),
}

/// HTTP client for existence probes.
pub struct ProbeClient {
    client: reqwest::Client,
}

impl Default for ProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the probe URL for a canonical value.
    fn probe_url(scheme: Scheme, canonical: &str) -> Option<String> {
        match scheme {
            Scheme::Doi => Some(format!(
                "https://doi.org/api/handles/{}",
                urlencoding::encode(canonical)
            )),
            Scheme::Orcid => Some(format!("https://pub.orcid.org/v3.0/{canonical}")),
            Scheme::Pmid => Some(format!(
                "https://pubmed.ncbi.nlm.nih.gov/{canonical}/"
            )),
            Scheme::Pmcid => Some(format!(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/{canonical}/"
            )),
            Scheme::Ror => Some(format!("https://api.ror.org/organizations/{canonical}")),
            _ => None,
        }
    }

    /// Probe whether `canonical` is known to its authority.
    pub async fn exists(&self, scheme: Scheme, canonical: &str) -> Result<bool, ProbeError> {
        let url = Self::probe_url(scheme, canonical).ok_or(ProbeError::Unsupported(scheme))?;
        let mut last_error = String::new();
        for attempt in 1..=ATTEMPTS {
            let result = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .header("User-Agent", "metacurate/0.1")
                .timeout(READ_TIMEOUT)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().as_u16() == 404 => return Ok(false),
                Ok(resp) if resp.status().is_success() => return Ok(true),
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    tracing::debug!(%url, attempt, status = %resp.status(), "probe retry");
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(%url, attempt, error = %e, "probe connection error");
                    if e.is_connect() && attempt < ATTEMPTS {
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        }
        Err(ProbeError::Exhausted(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_urls_only_for_probeable_schemes() {
        for scheme in Scheme::ALL {
            assert_eq!(
                ProbeClient::probe_url(scheme, "x").is_some(),
                scheme.probeable(),
                "{scheme}"
            );
        }
    }
}
