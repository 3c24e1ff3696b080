//! Memoised validation front-end over the scheme implementations.

use dashmap::DashMap;

use crate::probe::ProbeClient;
use crate::scheme::Scheme;

/// Process-wide identifier validator.
///
/// Validation results are memoised per `(scheme, raw)` pair, so repeated
/// mentions of the same identifier across a batch cost one computation (and
/// at most one network probe). The memo replaces the per-instance caches the
/// curation pipeline would otherwise have to thread around.
pub struct Registry {
    cache: DashMap<(Scheme, String), bool>,
    probe: Option<ProbeClient>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry that validates offline only (no existence probes).
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
            probe: None,
        }
    }

    /// A registry that additionally probes the network for existence on the
    /// schemes that support it.
    pub fn with_probes(probe: ProbeClient) -> Self {
        Self {
            cache: DashMap::new(),
            probe: Some(probe),
        }
    }

    /// Normalise a raw value for `scheme`. Pure passthrough to
    /// [`Scheme::normalise`], exposed here so callers only need the registry.
    pub fn normalise(&self, scheme: Scheme, raw: &str, with_prefix: bool) -> Option<String> {
        scheme.normalise(raw, with_prefix)
    }

    /// Full validation: normalise, syntax, check digit, and (when probes are
    /// configured) existence.
    ///
    /// A probe failure after retries counts as "unknown" and never turns an
    /// offline-valid identifier invalid.
    pub async fn is_valid(&self, scheme: Scheme, raw: &str) -> bool {
        let key = (scheme, raw.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }
        let valid = self.validate_uncached(scheme, raw).await;
        self.cache.insert(key, valid);
        valid
    }

    async fn validate_uncached(&self, scheme: Scheme, raw: &str) -> bool {
        let canonical = match scheme.normalise(raw, false) {
            Some(c) => c,
            None => return false,
        };
        if !scheme.syntax_ok(&canonical) || !scheme.check_digit(&canonical) {
            return false;
        }
        if let Some(probe) = &self.probe {
            if scheme.probeable() {
                match probe.exists(scheme, &canonical).await {
                    Ok(exists) => return exists,
                    Err(e) => {
                        tracing::warn!(scheme = %scheme, value = %canonical, error = %e,
                            "existence probe failed, treating as unknown");
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_validation() {
        let registry = Registry::new();
        assert!(registry.is_valid(Scheme::Doi, "10.1000/182").await);
        assert!(registry.is_valid(Scheme::Orcid, "0000-0002-1825-0097").await);
        assert!(!registry.is_valid(Scheme::Orcid, "0000-0002-1825-0098").await);
        assert!(!registry.is_valid(Scheme::Issn, "0378-5954").await);
    }

    #[tokio::test]
    async fn memoised_between_calls() {
        let registry = Registry::new();
        assert!(registry.is_valid(Scheme::Issn, "0378-5955").await);
        assert!(registry.is_valid(Scheme::Issn, "0378-5955").await);
        assert_eq!(registry.cache.len(), 1);
    }
}
