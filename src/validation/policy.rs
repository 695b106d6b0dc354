use crate::config::ValidatorConfig;
use std::collections::HashSet;

/// # Known Domain Set
///
/// Policy tables consulted by the validator and the suggestion engine. Built
/// once from [`ValidatorConfig`] and shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    allowed_tlds: HashSet<String>,
    well_known_domains: Vec<String>,
    disposable_domains: HashSet<String>,
    suggestion_threshold: f64,
}

impl DomainPolicy {
    pub fn from_config(config: &ValidatorConfig) -> Self {
        let mut seen = HashSet::new();
        let well_known_domains = config
            .well_known_domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty() && seen.insert(d.clone()))
            .collect();

        Self {
            allowed_tlds: normalize(&config.allowed_tlds),
            well_known_domains,
            disposable_domains: normalize(&config.disposable_domains),
            suggestion_threshold: config.suggestion_threshold,
        }
    }

    pub fn is_disposable(&self, domain: &str) -> bool {
        self.disposable_domains.contains(domain)
    }

    /// Checks the last dot-delimited label of `domain` against the allowed set.
    pub fn is_tld_allowed(&self, domain: &str) -> bool {
        domain
            .rsplit('.')
            .next()
            .is_some_and(|tld| self.allowed_tlds.contains(tld))
    }

    pub fn is_well_known(&self, domain: &str) -> bool {
        self.well_known_domains.iter().any(|d| d == domain)
    }

    /// Well-known provider domains in configured order.
    pub fn well_known_domains(&self) -> &[String] {
        &self.well_known_domains
    }

    pub fn suggestion_threshold(&self) -> f64 {
        self.suggestion_threshold
    }
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self::from_config(&ValidatorConfig::default())
    }
}

fn normalize(items: &[String]) -> HashSet<String> {
    items
        .iter()
        .map(|item| item.trim().trim_start_matches('.').to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
