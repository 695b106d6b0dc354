use crate::validation::policy::DomainPolicy;
use std::sync::Arc;
use textdistance::str::damerau_levenshtein;
use tracing::debug;

/// Similarity of two domains in `[0, 1]`: one minus the Damerau-Levenshtein
/// distance normalized by the longer length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    let distance = damerau_levenshtein(a, b).min(longest);
    (longest - distance) as f64 / longest as f64
}

/// # Suggestion Engine
///
/// Proposes the closest well-known provider for a domain that looks like a
/// typo of one, and completes partially typed domains.
#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    policy: Arc<DomainPolicy>,
}

impl SuggestionEngine {
    pub fn new(policy: Arc<DomainPolicy>) -> Self {
        Self { policy }
    }

    /// Returns `local@best` when `domain` is not well-known and its best match
    /// scores at least the configured threshold. Ties go to the earliest domain
    /// in configured order.
    pub fn suggest(&self, local: &str, domain: &str) -> Option<String> {
        if self.policy.is_well_known(domain) {
            return None;
        }

        let (best, score) = self.closest_domain(domain)?;
        if score < self.policy.suggestion_threshold() {
            debug!(domain, best, score, "closest provider below threshold");
            return None;
        }

        debug!(domain, best, score, "suggesting provider");
        Some(format!("{local}@{best}"))
    }

    /// Best-scoring well-known domain for `domain`, with its similarity.
    pub fn closest_domain(&self, domain: &str) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for candidate in self.policy.well_known_domains() {
            let score = similarity(domain, candidate);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((candidate.as_str(), score));
            }
        }
        best
    }

    /// Completes the part after `@` against well-known domains by prefix.
    ///
    /// Returns nothing unless `text` contains `@` followed by at least one
    /// character.
    pub fn completions(&self, text: &str) -> Vec<String> {
        let Some((local, partial)) = text.split_once('@') else {
            return Vec::new();
        };
        if partial.is_empty() {
            return Vec::new();
        }

        self.policy
            .well_known_domains()
            .iter()
            .filter(|domain| domain.starts_with(partial))
            .map(|domain| format!("{local}@{domain}"))
            .collect()
    }
}
