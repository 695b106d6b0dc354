use crate::models::email::{ParsedAddress, RejectionReason, ValidationOutcome};
use crate::validation::policy::DomainPolicy;
use crate::validation::suggestion::SuggestionEngine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Minimum length, in characters, of a trimmed address.
pub const MIN_ADDRESS_LENGTH: usize = 6;

static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<local>[a-z][a-z0-9_.]*?)@(?P<domain>[a-z]+\.[a-z]{2,})$")
        .expect("address pattern is a valid regex")
});

/// `true` when the trimmed address is long enough to be considered at all.
pub fn meets_min_length(trimmed: &str) -> bool {
    trimmed.chars().count() >= MIN_ADDRESS_LENGTH
}

/// Matches the structural pattern and splits the address.
///
/// The pattern only knows lowercase, and is applied to the lowercased text so
/// that letter case is left to [`contains_uppercase`]. The returned parts are
/// therefore always lowercase.
pub fn match_structure(trimmed: &str) -> Option<ParsedAddress> {
    let folded = trimmed.to_lowercase();
    let captures = ADDRESS_PATTERN.captures(&folded)?;
    Some(ParsedAddress {
        local: captures["local"].to_string(),
        domain: captures["domain"].to_string(),
    })
}

pub fn contains_uppercase(text: &str) -> bool {
    text.chars().any(char::is_uppercase)
}

/// # Syntax & Policy Validator
///
/// Runs the structural checks in fixed order, stopping at the first failure:
/// 1. trimmed length of at least [`MIN_ADDRESS_LENGTH`]
/// 2. structural pattern (`local@label.tld`, lowercase letters, digits, `_` and `.`)
/// 3. no uppercase characters anywhere in the input
/// 4. domain not in the disposable blocklist
/// 5. top-level domain in the allowed set
///
/// Accepted addresses get an advisory typo suggestion from the
/// [`SuggestionEngine`]. The validator holds no mutable state, so the same input
/// always yields the same outcome.
///
/// # Examples
/// ```
/// use email_gatekeeper::validation::syntax::Validator;
///
/// let validator = Validator::default();
/// let outcome = validator.validate("abc@gmial.com");
/// assert!(outcome.is_structurally_valid());
/// assert_eq!(outcome.suggestion.as_deref(), Some("abc@gmail.com"));
///
/// assert_eq!(validator.validate("Abc@gmail.com").reason(), "uppercase not allowed");
/// ```
#[derive(Debug, Clone)]
pub struct Validator {
    policy: Arc<DomainPolicy>,
    suggestions: SuggestionEngine,
}

impl Validator {
    pub fn new(policy: Arc<DomainPolicy>) -> Self {
        let suggestions = SuggestionEngine::new(Arc::clone(&policy));
        Self {
            policy,
            suggestions,
        }
    }

    pub fn validate(&self, text: &str) -> ValidationOutcome {
        match self.check(text) {
            Ok(parsed) => {
                let suggestion = self.suggestions.suggest(&parsed.local, &parsed.domain);
                ValidationOutcome::accepted(parsed, suggestion)
            }
            Err(reason) => {
                debug!(%reason, "address rejected");
                ValidationOutcome::rejected(reason)
            }
        }
    }

    pub fn suggestions(&self) -> &SuggestionEngine {
        &self.suggestions
    }

    fn check(&self, text: &str) -> Result<ParsedAddress, RejectionReason> {
        let trimmed = text.trim();
        if !meets_min_length(trimmed) {
            return Err(RejectionReason::TooShort);
        }

        let parsed = match_structure(trimmed).ok_or(RejectionReason::FormatError)?;

        if contains_uppercase(text) {
            return Err(RejectionReason::UppercaseNotAllowed);
        }
        if self.policy.is_disposable(&parsed.domain) {
            return Err(RejectionReason::DisposableDomain);
        }
        if !self.policy.is_tld_allowed(&parsed.domain) {
            return Err(RejectionReason::TldNotAllowed);
        }

        Ok(parsed)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(DomainPolicy::default()))
    }
}
