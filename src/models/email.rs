use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an address failed structural validation. Checks run in the order the
/// variants are declared and the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    TooShort,
    FormatError,
    UppercaseNotAllowed,
    DisposableDomain,
    TldNotAllowed,
}

impl RejectionReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::TooShort => "too short",
            RejectionReason::FormatError => "format error",
            RejectionReason::UppercaseNotAllowed => "uppercase not allowed",
            RejectionReason::DisposableDomain => "disposable domain blocked",
            RejectionReason::TldNotAllowed => "TLD not allowed",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Local part and domain of an accepted address. Both are lowercase and the
/// domain always contains a dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub local: String,
    pub domain: String,
}

/// # Validation Outcome
///
/// Result of the synchronous syntax and policy checks for one address.
///
/// ## Fields
/// - `rejection`: the first failing check, `None` when the address is accepted
/// - `suggestion`: advisory `local@domain` typo correction, accepted addresses only
/// - `parsed`: the split address, accepted addresses only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub rejection: Option<RejectionReason>,
    pub suggestion: Option<String>,
    pub parsed: Option<ParsedAddress>,
}

impl ValidationOutcome {
    pub fn rejected(reason: RejectionReason) -> Self {
        Self {
            rejection: Some(reason),
            suggestion: None,
            parsed: None,
        }
    }

    pub fn accepted(parsed: ParsedAddress, suggestion: Option<String>) -> Self {
        Self {
            rejection: None,
            suggestion,
            parsed: Some(parsed),
        }
    }

    pub fn is_structurally_valid(&self) -> bool {
        self.rejection.is_none()
    }

    /// Human-readable rejection reason, empty for accepted addresses.
    pub fn reason(&self) -> &'static str {
        self.rejection.map(|r| r.message()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_outcome() {
        let outcome = ValidationOutcome::rejected(RejectionReason::TldNotAllowed);
        assert!(!outcome.is_structurally_valid());
        assert_eq!(outcome.reason(), "TLD not allowed");
        assert!(outcome.parsed.is_none());
        assert!(outcome.suggestion.is_none());
    }

    #[test]
    fn test_accepted_outcome_has_empty_reason() {
        let outcome = ValidationOutcome::accepted(
            ParsedAddress {
                local: "abc".to_string(),
                domain: "gmail.com".to_string(),
            },
            None,
        );
        assert!(outcome.is_structurally_valid());
        assert_eq!(outcome.reason(), "");
    }

    #[test]
    fn test_reason_messages() {
        assert_eq!(RejectionReason::TooShort.to_string(), "too short");
        assert_eq!(RejectionReason::FormatError.to_string(), "format error");
        assert_eq!(
            RejectionReason::UppercaseNotAllowed.to_string(),
            "uppercase not allowed"
        );
        assert_eq!(
            RejectionReason::DisposableDomain.to_string(),
            "disposable domain blocked"
        );
    }
}
