use serde::{Deserialize, Serialize};

/// # Verification Outcome
///
/// What an MX lookup established about a domain.
///
/// - `Confirmed`: the lookup succeeded and returned at least one MX record
/// - `Absent`: the lookup succeeded and the domain has no MX records
/// - `Indeterminate`: the lookup could not be completed (timeout, network
///   failure, malformed response)
///
/// `Absent` and `Indeterminate` both report `false` from
/// [`has_mail_exchange_record`](Self::has_mail_exchange_record) and are
/// persisted identically in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationOutcome {
    Confirmed { records: usize },
    Absent,
    Indeterminate { reason: String },
}

impl VerificationOutcome {
    pub fn has_mail_exchange_record(&self) -> bool {
        matches!(self, VerificationOutcome::Confirmed { .. })
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, VerificationOutcome::Indeterminate { .. })
    }
}
