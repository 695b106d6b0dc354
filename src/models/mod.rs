/// Persisted validation attempts, the history filter and derived statistics.
pub mod audit;

/// # Structural Validation Types
///
/// [`ValidationOutcome`](email::ValidationOutcome) is produced fresh for every
/// call and is immutable once returned. Rejections are plain values carrying a
/// [`RejectionReason`](email::RejectionReason), never errors.
pub mod email;

/// Result of the asynchronous MX lookup.
pub mod verification;
