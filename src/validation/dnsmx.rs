use crate::models::verification::VerificationOutcome;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    system_conf,
};

/// Raw answer of a single MX query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxLookup {
    /// The query succeeded with this many MX records.
    Found(usize),
    /// The name server answered that there are no MX records (or no such domain).
    NoRecords,
    /// The query could not be completed.
    Failed(String),
}

/// Source of MX answers. Implementations perform exactly one query per call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> MxLookup;
}

/// [`MxResolver`] backed by a trust-dns resolver.
///
/// Configured with:
/// - the system resolver configuration, or the library default when it cannot be read
/// - a single attempt per query
/// - caching disabled, so every call reaches the network
pub struct DnsMxResolver {
    resolver: TokioAsyncResolver,
}

impl DnsMxResolver {
    pub fn new(lookup_timeout: Duration) -> Self {
        let (config, opts) = match system_conf::read_system_conf() {
            Ok(system) => system,
            Err(e) => {
                warn!(error = %e, "system resolver configuration unavailable, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self::with_config(config, opts, lookup_timeout)
    }

    pub fn with_config(config: ResolverConfig, mut opts: ResolverOpts, lookup_timeout: Duration) -> Self {
        opts.timeout = lookup_timeout;
        opts.attempts = 1;
        opts.cache_size = 0;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl MxResolver for DnsMxResolver {
    async fn lookup_mx(&self, domain: &str) -> MxLookup {
        match self.resolver.mx_lookup(domain).await {
            Ok(records) => {
                let count = records.iter().count();
                if count > 0 {
                    MxLookup::Found(count)
                } else {
                    MxLookup::NoRecords
                }
            }
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(error: &ResolveError) -> MxLookup {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => MxLookup::NoRecords,
        _ => MxLookup::Failed(error.to_string()),
    }
}

/// # Verification Resolver
///
/// Checks whether a domain advertises a mail exchanger. Every call issues one
/// fresh query, bounded by `timeout`. Network failures never escape as errors;
/// they become [`VerificationOutcome::Indeterminate`].
#[derive(Clone)]
pub struct Verifier {
    resolver: Arc<dyn MxResolver>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(resolver: Arc<dyn MxResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    pub async fn verify(&self, domain: &str) -> VerificationOutcome {
        let outcome = match tokio::time::timeout(self.timeout, self.resolver.lookup_mx(domain)).await {
            Ok(MxLookup::Found(records)) if records > 0 => VerificationOutcome::Confirmed { records },
            Ok(MxLookup::Found(_)) | Ok(MxLookup::NoRecords) => VerificationOutcome::Absent,
            Ok(MxLookup::Failed(reason)) => VerificationOutcome::Indeterminate { reason },
            Err(_) => VerificationOutcome::Indeterminate {
                reason: format!("MX lookup timed out after {:?}", self.timeout),
            },
        };

        match &outcome {
            VerificationOutcome::Indeterminate { reason } => {
                warn!(domain, %reason, "MX lookup indeterminate")
            }
            other => debug!(domain, outcome = ?other, "MX lookup finished"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledResolver;

    #[async_trait]
    impl MxResolver for StalledResolver {
        async fn lookup_mx(&self, _domain: &str) -> MxLookup {
            tokio::time::sleep(Duration::from_secs(30)).await;
            MxLookup::Found(1)
        }
    }

    fn verifier_returning(answer: MxLookup) -> Verifier {
        let mut mock = MockMxResolver::new();
        mock.expect_lookup_mx()
            .withf(|domain: &str| domain == "gmail.com")
            .times(1)
            .returning(move |_| answer.clone());
        Verifier::new(Arc::new(mock), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_records_found_confirms() {
        let outcome = verifier_returning(MxLookup::Found(5)).verify("gmail.com").await;
        assert_eq!(outcome, VerificationOutcome::Confirmed { records: 5 });
        assert!(outcome.has_mail_exchange_record());
    }

    #[tokio::test]
    async fn test_empty_answer_is_absent() {
        let outcome = verifier_returning(MxLookup::Found(0)).verify("gmail.com").await;
        assert_eq!(outcome, VerificationOutcome::Absent);
    }

    #[tokio::test]
    async fn test_no_records_is_absent() {
        let outcome = verifier_returning(MxLookup::NoRecords).verify("gmail.com").await;
        assert_eq!(outcome, VerificationOutcome::Absent);
        assert!(!outcome.has_mail_exchange_record());
    }

    #[tokio::test]
    async fn test_failure_is_indeterminate_and_reports_false() {
        let outcome = verifier_returning(MxLookup::Failed("connection refused".to_string()))
            .verify("gmail.com")
            .await;
        assert_eq!(
            outcome,
            VerificationOutcome::Indeterminate {
                reason: "connection refused".to_string()
            }
        );
        assert!(!outcome.has_mail_exchange_record());
    }

    #[tokio::test]
    async fn test_lookup_is_bounded_by_timeout() {
        let verifier = Verifier::new(Arc::new(StalledResolver), Duration::from_millis(50));
        let started = std::time::Instant::now();
        let outcome = verifier.verify("slow.com").await;

        assert!(outcome.is_indeterminate());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_every_call_queries_again() {
        let mut mock = MockMxResolver::new();
        mock.expect_lookup_mx()
            .times(3)
            .returning(|_| MxLookup::Found(1));
        let verifier = Verifier::new(Arc::new(mock), Duration::from_secs(1));

        for _ in 0..3 {
            assert!(verifier.verify("gmail.com").await.has_mail_exchange_record());
        }
    }

    #[test]
    fn test_no_records_error_is_classified_as_no_records() {
        use trust_dns_resolver::proto::op::{Query, ResponseCode};
        use trust_dns_resolver::proto::rr::{Name, RecordType};

        let query = Query::query(Name::from_ascii("nomx.com.").unwrap(), RecordType::MX);
        let error = ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: Box::new(query),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NXDomain,
            trusted: true,
        });
        assert_eq!(classify_error(&error), MxLookup::NoRecords);
    }

    #[test]
    fn test_other_errors_are_classified_as_failures() {
        let error = ResolveError::from(ResolveErrorKind::Message("request timed out"));
        assert!(matches!(
            classify_error(&error),
            MxLookup::Failed(reason) if reason.starts_with("request timed out")
        ));

        let error = ResolveError::from(ResolveErrorKind::NoConnections);
        assert!(matches!(classify_error(&error), MxLookup::Failed(_)));
    }

    #[tokio::test]
    #[ignore = "requires network access to a DNS server"]
    async fn test_live_lookup_for_gmail() {
        let resolver = DnsMxResolver::new(Duration::from_secs(5));
        assert!(matches!(resolver.lookup_mx("gmail.com").await, MxLookup::Found(n) if n > 0));
    }

    #[tokio::test]
    #[ignore = "requires network access to a DNS server"]
    async fn test_live_lookup_for_reserved_tld() {
        let resolver = DnsMxResolver::new(Duration::from_secs(5));
        assert_eq!(resolver.lookup_mx("user.invalid").await, MxLookup::NoRecords);
    }
}
