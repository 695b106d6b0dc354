use crate::audit::{AuditStore, open_store};
use crate::config::ValidatorConfig;
use crate::error::{AuditError, ExportError};
use crate::export;
use crate::models::audit::{AuditRecord, HistoryFilter, NewAuditRecord, ValidationStats, now_seconds};
use crate::models::email::ValidationOutcome;
use crate::models::verification::VerificationOutcome;
use crate::validation::dnsmx::{DnsMxResolver, MxResolver, Verifier};
use crate::validation::policy::DomainPolicy;
use crate::validation::syntax::Validator;
use crate::worker::{VerificationJob, VerificationPool, VerificationWorker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Verification result for one structurally valid attempt.
///
/// ## Fields
/// - `email`, `domain`: the request this result belongs to
/// - `outcome`: what the MX lookup established
/// - `record_id`: id of the audit record, `None` if persisting it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub email: String,
    pub domain: String,
    pub outcome: VerificationOutcome,
    pub record_id: Option<u64>,
}

impl VerificationReport {
    pub fn has_mail_exchange_record(&self) -> bool {
        self.outcome.has_mail_exchange_record()
    }
}

/// Notifications delivered asynchronously by the orchestrator.
#[derive(Debug)]
pub enum ValidationEvent {
    /// Verification of a submitted address finished.
    Verified(VerificationReport),
    /// An attempt could not be written to the audit log.
    PersistenceFailed { email: String, error: AuditError },
}

pub type EventReceiver = mpsc::UnboundedReceiver<ValidationEvent>;

/// # Validation Orchestrator
///
/// Entry point for callers. [`submit`](Self::submit) runs the structural checks
/// on the caller's task and returns their outcome right away. Structurally
/// valid addresses are then verified on the worker pool; the result arrives on
/// the [`EventReceiver`] returned by [`new`](Self::new).
///
/// Each attempt is appended to the audit log exactly once, at its terminal
/// step: immediately for rejections, after the MX lookup otherwise.
/// Persistence failures never affect the returned outcome or the verification
/// report; they are sent as [`ValidationEvent::PersistenceFailed`].
pub struct ValidationOrchestrator {
    validator: Validator,
    store: Arc<dyn AuditStore>,
    worker: Arc<VerificationWorker>,
    pool: VerificationPool,
    events: mpsc::UnboundedSender<ValidationEvent>,
}

impl ValidationOrchestrator {
    /// Builds an orchestrator from its collaborators and starts the pool.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new(
        config: &ValidatorConfig,
        store: Arc<dyn AuditStore>,
        resolver: Arc<dyn MxResolver>,
    ) -> (Self, EventReceiver) {
        let policy = Arc::new(DomainPolicy::from_config(config));
        let (events, receiver) = mpsc::unbounded_channel();

        let verifier = Verifier::new(resolver, config.lookup_timeout());
        let worker = Arc::new(VerificationWorker::new(
            verifier,
            Arc::clone(&store),
            events.clone(),
        ));
        let pool = VerificationPool::start(config.pool_size, Arc::clone(&worker));

        let orchestrator = Self {
            validator: Validator::new(policy),
            store,
            worker,
            pool,
            events,
        };
        (orchestrator, receiver)
    }

    /// Opens the configured audit store and uses the system DNS resolver.
    pub async fn from_config(config: &ValidatorConfig) -> Result<(Self, EventReceiver), AuditError> {
        let store = open_store(config).await?;
        let resolver = Arc::new(DnsMxResolver::new(config.lookup_timeout()));
        Ok(Self::new(config, store, resolver))
    }

    /// Validates `address`, records rejections and queues verification of
    /// accepted addresses. Never waits on DNS.
    pub async fn submit(&self, address: &str) -> ValidationOutcome {
        let attempt = Uuid::new_v4();
        let span = info_span!("submit", %attempt);
        async {
            let email = address.trim().to_string();
            let outcome = self.validator.validate(address);

            match &outcome.parsed {
                None => {
                    info!(email = %email, reason = outcome.reason(), "address rejected");
                    self.record_rejection(email).await;
                }
                Some(parsed) => {
                    debug!(email = %email, "address accepted, queueing verification");
                    let job = VerificationJob {
                        attempt,
                        email,
                        domain: parsed.domain.clone(),
                    };
                    if let Err(job) = self.pool.submit(job) {
                        error!("verification pool unavailable");
                        let outcome = VerificationOutcome::Indeterminate {
                            reason: "verification pool unavailable".to_string(),
                        };
                        self.worker.complete(job, outcome).await;
                    }
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Structural checks only: nothing is recorded and no lookup is made.
    pub fn preview(&self, address: &str) -> ValidationOutcome {
        self.validator.validate(address)
    }

    /// Well-known domain completions for a partially typed address.
    pub fn completions(&self, text: &str) -> Vec<String> {
        self.validator.suggestions().completions(text)
    }

    pub async fn query_history(
        &self,
        filter: HistoryFilter,
        search: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        self.store.query(filter, search).await
    }

    /// Writes the current history view to a timestamped CSV file in `dir` and
    /// returns its path.
    pub async fn export_history(
        &self,
        filter: HistoryFilter,
        search: &str,
        dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        let records = self.store.query(filter, search).await?;
        let dir = dir.to_path_buf();
        let path = tokio::task::spawn_blocking(move || {
            export::write_export(&records, &dir, now_seconds())
        })
        .await
        .map_err(|e| ExportError::Io {
            path: PathBuf::new(),
            source: std::io::Error::other(e),
        })??;

        info!(path = %path.display(), "history exported");
        Ok(path)
    }

    pub async fn compute_stats(&self) -> Result<ValidationStats, AuditError> {
        self.store.stats().await
    }

    /// Stops accepting work and waits until every queued verification has
    /// been recorded and reported. The event receiver ends afterwards.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }

    async fn record_rejection(&self, email: String) {
        if let Err(error) = self.store.append(NewAuditRecord::rejected(email.as_str())).await {
            error!(email = %email, %error, "failed to persist rejected attempt");
            if self
                .events
                .send(ValidationEvent::PersistenceFailed { email, error })
                .is_err()
            {
                warn!("event receiver dropped, persistence failure not delivered");
            }
        }
    }
}
