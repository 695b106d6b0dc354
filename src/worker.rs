use crate::audit::AuditStore;
use crate::models::audit::NewAuditRecord;
use crate::models::verification::VerificationOutcome;
use crate::orchestrator::{ValidationEvent, VerificationReport};
use crate::validation::dnsmx::Verifier;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

/// One structurally valid address waiting for its MX lookup. The job carries
/// its own email and domain so a completion can never be confused with
/// another request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationJob {
    pub attempt: Uuid,
    pub email: String,
    pub domain: String,
}

/// Performs the verification step of an attempt and its terminal bookkeeping.
pub struct VerificationWorker {
    verifier: Verifier,
    store: Arc<dyn AuditStore>,
    events: mpsc::UnboundedSender<ValidationEvent>,
}

impl VerificationWorker {
    pub fn new(
        verifier: Verifier,
        store: Arc<dyn AuditStore>,
        events: mpsc::UnboundedSender<ValidationEvent>,
    ) -> Self {
        Self {
            verifier,
            store,
            events,
        }
    }

    pub async fn process(&self, job: VerificationJob) {
        let span = info_span!("verify", attempt = %job.attempt, domain = %job.domain);
        async {
            let outcome = self.verifier.verify(&job.domain).await;
            self.complete(job, outcome).await;
        }
        .instrument(span)
        .await
    }

    /// Persists the attempt, then notifies the event channel. The report is
    /// delivered even when persistence fails.
    pub async fn complete(&self, job: VerificationJob, outcome: VerificationOutcome) {
        let record = NewAuditRecord::verified(job.email.as_str(), outcome.has_mail_exchange_record());
        let record_id = match self.store.append(record).await {
            Ok(record) => Some(record.id),
            Err(error) => {
                error!(email = %job.email, %error, "failed to persist verification result");
                self.notify(ValidationEvent::PersistenceFailed {
                    email: job.email.clone(),
                    error,
                });
                None
            }
        };

        self.notify(ValidationEvent::Verified(VerificationReport {
            email: job.email,
            domain: job.domain,
            outcome,
            record_id,
        }));
    }

    fn notify(&self, event: ValidationEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped, discarding notification");
        }
    }
}

/// # Verification Pool
///
/// A fixed number of worker tasks pulling [`VerificationJob`]s from a shared
/// unbounded queue. Submitting never waits for a free worker; jobs queue until
/// one picks them up.
///
/// A job whose task panics is completed as [`VerificationOutcome::Indeterminate`]
/// and the worker moves on. A panic raised after the record was appended
/// would be recorded twice; appends and notifications do not panic.
pub struct VerificationPool {
    sender: mpsc::UnboundedSender<VerificationJob>,
    workers: Vec<JoinHandle<()>>,
}

impl VerificationPool {
    /// Spawns `size` workers on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn start(size: usize, worker: Arc<VerificationWorker>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size.max(1))
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                let worker = Arc::clone(&worker);
                tokio::spawn(run_worker(index, receiver, worker))
            })
            .collect();

        info!(size, "verification pool started");
        Self { sender, workers }
    }

    /// Queues a job. Hands the job back if every worker has stopped.
    pub fn submit(&self, job: VerificationJob) -> Result<(), VerificationJob> {
        self.sender.send(job).map_err(|rejected| rejected.0)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting jobs, lets the workers drain the queue and waits for them.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "verification worker terminated abnormally");
            }
        }
        info!("verification pool stopped");
    }
}

async fn run_worker(
    index: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<VerificationJob>>>,
    worker: Arc<VerificationWorker>,
) {
    loop {
        // the lock is held only while waiting for the next job
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else { break };

        // a panic in the job surfaces here as a JoinError
        let fallback = job.clone();
        let task = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.process(job).await })
        };
        if let Err(e) = task.await {
            error!(worker = index, attempt = %fallback.attempt, error = %e, "verification task failed");
            let outcome = VerificationOutcome::Indeterminate {
                reason: format!("verification task failed: {e}"),
            };
            worker.complete(fallback, outcome).await;
        }
    }
    debug!(worker = index, "verification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::FileAuditStore;
    use crate::models::audit::HistoryFilter;
    use crate::validation::dnsmx::{MxLookup, MxResolver};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Resolver that tracks how many lookups run at once.
    struct CountingResolver {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MxResolver for CountingResolver {
        async fn lookup_mx(&self, _domain: &str) -> MxLookup {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            MxLookup::Found(1)
        }
    }

    fn job(n: usize) -> VerificationJob {
        VerificationJob {
            attempt: Uuid::new_v4(),
            email: format!("user{n}@example.com"),
            domain: "example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_its_size() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileAuditStore::open(dir.path().join("log.jsonl")).await.unwrap());
        let resolver = Arc::new(CountingResolver {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (events, mut receiver) = mpsc::unbounded_channel();
        let worker = Arc::new(VerificationWorker::new(
            Verifier::new(resolver.clone(), Duration::from_secs(2)),
            store.clone(),
            events,
        ));

        let pool = VerificationPool::start(3, worker);
        assert_eq!(pool.size(), 3);
        for n in 0..9 {
            pool.submit(job(n)).unwrap();
        }
        pool.shutdown().await;

        let mut reports = 0;
        while let Ok(event) = receiver.try_recv() {
            assert!(matches!(event, ValidationEvent::Verified(_)));
            reports += 1;
        }
        assert_eq!(reports, 9);
        assert!(resolver.peak.load(Ordering::SeqCst) <= 3);
        assert!(resolver.peak.load(Ordering::SeqCst) >= 2);
        assert_eq!(store.query(HistoryFilter::All, "").await.unwrap().len(), 9);
    }

    /// Panics for `boom.com`, answers normally otherwise.
    struct PanickingResolver;

    #[async_trait]
    impl MxResolver for PanickingResolver {
        async fn lookup_mx(&self, domain: &str) -> MxLookup {
            if domain == "boom.com" {
                panic!("resolver bug");
            }
            MxLookup::Found(1)
        }
    }

    #[tokio::test]
    async fn test_panicking_job_is_still_recorded_and_reported() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileAuditStore::open(dir.path().join("log.jsonl")).await.unwrap());
        let (events, mut receiver) = mpsc::unbounded_channel();
        let worker = Arc::new(VerificationWorker::new(
            Verifier::new(Arc::new(PanickingResolver), Duration::from_secs(2)),
            store.clone(),
            events,
        ));

        let pool = VerificationPool::start(1, worker);
        let mut boom = job(0);
        boom.domain = "boom.com".to_string();
        pool.submit(boom).unwrap();
        pool.submit(job(1)).unwrap();
        pool.shutdown().await;

        let mut reports = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            match event {
                ValidationEvent::Verified(report) => reports.push(report),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].domain, "boom.com");
        assert!(reports[0].outcome.is_indeterminate());
        assert!(reports[1].has_mail_exchange_record());

        let records = store.query(HistoryFilter::All, "").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].verification, Some(false));
        assert_eq!(records[0].verification, Some(true));
    }

    #[tokio::test]
    async fn test_zero_size_pool_still_runs_one_worker() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileAuditStore::open(dir.path().join("log.jsonl")).await.unwrap());
        let resolver = Arc::new(CountingResolver {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (events, _receiver) = mpsc::unbounded_channel();
        let worker = Arc::new(VerificationWorker::new(
            Verifier::new(resolver, Duration::from_secs(2)),
            store,
            events,
        ));

        let pool = VerificationPool::start(0, worker);
        assert_eq!(pool.size(), 1);
        pool.shutdown().await;
    }
}
