//! Audit log storage.
//!
//! Every validation attempt is appended exactly once. Records are never updated
//! or deleted, so appends only need to be serialized against each other,
//! which each backend does internally.

use crate::config::ValidatorConfig;
use crate::error::AuditError;
use crate::models::audit::{AuditRecord, HistoryFilter, NewAuditRecord, ValidationStats};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Durable JSON-lines file backend.
pub mod file;

/// MongoDB backend.
pub mod mongo;

pub use file::FileAuditStore;
pub use mongo::MongoAuditStore;

/// # Audit Log Store
///
/// Append-only record of validation attempts.
///
/// ## Contract
/// - `append` assigns the next id, persists the record and returns it. Ids are
///   unique and strictly increasing in insertion order.
/// - `query` returns the records admitted by `filter` whose email contains
///   `search` (case-sensitive, empty matches all), newest first.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord, AuditError>;

    async fn query(
        &self,
        filter: HistoryFilter,
        search: &str,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    async fn stats(&self) -> Result<ValidationStats, AuditError> {
        let records = self.query(HistoryFilter::All, "").await?;
        Ok(ValidationStats::from_records(&records))
    }
}

/// Opens the backend selected by `config.db_path`, creating storage if absent.
pub async fn open_store(config: &ValidatorConfig) -> Result<Arc<dyn AuditStore>, AuditError> {
    if config.uses_mongodb() {
        info!(database = %config.database_name, "opening MongoDB audit store");
        let store = MongoAuditStore::connect(&config.db_path, &config.database_name).await?;
        Ok(Arc::new(store))
    } else {
        info!(path = %config.db_path, "opening file audit store");
        let store = FileAuditStore::open(&config.db_path).await?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_store_defaults_to_file_backend() {
        let dir = TempDir::new().unwrap();
        let config = ValidatorConfig {
            db_path: dir.path().join("log.jsonl").display().to_string(),
            ..ValidatorConfig::default()
        };

        let store = open_store(&config).await.unwrap();
        store.append(NewAuditRecord::rejected("x")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.invalid_count, 1);
        assert_eq!(stats.valid_count, 0);
        assert!(dir.path().join("log.jsonl").exists());
    }
}
