use crate::audit::AuditStore;
use crate::error::AuditError;
use crate::models::audit::{AuditRecord, HistoryFilter, NewAuditRecord, TIMESTAMP_FORMAT};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const RECORDS_COLLECTION: &str = "validations";
const COUNTERS_COLLECTION: &str = "counters";

/// Stored shape of an audit record: `_id` is the sequence id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditDocument {
    #[serde(rename = "_id")]
    id: i64,
    ts: String,
    email: String,
    valid: bool,
    mx_ok: Option<bool>,
}

impl AuditDocument {
    fn from_record(record: &AuditRecord) -> Result<Self, AuditError> {
        let id = i64::try_from(record.id).map_err(|e| AuditError::Corrupt {
            location: format!("{RECORDS_COLLECTION}/_id={}", record.id),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id,
            ts: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            email: record.email.clone(),
            valid: record.structurally_valid,
            mx_ok: record.verification,
        })
    }

    fn into_record(self) -> Result<AuditRecord, AuditError> {
        let corrupt = |reason: String| AuditError::Corrupt {
            location: format!("{RECORDS_COLLECTION}/_id={}", self.id),
            reason,
        };
        let id = u64::try_from(self.id).map_err(|e| corrupt(e.to_string()))?;
        let timestamp = NaiveDateTime::parse_from_str(&self.ts, TIMESTAMP_FORMAT)
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(AuditRecord {
            id,
            timestamp,
            email: self.email,
            structurally_valid: self.valid,
            verification: self.mx_ok,
        })
    }
}

/// # MongoDB Audit Store
///
/// Records live in the `validations` collection keyed by sequence id. Ids come
/// from an atomic `$inc` on a document in `counters`, so several processes can
/// append to the same database without reusing ids.
///
/// Within one store, taking the id and inserting the record happen under a
/// single lock, so records become visible in id order and a failed insert
/// hands its id back. Across processes sharing a database ids stay unique but
/// insertion order and gap-freedom are not guaranteed.
pub struct MongoAuditStore {
    records: Collection<AuditDocument>,
    counters: Collection<Document>,
    append_lock: Mutex<()>,
}

impl MongoAuditStore {
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self, AuditError> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(database_name);
        database.run_command(doc! { "ping": 1 }).await?;
        ensure_collection(&database, RECORDS_COLLECTION).await?;

        info!(database = database_name, "connected to MongoDB audit store");
        Ok(Self {
            records: database.collection(RECORDS_COLLECTION),
            counters: database.collection(COUNTERS_COLLECTION),
            append_lock: Mutex::new(()),
        })
    }

    async fn next_id(&self) -> Result<u64, AuditError> {
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": RECORDS_COLLECTION },
                doc! { "$inc": { "seq": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        let seq = counter
            .as_ref()
            .and_then(|doc| doc.get_i64("seq").ok())
            .ok_or_else(|| AuditError::Corrupt {
                location: format!("{COUNTERS_COLLECTION}/_id={RECORDS_COLLECTION}"),
                reason: "missing sequence counter".to_string(),
            })?;
        u64::try_from(seq).map_err(|e| AuditError::Corrupt {
            location: format!("{COUNTERS_COLLECTION}/_id={RECORDS_COLLECTION}"),
            reason: e.to_string(),
        })
    }

    /// Returns `id` to the counter, unless another writer has moved past it.
    async fn release_id(&self, id: i64) -> Result<(), AuditError> {
        self.counters
            .update_one(
                doc! { "_id": RECORDS_COLLECTION, "seq": id },
                doc! { "$inc": { "seq": -1_i64 } },
            )
            .await?;
        Ok(())
    }
}

async fn ensure_collection(database: &Database, name: &str) -> Result<(), AuditError> {
    let existing = database.list_collection_names().await?;
    if !existing.iter().any(|c| c == name) {
        database.create_collection(name).await?;
        info!(collection = name, "created audit collection");
    }
    Ok(())
}

/// Query document selecting the records of a history view.
fn view_filter(filter: HistoryFilter, search: &str) -> Document {
    let mut query = Document::new();
    match filter {
        HistoryFilter::All => {}
        HistoryFilter::ValidOnly => {
            query.insert("valid", true);
        }
        HistoryFilter::InvalidOnly => {
            query.insert("valid", false);
        }
    }
    if !search.is_empty() {
        query.insert("email", doc! { "$regex": regex::escape(search) });
    }
    query
}

#[async_trait]
impl AuditStore for MongoAuditStore {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord, AuditError> {
        let _guard = self.append_lock.lock().await;
        let record = record.into_record(self.next_id().await?);
        let document = AuditDocument::from_record(&record)?;
        let id = document.id;

        if let Err(e) = self.records.insert_one(document).await {
            if let Err(release) = self.release_id(id).await {
                warn!(id, error = %release, "failed to release unused audit id");
            }
            return Err(e.into());
        }
        debug!(id = record.id, email = %record.email, "audit record inserted");
        Ok(record)
    }

    async fn query(
        &self,
        filter: HistoryFilter,
        search: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let documents: Vec<AuditDocument> = self
            .records
            .find(view_filter(filter, search))
            .sort(doc! { "_id": -1 })
            .await?
            .try_collect()
            .await?;

        documents.into_iter().map(AuditDocument::into_record).collect()
    }
}
