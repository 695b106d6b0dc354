use crate::audit::AuditStore;
use crate::error::AuditError;
use crate::models::audit::{AuditRecord, HistoryFilter, NewAuditRecord, matches_view};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// # File Audit Store
///
/// Keeps one JSON object per line in an append-only file. Each append is a
/// single write followed by `sync_data`, performed under an internal lock that
/// also hands out ids. On open the next id is recovered from the highest id
/// already on disk.
///
/// Only the bytes after the last newline can be left behind by a crash. On
/// open, a complete record there gets its missing newline and is kept; any
/// other trailing bytes are truncated. A newline-terminated line that does not
/// parse is reported as [`AuditError::Corrupt`] wherever it sits.
pub struct FileAuditStore {
    path: PathBuf,
    state: Mutex<WriterState>,
}

struct WriterState {
    file: File,
    next_id: u64,
    // length of the file up to the last complete record
    len: u64,
    // a failed append could not be rolled back yet
    dirty: bool,
}

impl FileAuditStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let contents = fs::read_to_string(&path).await?;
        let (complete, tail) = split_tail(&contents);
        let mut records = parse_records(&path, complete)?;
        let mut len = complete.len() as u64;

        match serde_json::from_str::<AuditRecord>(tail) {
            Ok(record) => {
                warn!(path = %path.display(), id = record.id, "terminating unfinished trailing audit record");
                write_line(&mut file, "\n").await?;
                len = contents.len() as u64 + 1;
                records.push(record);
            }
            Err(_) if !tail.is_empty() => {
                warn!(path = %path.display(), bytes = tail.len(), "truncating torn trailing audit record");
                file.set_len(len).await?;
            }
            Err(_) => {}
        }

        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        info!(path = %path.display(), records = records.len(), next_id, "audit log opened");

        Ok(Self {
            path,
            state: Mutex::new(WriterState {
                file,
                next_id,
                len,
                dirty: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord, AuditError> {
        let mut state = self.state.lock().await;
        if state.dirty {
            let len = state.len;
            state.file.set_len(len).await?;
            state.dirty = false;
        }
        let record = record.into_record(state.next_id);

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Err(e) = write_line(&mut state.file, &line).await {
            // drop whatever part of the line reached the file
            let len = state.len;
            if let Err(rollback) = state.file.set_len(len).await {
                warn!(path = %self.path.display(), error = %rollback, "failed to roll back partial audit write");
                state.dirty = true;
            }
            return Err(e.into());
        }
        state.len += line.len() as u64;
        state.next_id += 1;

        debug!(id = record.id, email = %record.email, "audit record appended");
        Ok(record)
    }

    async fn query(
        &self,
        filter: HistoryFilter,
        search: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let contents = {
            let _writer = self.state.lock().await;
            fs::read_to_string(&self.path).await?
        };

        let (complete, _) = split_tail(&contents);
        let mut records: Vec<AuditRecord> = parse_records(&self.path, complete)?
            .into_iter()
            .filter(|record| matches_view(record, filter, search))
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }
}

async fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Splits `contents` after its last newline.
fn split_tail(contents: &str) -> (&str, &str) {
    match contents.rfind('\n') {
        Some(end) => contents.split_at(end + 1),
        None => ("", contents),
    }
}

/// Parses newline-terminated records; every non-blank line must be valid.
fn parse_records(path: &Path, complete: &str) -> Result<Vec<AuditRecord>, AuditError> {
    let mut records = Vec::new();
    for (index, line) in complete.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str::<AuditRecord>(line).map_err(|e| AuditError::Corrupt {
            location: format!("{}:{}", path.display(), index + 1),
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}
