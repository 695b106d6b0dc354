//! CSV export of audit history.
//!
//! Files carry the header `ts,email,valid,mx_ok`; `valid` is `1` or `0` and
//! `mx_ok` is `1`, `0` or empty when verification was not attempted.

use crate::error::ExportError;
use crate::models::audit::{AuditRecord, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub const EXPORT_HEADER: [&str; 4] = ["ts", "email", "valid", "mx_ok"];

/// One exported line, as written to and read back from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub ts: String,
    pub email: String,
    pub valid: bool,
    pub mx_ok: Option<bool>,
}

impl From<&AuditRecord> for ExportRow {
    fn from(record: &AuditRecord) -> Self {
        Self {
            ts: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            email: record.email.clone(),
            valid: record.structurally_valid,
            mx_ok: record.verification,
        }
    }
}

pub fn export_file_name(now: NaiveDateTime) -> String {
    format!("validation_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Writes `records` in order to a new file in `dir` named after `now`.
///
/// An existing file is never overwritten: a `_1`, `_2`, ... suffix is added
/// until the name is free.
pub fn write_export(
    records: &[AuditRecord],
    dir: &Path,
    now: NaiveDateTime,
) -> Result<PathBuf, ExportError> {
    let (path, file) = create_unique(dir, now)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(EXPORT_HEADER)?;
    for record in records {
        let row = ExportRow::from(record);
        writer.write_record([
            row.ts.as_str(),
            row.email.as_str(),
            flag(row.valid),
            row.mx_ok.map(flag).unwrap_or(""),
        ])?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

/// Parses a file produced by [`write_export`].
pub fn read_export(path: &Path) -> Result<Vec<ExportRow>, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;

    let header = reader.headers()?.clone();
    if header.iter().ne(EXPORT_HEADER) {
        return Err(ExportError::Malformed {
            row: 0,
            reason: format!("unexpected header {header:?}"),
        });
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let row = index + 1;
        let field = |i: usize| record.get(i).unwrap_or_default();
        if record.len() != EXPORT_HEADER.len() {
            return Err(ExportError::Malformed {
                row,
                reason: format!("expected {} fields, found {}", EXPORT_HEADER.len(), record.len()),
            });
        }

        let valid = parse_flag(field(2)).ok_or_else(|| ExportError::Malformed {
            row,
            reason: format!("invalid valid flag {:?}", field(2)),
        })?;
        let mx_ok = match field(3) {
            "" => None,
            value => Some(parse_flag(value).ok_or_else(|| ExportError::Malformed {
                row,
                reason: format!("invalid mx_ok flag {value:?}"),
            })?),
        };

        rows.push(ExportRow {
            ts: field(0).to_string(),
            email: field(1).to_string(),
            valid,
            mx_ok,
        });
    }
    Ok(rows)
}

fn create_unique(dir: &Path, now: NaiveDateTime) -> Result<(PathBuf, File), ExportError> {
    let base = export_file_name(now);
    let stem = base.trim_end_matches(".csv");

    for attempt in 0u32.. {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{stem}_{attempt}.csv")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(ExportError::Io { path, source }),
        }
    }
    unreachable!("u32 suffixes exhausted")
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::NewAuditRecord;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(15, 30, 45)
            .unwrap()
    }

    fn sample_records() -> Vec<AuditRecord> {
        vec![
            NewAuditRecord::verified("abc@gmail.com", true).into_record(3),
            NewAuditRecord::verified("bob@nomx.com", false).into_record(2),
            NewAuditRecord::rejected("weird, \"quoted\"\naddress").into_record(1),
        ]
    }

    #[test]
    fn test_file_name_uses_timestamp() {
        assert_eq!(
            export_file_name(fixed_time()),
            "validation_export_20240310_153045.csv"
        );
    }

    #[test]
    fn test_written_file_layout() {
        let dir = TempDir::new().unwrap();
        let records = &sample_records()[..2];
        let path = write_export(records, dir.path(), fixed_time()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "ts,email,valid,mx_ok");
        assert!(lines[1].ends_with(",abc@gmail.com,1,1"));
        assert!(lines[2].ends_with(",bob@nomx.com,1,0"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_round_trip_preserves_rows_and_order() {
        let dir = TempDir::new().unwrap();
        let records = sample_records();
        let path = write_export(&records, dir.path(), fixed_time()).unwrap();

        let rows = read_export(&path).unwrap();
        let expected: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
        assert_eq!(rows, expected);
        assert_eq!(rows[2].mx_ok, None);
    }

    #[test]
    fn test_empty_view_exports_header_only() {
        let dir = TempDir::new().unwrap();
        let path = write_export(&[], dir.path(), fixed_time()).unwrap();
        assert!(read_export(&path).unwrap().is_empty());
    }

    #[test]
    fn test_existing_export_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let records = sample_records();
        let first = write_export(&records[..1], dir.path(), fixed_time()).unwrap();
        let second = write_export(&records, dir.path(), fixed_time()).unwrap();
        let third = write_export(&records, dir.path(), fixed_time()).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            second.file_name().unwrap(),
            "validation_export_20240310_153045_1.csv"
        );
        assert_eq!(
            third.file_name().unwrap(),
            "validation_export_20240310_153045_2.csv"
        );
        assert_eq!(read_export(&first).unwrap().len(), 1);
        assert_eq!(read_export(&second).unwrap().len(), 3);
    }

    #[test]
    fn test_missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = write_export(&sample_records(), &missing, fixed_time());
        assert!(matches!(result, Err(ExportError::Io { .. })));
    }

    #[test]
    fn test_reading_rejects_foreign_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");

        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(
            read_export(&path),
            Err(ExportError::Malformed { row: 0, .. })
        ));

        std::fs::write(&path, "ts,email,valid,mx_ok\nx,y,yes,\n").unwrap();
        assert!(matches!(
            read_export(&path),
            Err(ExportError::Malformed { row: 1, .. })
        ));
    }
}
