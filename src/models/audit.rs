use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Format of audit timestamps: ISO 8601, local time, seconds precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// # Audit Record
///
/// One persisted validation attempt. The store assigns `id` at insertion.
///
/// ## Fields
/// - `id`: strictly increasing sequence number, never reused
/// - `timestamp`: when the attempt reached its terminal step
/// - `email`: the address as submitted (trimmed)
/// - `structurally_valid`: whether syntax and policy checks passed
/// - `verification`: MX result, `None` when verification was not attempted
///
/// ## Example JSON
/// ```json
/// { "id": 7, "ts": "2024-03-10T15:30:45", "email": "abc@gmail.com", "valid": true, "mx_ok": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
    #[serde(rename = "ts")]
    pub timestamp: NaiveDateTime,
    pub email: String,
    #[serde(rename = "valid")]
    pub structurally_valid: bool,
    #[serde(rename = "mx_ok")]
    pub verification: Option<bool>,
}

/// An audit entry before the store has assigned it an id.
///
/// Only constructible through [`rejected`](Self::rejected) and
/// [`verified`](Self::verified), so a structurally invalid entry can never
/// carry a verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditRecord {
    timestamp: NaiveDateTime,
    email: String,
    structurally_valid: bool,
    verification: Option<bool>,
}

impl NewAuditRecord {
    pub fn rejected(email: impl Into<String>) -> Self {
        Self {
            timestamp: now_seconds(),
            email: email.into(),
            structurally_valid: false,
            verification: None,
        }
    }

    pub fn verified(email: impl Into<String>, has_mx: bool) -> Self {
        Self {
            timestamp: now_seconds(),
            email: email.into(),
            structurally_valid: true,
            verification: Some(has_mx),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn into_record(self, id: u64) -> AuditRecord {
        AuditRecord {
            id,
            timestamp: self.timestamp,
            email: self.email,
            structurally_valid: self.structurally_valid,
            verification: self.verification,
        }
    }
}

/// Which attempts a history query returns, by structural validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistoryFilter {
    #[default]
    All,
    ValidOnly,
    InvalidOnly,
}

impl HistoryFilter {
    pub fn admits(&self, structurally_valid: bool) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::ValidOnly => structurally_valid,
            HistoryFilter::InvalidOnly => !structurally_valid,
        }
    }
}

impl FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(HistoryFilter::All),
            "valid" => Ok(HistoryFilter::ValidOnly),
            "invalid" => Ok(HistoryFilter::InvalidOnly),
            other => Err(format!("unknown history filter: {other}")),
        }
    }
}

/// Whether `record` belongs in the view selected by `filter` and `search`.
/// An empty `search` matches everything; otherwise it is a case-sensitive
/// substring of the email.
pub fn matches_view(record: &AuditRecord, filter: HistoryFilter, search: &str) -> bool {
    filter.admits(record.structurally_valid) && (search.is_empty() || record.email.contains(search))
}

/// Counts derived from the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub valid_count: u64,
    pub invalid_count: u64,
}

impl ValidationStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut stats, record| {
                if record.structurally_valid {
                    stats.valid_count += 1;
                } else {
                    stats.invalid_count += 1;
                }
                stats
            })
    }
}

pub fn now_seconds() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, email: &str, valid: bool) -> AuditRecord {
        if valid {
            NewAuditRecord::verified(email, true).into_record(id)
        } else {
            NewAuditRecord::rejected(email).into_record(id)
        }
    }

    #[test]
    fn test_rejected_record_has_no_verification() {
        let record = NewAuditRecord::rejected("bad").into_record(1);
        assert!(!record.structurally_valid);
        assert_eq!(record.verification, None);
    }

    #[test]
    fn test_timestamp_serializes_with_seconds_precision() {
        let record = record(3, "abc@gmail.com", true);
        let json = serde_json::to_value(&record).unwrap();
        let ts = json["ts"].as_str().unwrap();
        assert_eq!(ts, record.timestamp.format(TIMESTAMP_FORMAT).to_string());
        assert_eq!(json["valid"], true);
        assert_eq!(json["mx_ok"], true);

        let back: AuditRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("All".parse::<HistoryFilter>(), Ok(HistoryFilter::All));
        assert_eq!("valid".parse::<HistoryFilter>(), Ok(HistoryFilter::ValidOnly));
        assert_eq!(
            " Invalid ".parse::<HistoryFilter>(),
            Ok(HistoryFilter::InvalidOnly)
        );
        assert!("maybe".parse::<HistoryFilter>().is_err());
    }

    #[test]
    fn test_matches_view_search_is_case_sensitive() {
        let r = record(1, "abc@gmail.com", true);
        assert!(matches_view(&r, HistoryFilter::All, ""));
        assert!(matches_view(&r, HistoryFilter::ValidOnly, "gmail"));
        assert!(!matches_view(&r, HistoryFilter::ValidOnly, "GMAIL"));
        assert!(!matches_view(&r, HistoryFilter::InvalidOnly, ""));
    }

    #[test]
    fn test_stats_from_records() {
        let records = vec![
            record(1, "a", false),
            record(2, "abc@gmail.com", true),
            record(3, "b", false),
        ];
        let stats = ValidationStats::from_records(&records);
        assert_eq!(stats.valid_count, 1);
        assert_eq!(stats.invalid_count, 2);
    }
}
