//! The append-only sync log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Whether a cycle was a first full sync or an incremental delta.
///
/// Delta is chosen iff a prior successful sync timestamp exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    /// First sync, no prior cursor.
    Full,
    /// Incremental sync since the last successful cycle.
    Delta,
}

/// Outcome of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Both phases completed.
    Success,
    /// The cycle aborted; `error_message` carries the taxonomy message.
    Error,
}

/// Per-table pushed/pulled counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    /// Rows acknowledged by the push phase.
    pub pushed: u64,
    /// Rows applied by the pull phase.
    pub pulled: u64,
}

/// One record of a push/pull cycle's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Entry id.
    pub id: Uuid,
    /// Full or delta.
    pub sync_type: SyncType,
    /// Success or error.
    pub status: SyncStatus,
    /// Per-table counts, keyed by wire table name.
    pub records: BTreeMap<String, RecordCounts>,
    /// Taxonomy-derived message when `status` is Error.
    pub error_message: Option<String>,
    /// Cycle duration in milliseconds.
    pub duration_ms: u64,
    /// When the cycle finished.
    pub timestamp: DateTime<Utc>,
}

impl SyncLogEntry {
    /// Creates an entry with empty counts, stamped now.
    pub fn new(sync_type: SyncType, status: SyncStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type,
            status,
            records: BTreeMap::new(),
            error_message: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Sets the error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Sets the duration.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Adds pushed/pulled counts for a table, merging with any existing.
    pub fn record(&mut self, table: &str, pushed: u64, pulled: u64) {
        let counts = self.records.entry(table.to_string()).or_default();
        counts.pushed += pushed;
        counts.pulled += pulled;
    }

    /// Total records touched by the cycle.
    pub fn total_records(&self) -> u64 {
        self.records.values().map(|c| c.pushed + c.pulled).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_accumulate() {
        let mut entry = SyncLogEntry::new(SyncType::Delta, SyncStatus::Success);
        entry.record("students", 2, 0);
        entry.record("students", 0, 3);
        entry.record("grades", 5, 1);

        assert_eq!(entry.records["students"].pushed, 2);
        assert_eq!(entry.records["students"].pulled, 3);
        assert_eq!(entry.total_records(), 11);
    }

    #[test]
    fn serde_uses_screaming_case_for_enums() {
        let entry = SyncLogEntry::new(SyncType::Full, SyncStatus::Error).with_error("offline");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["sync_type"], "FULL");
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["error_message"], "offline");
    }
}
