//! Best-effort sync log submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cycle outcome reported to the remote log endpoint.
///
/// Fire-and-forget: a failed submission never fails the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSubmission {
    /// "FULL" or "DELTA".
    #[serde(rename = "type")]
    pub sync_type: String,
    /// "SUCCESS" or "ERROR".
    pub status: String,
    /// Per-table count summary, preformatted.
    pub details: String,
    /// Taxonomy-derived message when status is "ERROR".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Cycle duration.
    pub duration_ms: u64,
    /// When the cycle finished.
    pub timestamp: DateTime<Utc>,
}
