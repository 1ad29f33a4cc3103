//! Push protocol messages.

use crate::FieldMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A local row in the outbound batch.
///
/// `localId` is the correlation key: the response maps it back to the
/// remote-assigned server id. Domain fields are flattened alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRow {
    /// The sender's local id, passed through for correlation.
    pub local_id: i64,
    /// Known server id, absent for rows never pushed before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    /// Local modification timestamp.
    pub last_modified_at: DateTime<Utc>,
    /// Domain fields.
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// A pending local deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionEntry {
    /// Wire name of the table.
    pub table: String,
    /// Local id the deleted row had.
    pub local_id: i64,
}

/// The outbound batch: rows keyed by table name plus the deletion list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushData {
    /// Dirty rows per table.
    #[serde(flatten)]
    pub tables: BTreeMap<String, Vec<PushRow>>,
    /// Pending deletions.
    #[serde(default)]
    pub deletions: Vec<DeletionEntry>,
}

impl PushData {
    /// True when there is nothing to push.
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.tables.values().all(|rows| rows.is_empty())
    }
}

/// Push request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// The tenant (school) identifier.
    pub tenant_id: String,
    /// The batch.
    pub data: PushData,
    /// Auxiliary tenant metadata.
    #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
    pub metadata: FieldMap,
}

/// Acknowledgement for one pushed row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowAck {
    /// The local id from the request.
    pub local_id: i64,
    /// The remote-assigned id.
    pub server_id: i64,
}

/// Acknowledgement for one deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionAck {
    /// Wire name of the table.
    pub table_name: String,
    /// The local id from the request.
    pub local_id: i64,
    /// Whether the remote side applied the deletion.
    pub success: bool,
}

/// Per-table acknowledgements in a push response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResults {
    /// Row acks per table.
    #[serde(flatten)]
    pub tables: BTreeMap<String, Vec<RowAck>>,
    /// Deletion acks.
    #[serde(default)]
    pub deletions: Vec<DeletionAck>,
}

/// Push response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Whether the batch was accepted.
    pub success: bool,
    /// Error message when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Acknowledgements when accepted.
    #[serde(default)]
    pub results: PushResults,
}

impl PushResponse {
    /// Creates a successful response.
    pub fn success(results: PushResults) -> Self {
        Self {
            success: true,
            error: None,
            results,
        }
    }

    /// Creates a rejection.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            results: PushResults::default(),
        }
    }
}
