//! Pull protocol messages.

use crate::FieldMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pull request body.
///
/// `since` absent means a full pull; present, the server returns the
/// delta after that instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// The tenant (school) identifier.
    pub tenant_id: String,
    /// Timestamp of the last successful sync, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// A remote row in a pull delta.
///
/// Foreign-key fields reference parent rows by server id; the receiver
/// remaps them while applying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRow {
    /// The remote identifier.
    pub server_id: i64,
    /// The remote modification timestamp.
    pub last_modified_at: DateTime<Utc>,
    /// Domain fields.
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// A remote deletion in a pull delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullDeletion {
    /// Wire name of the table.
    pub table: String,
    /// Server id of the deleted row.
    pub server_id: i64,
}

/// The delta payload: rows per table plus deletions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullData {
    /// Changed rows per table.
    #[serde(flatten)]
    pub tables: BTreeMap<String, Vec<PullRow>>,
    /// Remote deletions.
    #[serde(default)]
    pub deletions: Vec<PullDeletion>,
}

/// Pull response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// The delta.
    pub data: PullData,
    /// Authoritative tenant (school) metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<FieldMap>,
    /// Server clock at response time; becomes the next `since`.
    pub server_time: DateTime<Utc>,
}
