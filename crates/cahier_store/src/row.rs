//! Entity rows and their field maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The domain fields of a row, as a JSON object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A row in a synchronized table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Locally assigned, stable primary key.
    pub local_id: i64,
    /// Remote identifier, set only after a successful push.
    pub server_id: Option<i64>,
    /// True while the row carries local edits not yet acknowledged.
    pub is_dirty: bool,
    /// Time of the most recent local mutation or remote apply.
    pub last_modified_at: DateTime<Utc>,
    /// Domain fields.
    pub fields: Fields,
}

impl Row {
    /// Reads a string field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    /// Reads an integer field.
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(|v| v.as_i64())
    }
}

/// A row arriving from the remote authority.
///
/// Foreign-key fields reference parent rows by their *server* ids; the
/// store remaps them to local ids while applying.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRow {
    /// The remote identifier of the row.
    pub server_id: i64,
    /// The remote modification timestamp.
    pub last_modified_at: DateTime<Utc>,
    /// Domain fields.
    pub fields: Fields,
}
