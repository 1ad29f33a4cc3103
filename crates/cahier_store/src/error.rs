//! Error types for the local store.

use crate::table::Table;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("row not found: {table} #{local_id}")]
    RowNotFound {
        /// Table that was searched.
        table: Table,
        /// Local id that was not found.
        local_id: i64,
    },

    /// A revert needed a snapshot that was never captured.
    ///
    /// Recoverable: the caller can ignore the change instead.
    #[error("no snapshot for {table} #{local_id}, cannot revert")]
    SnapshotMissing {
        /// Table of the change.
        table: Table,
        /// Local id of the change.
        local_id: i64,
    },

    /// A foreign key points at a row that does not exist.
    #[error("foreign key violation: {table}.{field} -> {parent} ({value})")]
    ForeignKeyViolation {
        /// Referencing table.
        table: Table,
        /// Referencing field.
        field: String,
        /// Referenced table.
        parent: Table,
        /// The dangling value.
        value: i64,
    },

    /// An unknown table name arrived on the wire.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Row serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a row-not-found error.
    pub fn row_not_found(table: Table, local_id: i64) -> Self {
        Self::RowNotFound { table, local_id }
    }

    /// Creates a snapshot-missing error.
    pub fn snapshot_missing(table: Table, local_id: i64) -> Self {
        Self::SnapshotMissing { table, local_id }
    }

    /// Creates a foreign-key violation error.
    pub fn foreign_key(table: Table, field: impl Into<String>, parent: Table, value: i64) -> Self {
        Self::ForeignKeyViolation {
            table,
            field: field.into(),
            parent,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::row_not_found(Table::Student, 7);
        assert_eq!(err.to_string(), "row not found: students #7");

        let err = StoreError::snapshot_missing(Table::Grade, 3);
        assert!(err.to_string().contains("cannot revert"));

        let err = StoreError::foreign_key(Table::Grade, "student_id", Table::Student, 42);
        assert!(err.to_string().contains("grades.student_id"));
        assert!(err.to_string().contains("42"));
    }
}
