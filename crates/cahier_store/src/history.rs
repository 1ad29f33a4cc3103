//! Pending-change history, ignore and revert.

use crate::error::{StoreError, StoreResult};
use crate::row::{Fields, Row};
use crate::store::Store;
use crate::table::Table;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Classification of a pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A dirty row with no snapshot: created locally, never pushed.
    New,
    /// A dirty row with a snapshot: a synced row edited locally.
    Modified,
    /// A tombstone: a synced row deleted locally.
    Deleted,
}

/// A change awaiting push, reconstructed from dirty rows, snapshots and
/// tombstones. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Table of the change.
    pub table: Table,
    /// Local id of the row (or of the deleted row).
    pub local_id: i64,
    /// NEW, MODIFIED or DELETED.
    pub kind: ChangeKind,
    /// Human-readable label built from the row's name fields.
    pub label: String,
    /// Current fields; absent for deletions.
    pub current: Option<Fields>,
    /// Last clean baseline; absent for new rows.
    pub snapshot: Option<Fields>,
}

/// One changed field between a snapshot and the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value in the snapshot; `None` when the field was added.
    pub before: Option<serde_json::Value>,
    /// Current value; `None` when the field was removed.
    pub after: Option<serde_json::Value>,
}

/// Result of a bulk revert.
#[derive(Debug, Default)]
pub struct RevertOutcome {
    /// Changes successfully reverted.
    pub reverted: usize,
    /// Changes that failed, with their labels; the rest proceeded.
    pub failures: Vec<(String, StoreError)>,
}

/// The history and revert service.
///
/// Read-mostly; shares the store's tables with the change tracker and is
/// queried on demand by the UI.
pub struct History {
    store: Arc<Store>,
}

impl History {
    /// Creates the service over a store handle.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Lists every pending change: dirty rows classified NEW/MODIFIED by
    /// snapshot presence, tombstones as DELETED.
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        let mut changes = Vec::new();

        for table in Table::APPLY_ORDER {
            for row in self.store.dirty_rows(table) {
                let snapshot = self.store.snapshot(table, row.local_id);
                let kind = if snapshot.is_some() {
                    ChangeKind::Modified
                } else {
                    ChangeKind::New
                };
                changes.push(PendingChange {
                    table,
                    local_id: row.local_id,
                    kind,
                    label: label_for(table, row.local_id, Some(&row.fields)),
                    current: Some(row.fields),
                    snapshot,
                });
            }
        }

        for tombstone in self.store.tombstones() {
            let snapshot = self.store.snapshot(tombstone.table, tombstone.local_id);
            changes.push(PendingChange {
                table: tombstone.table,
                local_id: tombstone.local_id,
                kind: ChangeKind::Deleted,
                label: label_for(tombstone.table, tombstone.local_id, snapshot.as_ref()),
                current: None,
                snapshot,
            });
        }

        changes
    }

    /// Stops tracking a change without touching local data.
    ///
    /// NEW/MODIFIED: the dirty flag clears and the current field values
    /// stand. DELETED: the tombstone is dropped; the row stays deleted
    /// locally but the remote side is never told.
    pub fn ignore(&self, change: &PendingChange) -> StoreResult<()> {
        self.store.transaction(|txn| {
            match change.kind {
                ChangeKind::New | ChangeKind::Modified => {
                    txn.clear_dirty(change.table, change.local_id)?;
                }
                ChangeKind::Deleted => {
                    txn.remove_tombstone(change.table, change.local_id);
                    txn.remove_snapshot(change.table, change.local_id);
                }
            }
            Ok(())
        })
    }

    /// Undoes a change: NEW rows are deleted outright, MODIFIED rows are
    /// restored from their snapshot, DELETED rows are re-inserted from
    /// theirs.
    ///
    /// Fails with [`StoreError::SnapshotMissing`] when the required
    /// baseline does not exist.
    pub fn revert(&self, change: &PendingChange) -> StoreResult<()> {
        let table = change.table;
        let local_id = change.local_id;

        self.store.transaction(|txn| match change.kind {
            ChangeKind::New => txn.delete(table, local_id),
            ChangeKind::Modified => {
                let row = txn
                    .get(table, local_id)
                    .ok_or_else(|| StoreError::row_not_found(table, local_id))?;
                let baseline = txn
                    .snapshot(table, local_id)
                    .ok_or_else(|| StoreError::snapshot_missing(table, local_id))?
                    .clone();
                let restored = Row {
                    local_id,
                    server_id: row.server_id,
                    is_dirty: false,
                    last_modified_at: Utc::now(),
                    fields: baseline,
                };
                txn.restore(table, restored);
                txn.remove_snapshot(table, local_id);
                Ok(())
            }
            ChangeKind::Deleted => {
                let tombstone = txn
                    .tombstones()
                    .iter()
                    .find(|t| t.table == table && t.local_id == local_id)
                    .cloned()
                    .ok_or_else(|| StoreError::row_not_found(table, local_id))?;
                let baseline = txn
                    .snapshot(table, local_id)
                    .ok_or_else(|| StoreError::snapshot_missing(table, local_id))?
                    .clone();
                let restored = Row {
                    local_id,
                    server_id: Some(tombstone.server_id),
                    is_dirty: false,
                    last_modified_at: Utc::now(),
                    fields: baseline,
                };
                txn.restore(table, restored);
                txn.remove_tombstone(table, local_id);
                txn.remove_snapshot(table, local_id);
                Ok(())
            }
        })
    }

    /// Ignores every pending change. Returns how many were cleared.
    pub fn ignore_all(&self) -> StoreResult<usize> {
        let changes = self.pending_changes();
        for change in &changes {
            self.ignore(change)?;
        }
        Ok(changes.len())
    }

    /// Reverts every pending change, each independently: one failure
    /// never blocks the rest.
    pub fn revert_all(&self) -> RevertOutcome {
        let mut outcome = RevertOutcome::default();
        for change in self.pending_changes() {
            match self.revert(&change) {
                Ok(()) => outcome.reverted += 1,
                Err(err) => {
                    warn!(table = %change.table, local_id = change.local_id, %err, "revert skipped");
                    outcome.failures.push((change.label, err));
                }
            }
        }
        outcome
    }

    /// Computes the typed field diff between two field maps.
    pub fn diff(before: &Fields, after: &Fields) -> Vec<FieldChange> {
        let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        keys.into_iter()
            .filter_map(|key| {
                let old = before.get(key);
                let new = after.get(key);
                if old == new {
                    return None;
                }
                Some(FieldChange {
                    field: key.clone(),
                    before: old.cloned(),
                    after: new.cloned(),
                })
            })
            .collect()
    }
}

fn label_for(table: Table, local_id: i64, fields: Option<&Fields>) -> String {
    let parts: Vec<&str> = fields
        .map(|f| {
            table
                .label_fields()
                .iter()
                .filter_map(|name| f.get(*name).and_then(|v| v.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        format!("{table} #{local_id}")
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    /// Store with one synced student (server id 100) and the history
    /// service over it.
    fn synced_student() -> (Arc<Store>, History, i64) {
        let store = Arc::new(Store::new());
        let id = store
            .transaction(|txn| {
                txn.insert(
                    Table::Student,
                    fields(json!({"first_name": "Amani", "last_name": "Kalume", "post_name": "Trésor"})),
                )
            })
            .unwrap();
        let read_at = store.get(Table::Student, id).unwrap().last_modified_at;
        store
            .transaction(|txn| {
                txn.mark_synced(Table::Student, id, 100, read_at);
                Ok(())
            })
            .unwrap();
        let history = History::new(Arc::clone(&store));
        (store, history, id)
    }

    #[test]
    fn classification_new_modified_deleted() {
        let (store, history, student_id) = synced_student();

        // MODIFIED: edit the synced student.
        store
            .transaction(|txn| {
                txn.set_field(Table::Student, student_id, "first_name", json!("Amani-edited"))
            })
            .unwrap();
        // NEW: a fresh row.
        store
            .transaction(|txn| txn.insert(Table::AcademicYear, fields(json!({"name": "2025-2026"}))))
            .unwrap();
        // DELETED: another synced student, then deleted.
        let deleted_id = store
            .transaction(|txn| {
                txn.insert(
                    Table::Student,
                    fields(json!({"first_name": "B", "last_name": "C", "post_name": "D"})),
                )
            })
            .unwrap();
        let read_at = store.get(Table::Student, deleted_id).unwrap().last_modified_at;
        store
            .transaction(|txn| {
                txn.mark_synced(Table::Student, deleted_id, 101, read_at);
                txn.delete(Table::Student, deleted_id)
            })
            .unwrap();

        let changes = history.pending_changes();
        assert_eq!(changes.len(), 3);

        let modified = changes
            .iter()
            .find(|c| c.kind == ChangeKind::Modified)
            .unwrap();
        assert_eq!(modified.table, Table::Student);
        assert_eq!(modified.label, "Amani-edited Kalume Trésor");
        assert!(modified.snapshot.is_some());

        let new = changes.iter().find(|c| c.kind == ChangeKind::New).unwrap();
        assert_eq!(new.table, Table::AcademicYear);
        assert!(new.snapshot.is_none());

        let deleted = changes
            .iter()
            .find(|c| c.kind == ChangeKind::Deleted)
            .unwrap();
        assert_eq!(deleted.local_id, deleted_id);
        assert!(deleted.current.is_none());
        // Label comes from the snapshot for deletions.
        assert_eq!(deleted.label, "B C D");
    }

    #[test]
    fn ignore_keeps_values_and_stops_tracking() {
        let (store, history, student_id) = synced_student();
        store
            .transaction(|txn| txn.set_field(Table::Student, student_id, "first_name", json!("Edited")))
            .unwrap();

        let change = history.pending_changes().remove(0);
        history.ignore(&change).unwrap();

        let row = store.get(Table::Student, student_id).unwrap();
        assert!(!row.is_dirty);
        assert_eq!(row.field_str("first_name"), Some("Edited"));
        assert!(history.pending_changes().is_empty());
        assert!(store.snapshot(Table::Student, student_id).is_none());
    }

    #[test]
    fn ignore_deleted_drops_tombstone_keeps_row_deleted() {
        let (store, history, student_id) = synced_student();
        store
            .transaction(|txn| txn.delete(Table::Student, student_id))
            .unwrap();

        let change = history.pending_changes().remove(0);
        assert_eq!(change.kind, ChangeKind::Deleted);
        history.ignore(&change).unwrap();

        assert!(store.tombstones().is_empty());
        assert!(store.get(Table::Student, student_id).is_none());
    }

    #[test]
    fn revert_modified_restores_snapshot_exactly() {
        let (store, history, student_id) = synced_student();
        let original = store.get(Table::Student, student_id).unwrap().fields;
        store
            .transaction(|txn| txn.set_field(Table::Student, student_id, "first_name", json!("X")))
            .unwrap();

        let change = history.pending_changes().remove(0);
        history.revert(&change).unwrap();

        let row = store.get(Table::Student, student_id).unwrap();
        assert!(!row.is_dirty);
        assert_eq!(row.fields, original);
        assert_eq!(row.server_id, Some(100));
        assert!(history.pending_changes().is_empty());
    }

    #[test]
    fn revert_new_deletes_row() {
        let (store, history, _) = synced_student();
        let id = store
            .transaction(|txn| txn.insert(Table::AcademicYear, fields(json!({"name": "2025"}))))
            .unwrap();

        let change = history.pending_changes().remove(0);
        assert_eq!(change.kind, ChangeKind::New);
        history.revert(&change).unwrap();

        assert!(store.get(Table::AcademicYear, id).is_none());
        assert!(store.tombstones().is_empty());
    }

    #[test]
    fn revert_deleted_reinserts_from_snapshot() {
        let (store, history, student_id) = synced_student();
        let original = store.get(Table::Student, student_id).unwrap().fields;
        store
            .transaction(|txn| txn.delete(Table::Student, student_id))
            .unwrap();

        let change = history.pending_changes().remove(0);
        history.revert(&change).unwrap();

        let row = store.get(Table::Student, student_id).unwrap();
        assert_eq!(row.fields, original);
        assert_eq!(row.server_id, Some(100));
        assert!(!row.is_dirty);
        assert!(store.tombstones().is_empty());
    }

    #[test]
    fn revert_deleted_without_snapshot_is_a_named_error() {
        let (store, history, student_id) = synced_student();
        store
            .transaction(|txn| {
                txn.delete(Table::Student, student_id)?;
                txn.remove_snapshot(Table::Student, student_id);
                Ok(())
            })
            .unwrap();

        let change = history.pending_changes().remove(0);
        let result = history.revert(&change);
        assert!(matches!(result, Err(StoreError::SnapshotMissing { .. })));
        // The tombstone survives; the change is still pending.
        assert_eq!(history.pending_changes().len(), 1);
    }

    #[test]
    fn revert_all_continues_past_failures() {
        let (store, history, student_id) = synced_student();
        // One revertable deletion, one with its snapshot gone.
        let second = store
            .transaction(|txn| {
                txn.insert(
                    Table::Student,
                    fields(json!({"first_name": "E", "last_name": "F", "post_name": "G"})),
                )
            })
            .unwrap();
        let read_at = store.get(Table::Student, second).unwrap().last_modified_at;
        store
            .transaction(|txn| {
                txn.mark_synced(Table::Student, second, 101, read_at);
                txn.delete(Table::Student, student_id)?;
                txn.delete(Table::Student, second)?;
                txn.remove_snapshot(Table::Student, second);
                Ok(())
            })
            .unwrap();

        let outcome = history.revert_all();
        assert_eq!(outcome.reverted, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(store.get(Table::Student, student_id).is_some());
        assert!(store.get(Table::Student, second).is_none());
    }

    #[test]
    fn diff_reports_changed_added_removed_fields() {
        let before = fields(json!({"a": 1, "b": "x", "gone": true}));
        let after = fields(json!({"a": 1, "b": "y", "new": 9}));

        let changes = History::diff(&before, &after);
        assert_eq!(changes.len(), 3);

        let b = changes.iter().find(|c| c.field == "b").unwrap();
        assert_eq!(b.before, Some(json!("x")));
        assert_eq!(b.after, Some(json!("y")));

        let gone = changes.iter().find(|c| c.field == "gone").unwrap();
        assert!(gone.after.is_none());

        let new = changes.iter().find(|c| c.field == "new").unwrap();
        assert!(new.before.is_none());
    }
}
