//! The local store: tables, transactions and the change tracker.

use crate::error::{StoreError, StoreResult};
use crate::row::{Fields, IncomingRow, Row};
use crate::settings::SyncSettings;
use crate::sync_log::SyncLogEntry;
use crate::table::Table;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A ledger entry recording a local deletion pending remote acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct Tombstone {
    /// Table the row was deleted from.
    pub table: Table,
    /// Local id the row had.
    pub local_id: i64,
    /// Server id the row had; tombstones exist only for rows the remote
    /// side already knows about.
    pub server_id: i64,
    /// When the local deletion happened.
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct TableData {
    rows: BTreeMap<i64, Row>,
    last_id: i64,
}

impl TableData {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
struct StoreInner {
    tables: BTreeMap<Table, TableData>,
    tombstones: Vec<Tombstone>,
    snapshots: BTreeMap<(Table, i64), Fields>,
    settings: SyncSettings,
    sync_log: Vec<SyncLogEntry>,
}

impl StoreInner {
    fn table(&self, table: Table) -> Option<&TableData> {
        self.tables.get(&table)
    }

    fn table_mut(&mut self, table: Table) -> &mut TableData {
        self.tables.entry(table).or_default()
    }

    fn get(&self, table: Table, local_id: i64) -> Option<&Row> {
        self.table(table).and_then(|t| t.rows.get(&local_id))
    }

    fn find_by_server_id(&self, table: Table, server_id: i64) -> Option<&Row> {
        self.table(table)
            .and_then(|t| t.rows.values().find(|r| r.server_id == Some(server_id)))
    }

    fn rows(&self, table: Table) -> Vec<Row> {
        self.table(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn dirty_rows(&self, table: Table) -> Vec<Row> {
        self.table(table)
            .map(|t| t.rows.values().filter(|r| r.is_dirty).cloned().collect())
            .unwrap_or_default()
    }

    fn contains(&self, table: Table, local_id: i64) -> bool {
        self.get(table, local_id).is_some()
    }

    fn check_fields_fks(&self, table: Table, fields: &Fields) -> StoreResult<()> {
        for (field, parent) in table.foreign_keys() {
            let Some(value) = fields.get(*field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let id = value.as_i64().unwrap_or(-1);
            if !self.contains(*parent, id) {
                return Err(StoreError::foreign_key(table, *field, *parent, id));
            }
        }
        Ok(())
    }

    fn check_all_foreign_keys(&self) -> StoreResult<()> {
        for table in Table::APPLY_ORDER {
            if let Some(data) = self.table(table) {
                for row in data.rows.values() {
                    self.check_fields_fks(table, &row.fields)?;
                }
            }
        }
        Ok(())
    }
}

/// The local store.
///
/// An explicitly constructed handle (no process-wide singleton); engine
/// components receive it by `Arc`. All mutation goes through
/// [`Store::transaction`], which commits the whole closure atomically or
/// discards it — a mutation, its dirty flag, its snapshot and its
/// tombstone always land or roll back together.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` as one serialized transaction.
    ///
    /// The closure mutates a working copy of the store; `Ok` commits it,
    /// `Err` discards every change made inside. The write lock is held for
    /// the duration of the closure, so transactions never interleave.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut StoreTxn) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.inner.write();
        let mut txn = StoreTxn {
            inner: guard.clone(),
            deferred_fks: false,
        };
        let value = f(&mut txn)?;
        if txn.deferred_fks {
            txn.inner.check_all_foreign_keys()?;
        }
        *guard = txn.inner;
        Ok(value)
    }

    /// Gets a row by local id.
    pub fn get(&self, table: Table, local_id: i64) -> Option<Row> {
        self.inner.read().get(table, local_id).cloned()
    }

    /// Finds a row by its server id.
    pub fn find_by_server_id(&self, table: Table, server_id: i64) -> Option<Row> {
        self.inner.read().find_by_server_id(table, server_id).cloned()
    }

    /// Returns all rows of a table.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.inner.read().rows(table)
    }

    /// Returns the dirty rows of a table.
    pub fn dirty_rows(&self, table: Table) -> Vec<Row> {
        self.inner.read().dirty_rows(table)
    }

    /// Returns the number of rows in a table.
    pub fn row_count(&self, table: Table) -> usize {
        self.inner.read().table(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Returns the tombstone ledger.
    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.inner.read().tombstones.clone()
    }

    /// Returns the snapshot for a row, if one was captured.
    pub fn snapshot(&self, table: Table, local_id: i64) -> Option<Fields> {
        self.inner.read().snapshots.get(&(table, local_id)).cloned()
    }

    /// Returns the current sync settings.
    pub fn settings(&self) -> SyncSettings {
        self.inner.read().settings.clone()
    }

    /// Replaces the sync settings (written by the licensing collaborator).
    pub fn set_settings(&self, settings: SyncSettings) {
        self.inner.write().settings = settings;
    }

    /// Appends an entry to the sync log.
    pub fn append_log(&self, entry: SyncLogEntry) {
        self.inner.write().sync_log.push(entry);
    }

    /// Returns sync log entries, newest first.
    pub fn log_entries(&self) -> Vec<SyncLogEntry> {
        let inner = self.inner.read();
        inner.sync_log.iter().rev().cloned().collect()
    }

    /// Clears the sync log (operator housekeeping).
    pub fn truncate_log(&self) {
        self.inner.write().sync_log.clear();
    }
}

/// An open transaction against the store.
///
/// Every local write path tracks changes as it goes: inserts and updates
/// set the dirty flag, updates and deletes capture the pre-mutation
/// snapshot on a clean→dirty transition, deletes of pushed rows record a
/// tombstone. The remote apply paths (`apply_if_clean`, `delete_if_clean`,
/// `mark_synced`) bypass tracking — they reconcile, they do not edit.
pub struct StoreTxn {
    inner: StoreInner,
    deferred_fks: bool,
}

impl StoreTxn {
    /// Gets a row by local id.
    pub fn get(&self, table: Table, local_id: i64) -> Option<&Row> {
        self.inner.get(table, local_id)
    }

    /// Finds a row by its server id.
    pub fn find_by_server_id(&self, table: Table, server_id: i64) -> Option<&Row> {
        self.inner.find_by_server_id(table, server_id)
    }

    /// Returns all rows of a table.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.inner.rows(table)
    }

    /// Returns the tombstone ledger.
    pub fn tombstones(&self) -> &[Tombstone] {
        &self.inner.tombstones
    }

    /// Returns the snapshot for a row, if any.
    pub fn snapshot(&self, table: Table, local_id: i64) -> Option<&Fields> {
        self.inner.snapshots.get(&(table, local_id))
    }

    /// Defers foreign-key validation to commit time.
    ///
    /// Used by bulk applies where rows arrive in an order a per-statement
    /// checker would reject; every declared key is re-validated before the
    /// transaction commits.
    pub fn defer_foreign_keys(&mut self) {
        self.deferred_fks = true;
    }

    fn check_fks(&self, table: Table, fields: &Fields) -> StoreResult<()> {
        if self.deferred_fks {
            return Ok(());
        }
        self.inner.check_fields_fks(table, fields)
    }

    /// Inserts a new local row, marked dirty.
    ///
    /// A brand-new row has no clean baseline, so no snapshot is captured.
    /// Returns the assigned local id.
    pub fn insert(&mut self, table: Table, fields: Fields) -> StoreResult<i64> {
        self.check_fks(table, &fields)?;
        let data = self.inner.table_mut(table);
        let local_id = data.next_id();
        data.rows.insert(
            local_id,
            Row {
                local_id,
                server_id: None,
                is_dirty: true,
                last_modified_at: Utc::now(),
                fields,
            },
        );
        Ok(local_id)
    }

    /// Replaces a row's fields, marking it dirty.
    ///
    /// If the row is currently clean, its pre-mutation state is captured
    /// as the revert baseline first, in this same transaction.
    pub fn update(&mut self, table: Table, local_id: i64, fields: Fields) -> StoreResult<()> {
        self.check_fks(table, &fields)?;
        let row = self
            .inner
            .table_mut(table)
            .rows
            .get_mut(&local_id)
            .ok_or_else(|| StoreError::row_not_found(table, local_id))?;

        if !row.is_dirty {
            let baseline = row.fields.clone();
            row.is_dirty = true;
            row.fields = fields;
            row.last_modified_at = Utc::now();
            self.inner.snapshots.insert((table, local_id), baseline);
        } else {
            row.fields = fields;
            row.last_modified_at = Utc::now();
        }
        Ok(())
    }

    /// Writes a single field, marking the row dirty.
    pub fn set_field(
        &mut self,
        table: Table,
        local_id: i64,
        name: &str,
        value: serde_json::Value,
    ) -> StoreResult<()> {
        let row = self
            .inner
            .get(table, local_id)
            .ok_or_else(|| StoreError::row_not_found(table, local_id))?;
        let mut fields = row.fields.clone();
        fields.insert(name.to_string(), value);
        self.update(table, local_id, fields)
    }

    /// Deletes a row locally.
    ///
    /// A clean row gets its snapshot captured so the deletion can be
    /// reverted. A row the remote side knows about (`server_id` set) gets
    /// a tombstone; a never-pushed row simply disappears.
    pub fn delete(&mut self, table: Table, local_id: i64) -> StoreResult<()> {
        let row = self
            .inner
            .table_mut(table)
            .rows
            .remove(&local_id)
            .ok_or_else(|| StoreError::row_not_found(table, local_id))?;

        if !row.is_dirty {
            self.inner
                .snapshots
                .insert((table, local_id), row.fields.clone());
        }
        if let Some(server_id) = row.server_id {
            self.inner.tombstones.push(Tombstone {
                table,
                local_id,
                server_id,
                deleted_at: Utc::now(),
            });
        }
        Ok(())
    }

    /// The dirty guard: applies a remote row only if the local row is
    /// absent or clean.
    ///
    /// Foreign-key fields of the incoming row reference parents by server
    /// id and are remapped to local ids here; a missing parent is an
    /// error. An applied row ends clean, with the remote timestamp.
    /// Returns whether the row was actually applied.
    pub fn apply_if_clean(&mut self, table: Table, incoming: IncomingRow) -> StoreResult<bool> {
        let mut fields = incoming.fields;
        for (field, parent) in table.foreign_keys() {
            let Some(value) = fields.get(*field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let remote_id = value.as_i64().unwrap_or(-1);
            let parent_local = self
                .inner
                .find_by_server_id(*parent, remote_id)
                .map(|r| r.local_id)
                .ok_or_else(|| StoreError::foreign_key(table, *field, *parent, remote_id))?;
            fields.insert(field.to_string(), serde_json::Value::from(parent_local));
        }

        match self
            .inner
            .find_by_server_id(table, incoming.server_id)
            .map(|r| (r.local_id, r.is_dirty))
        {
            Some((_, true)) => Ok(false),
            Some((local_id, false)) => {
                let row = self
                    .inner
                    .table_mut(table)
                    .rows
                    .get_mut(&local_id)
                    .ok_or_else(|| StoreError::row_not_found(table, local_id))?;
                row.fields = fields;
                row.last_modified_at = incoming.last_modified_at;
                self.inner.snapshots.remove(&(table, local_id));
                Ok(true)
            }
            None => {
                let data = self.inner.table_mut(table);
                let local_id = data.next_id();
                data.rows.insert(
                    local_id,
                    Row {
                        local_id,
                        server_id: Some(incoming.server_id),
                        is_dirty: false,
                        last_modified_at: incoming.last_modified_at,
                        fields,
                    },
                );
                Ok(true)
            }
        }
    }

    /// Applies a remote deletion: removes the local row only if it is
    /// clean. Any tombstone for the same row is dropped either way — the
    /// remote side has independently confirmed the delete.
    ///
    /// Returns false when a dirty local row blocked the deletion.
    pub fn delete_if_clean(&mut self, table: Table, server_id: i64) -> bool {
        self.inner
            .tombstones
            .retain(|t| !(t.table == table && t.server_id == server_id));

        let found = self
            .inner
            .find_by_server_id(table, server_id)
            .map(|r| (r.local_id, r.is_dirty));
        match found {
            Some((_, true)) => false,
            Some((local_id, false)) => {
                self.inner.table_mut(table).rows.remove(&local_id);
                self.inner.snapshots.remove(&(table, local_id));
                true
            }
            None => true,
        }
    }

    /// Reconciles a push acknowledgement for one row.
    ///
    /// Sets the server id and clears the dirty flag only if the row still
    /// exists, is still dirty and its modification timestamp equals the
    /// value read when the batch was assembled — a row re-dirtied during
    /// the network round-trip keeps its flag. Prunes the snapshot on
    /// success. Returns whether the row was cleared.
    pub fn mark_synced(
        &mut self,
        table: Table,
        local_id: i64,
        server_id: i64,
        read_at: DateTime<Utc>,
    ) -> bool {
        let Some(row) = self.inner.table_mut(table).rows.get_mut(&local_id) else {
            return false;
        };
        if !row.is_dirty || row.last_modified_at != read_at {
            return false;
        }
        row.server_id = Some(server_id);
        row.is_dirty = false;
        self.inner.snapshots.remove(&(table, local_id));
        true
    }

    /// Removes a tombstone from the ledger. Returns whether one existed.
    pub fn remove_tombstone(&mut self, table: Table, local_id: i64) -> bool {
        let before = self.inner.tombstones.len();
        self.inner
            .tombstones
            .retain(|t| !(t.table == table && t.local_id == local_id));
        self.inner.tombstones.len() != before
    }

    /// Clears a row's dirty flag without touching its fields, and drops
    /// its snapshot. The "ignore" path: the local state is accepted as-is
    /// and stops being tracked for push.
    pub fn clear_dirty(&mut self, table: Table, local_id: i64) -> StoreResult<()> {
        let row = self
            .inner
            .table_mut(table)
            .rows
            .get_mut(&local_id)
            .ok_or_else(|| StoreError::row_not_found(table, local_id))?;
        row.is_dirty = false;
        self.inner.snapshots.remove(&(table, local_id));
        Ok(())
    }

    /// Restores a full row, clean, under its original ids. Used when
    /// reverting a deletion.
    pub fn restore(&mut self, table: Table, row: Row) {
        let data = self.inner.table_mut(table);
        data.last_id = data.last_id.max(row.local_id);
        data.rows.insert(row.local_id, row);
    }

    /// Drops the snapshot for a row, if any.
    pub fn remove_snapshot(&mut self, table: Table, local_id: i64) {
        self.inner.snapshots.remove(&(table, local_id));
    }

    /// Advances the last-sync cursor. Called inside the pull transaction
    /// so the cursor and the applied delta commit together.
    pub fn set_last_sync_time(&mut self, time: DateTime<Utc>) {
        self.inner.settings.last_sync_time = Some(time);
    }
}
