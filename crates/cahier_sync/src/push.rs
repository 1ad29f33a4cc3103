//! The push engine: dirty rows and tombstones up, acknowledgements back.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use cahier_protocol::{DeletionEntry, PushData, PushRequest, PushRow};
use cahier_store::{Store, StoreError, Table};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// What the push phase did.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    /// Rows acknowledged and cleared, per table.
    pub pushed: BTreeMap<Table, u64>,
    /// Tombstones confirmed and removed.
    pub deletions_pushed: u64,
    /// True when the dirty set was empty and no request was made.
    pub skipped: bool,
}

impl PushOutcome {
    /// Total rows cleared by this phase.
    pub fn total(&self) -> u64 {
        self.pushed.values().sum::<u64>() + self.deletions_pushed
    }
}

/// Runs the push phase.
///
/// Reads the dirty set once, submits it in a single request, and on
/// success reconciles the acknowledgements in one local transaction. Any
/// transport or server failure leaves every flag and tombstone untouched;
/// resubmitting the same batch later is safe because the remote upserts
/// by the `localId` passed through.
pub(crate) fn run_push<T: SyncTransport>(
    store: &Store,
    transport: &T,
    tenant_id: &str,
) -> SyncResult<PushOutcome> {
    // Snapshot the dirty set, remembering each row's read-time timestamp:
    // only rows still carrying that exact timestamp may be cleared later.
    let mut data = PushData::default();
    let mut read_at: HashMap<(Table, i64), DateTime<Utc>> = HashMap::new();

    for table in Table::APPLY_ORDER {
        let dirty = store.dirty_rows(table);
        if dirty.is_empty() {
            continue;
        }
        let rows = dirty
            .into_iter()
            .map(|row| {
                read_at.insert((table, row.local_id), row.last_modified_at);
                PushRow {
                    local_id: row.local_id,
                    server_id: row.server_id,
                    last_modified_at: row.last_modified_at,
                    fields: row.fields,
                }
            })
            .collect();
        data.tables.insert(table.wire_name().to_string(), rows);
    }

    for tombstone in store.tombstones() {
        data.deletions.push(DeletionEntry {
            table: tombstone.table.wire_name().to_string(),
            local_id: tombstone.local_id,
        });
    }

    if data.is_empty() {
        debug!("push: nothing pending, skipping network call");
        return Ok(PushOutcome {
            skipped: true,
            ..Default::default()
        });
    }

    let request = PushRequest {
        tenant_id: tenant_id.to_string(),
        data,
        metadata: Default::default(),
    };
    let response = transport.push(&request)?;

    if !response.success {
        return Err(SyncError::Server(
            response.error.unwrap_or_else(|| "push rejected".into()),
        ));
    }

    let mut outcome = PushOutcome::default();
    store.transaction(|txn| {
        for (name, acks) in &response.results.tables {
            let table = Table::from_wire(name)
                .ok_or_else(|| StoreError::UnknownTable(name.clone()))?;
            for ack in acks {
                // Clear only rows that were part of the submitted batch
                // and are unchanged since it was read.
                let Some(ts) = read_at.get(&(table, ack.local_id)) else {
                    continue;
                };
                if txn.mark_synced(table, ack.local_id, ack.server_id, *ts) {
                    *outcome.pushed.entry(table).or_default() += 1;
                }
            }
        }
        for ack in &response.results.deletions {
            if !ack.success {
                continue;
            }
            let table = Table::from_wire(&ack.table_name)
                .ok_or_else(|| StoreError::UnknownTable(ack.table_name.clone()))?;
            if txn.remove_tombstone(table, ack.local_id) {
                outcome.deletions_pushed += 1;
            }
        }
        Ok(())
    })?;

    info!(
        rows = outcome.pushed.values().sum::<u64>(),
        deletions = outcome.deletions_pushed,
        "push phase complete"
    );
    Ok(outcome)
}
