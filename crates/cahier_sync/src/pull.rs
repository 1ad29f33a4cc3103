//! The pull engine: remote delta applied under the dirty guard.

use crate::error::SyncResult;
use crate::transport::SyncTransport;
use cahier_protocol::{PullRequest, PullResponse};
use cahier_store::{IncomingRow, Store, StoreError, Table};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What the pull phase did.
#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    /// Rows applied per table.
    pub pulled: BTreeMap<Table, u64>,
    /// Remote deletions applied locally.
    pub deletions_applied: u64,
    /// Rows and deletions the dirty guard refused. The local edits win
    /// this round and go up on the next push.
    pub blocked: u64,
    /// The server clock that became the new `since` cursor.
    pub server_time: Option<DateTime<Utc>>,
}

impl PullOutcome {
    /// Total rows applied by this phase.
    pub fn total(&self) -> u64 {
        self.pulled.values().sum::<u64>() + self.deletions_applied
    }
}

/// Runs the pull phase.
///
/// Requests the delta since the last successful sync (or everything, on
/// a first cycle) and applies it in a single transaction: every row goes
/// through the dirty guard, parents before children, deletions children
/// first. The `since` cursor only advances inside that same transaction,
/// so a failed apply leaves the cursor where it was and the next cycle
/// re-fetches the same delta.
pub(crate) fn run_pull<T: SyncTransport>(
    store: &Store,
    transport: &T,
    tenant_id: &str,
) -> SyncResult<PullOutcome> {
    let request = PullRequest {
        tenant_id: tenant_id.to_string(),
        since: store.settings().last_sync_time,
    };
    let response = transport.pull(&request)?;

    let outcome = apply_delta(store, &response)?;
    info!(
        rows = outcome.pulled.values().sum::<u64>(),
        deletions = outcome.deletions_applied,
        blocked = outcome.blocked,
        "pull phase complete"
    );
    Ok(outcome)
}

fn apply_delta(store: &Store, response: &PullResponse) -> SyncResult<PullOutcome> {
    let mut outcome = PullOutcome::default();

    store.transaction(|txn| {
        // The delta may carry a child before its parent within one table
        // batch ordering; declared keys are re-validated at commit.
        txn.defer_foreign_keys();

        // Reject unknown table names up front so a partial apply never
        // commits alongside data we cannot interpret.
        for name in response.data.tables.keys() {
            if Table::from_wire(name).is_none() {
                return Err(StoreError::UnknownTable(name.clone()));
            }
        }

        for table in Table::APPLY_ORDER {
            let Some(rows) = response.data.tables.get(table.wire_name()) else {
                continue;
            };
            for row in rows {
                let applied = txn.apply_if_clean(
                    table,
                    IncomingRow {
                        server_id: row.server_id,
                        last_modified_at: row.last_modified_at,
                        fields: row.fields.clone(),
                    },
                )?;
                if applied {
                    *outcome.pulled.entry(table).or_default() += 1;
                } else {
                    outcome.blocked += 1;
                    debug!(
                        table = %table,
                        server_id = row.server_id,
                        "dirty local row blocked remote update"
                    );
                }
            }
        }

        // Deletions go children first so no row loses its parent while
        // siblings still reference it.
        let mut deletions = response.data.deletions.clone();
        deletions.sort_by_key(|d| {
            std::cmp::Reverse(
                Table::from_wire(&d.table)
                    .map(|t| Table::APPLY_ORDER.iter().position(|o| *o == t))
                    .unwrap_or_default(),
            )
        });
        for deletion in &deletions {
            let table = Table::from_wire(&deletion.table)
                .ok_or_else(|| StoreError::UnknownTable(deletion.table.clone()))?;
            if txn.delete_if_clean(table, deletion.server_id) {
                outcome.deletions_applied += 1;
            } else {
                outcome.blocked += 1;
                debug!(
                    table = %table,
                    server_id = deletion.server_id,
                    "dirty local row blocked remote deletion"
                );
            }
        }

        // The cursor advances with the applied delta or not at all.
        txn.set_last_sync_time(response.server_time);
        Ok(())
    })?;

    outcome.server_time = Some(response.server_time);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use cahier_protocol::{PullData, PullDeletion, PullRow};
    use cahier_store::Fields;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn pull_row(server_id: i64, value: serde_json::Value) -> PullRow {
        PullRow {
            server_id,
            last_modified_at: Utc::now(),
            fields: fields(value),
        }
    }

    fn response_with(data: PullData) -> PullResponse {
        PullResponse {
            data,
            school: None,
            server_time: Utc::now(),
        }
    }

    #[test]
    fn first_pull_sends_no_since_and_applies_rows() {
        let store = Store::new();
        let transport = MockTransport::new();

        let mut data = PullData::default();
        data.tables.insert(
            "academic_years".into(),
            vec![pull_row(1, json!({"name": "2025-2026"}))],
        );
        data.tables.insert(
            "classes".into(),
            vec![pull_row(10, json!({"name": "3A", "academic_year_id": 1}))],
        );
        let response = response_with(data);
        let server_time = response.server_time;
        transport.set_pull_response(response);

        let outcome = run_pull(&store, &transport, "school-1").unwrap();
        assert_eq!(outcome.pulled[&Table::AcademicYear], 1);
        assert_eq!(outcome.pulled[&Table::Class], 1);
        assert_eq!(outcome.blocked, 0);

        // Parent reference remapped from server id to local id.
        let year = store.find_by_server_id(Table::AcademicYear, 1).unwrap();
        let class = store.find_by_server_id(Table::Class, 10).unwrap();
        assert_eq!(class.field_i64("academic_year_id"), Some(year.local_id));
        assert!(!class.is_dirty);

        // Cursor advanced to the server clock.
        assert_eq!(store.settings().last_sync_time, Some(server_time));
        assert!(transport.pull_requests()[0].since.is_none());
    }

    #[test]
    fn second_pull_carries_the_cursor() {
        let store = Store::new();
        let transport = MockTransport::new();
        transport.set_pull_response(response_with(PullData::default()));

        run_pull(&store, &transport, "school-1").unwrap();
        run_pull(&store, &transport, "school-1").unwrap();

        let requests = transport.pull_requests();
        assert!(requests[0].since.is_none());
        assert!(requests[1].since.is_some());
    }

    #[test]
    fn dirty_rows_survive_the_delta() {
        let store = Store::new();
        // A synced row, then a local edit on top.
        store
            .transaction(|txn| {
                txn.apply_if_clean(
                    Table::AcademicYear,
                    IncomingRow {
                        server_id: 1,
                        last_modified_at: Utc::now(),
                        fields: fields(json!({"name": "2025-2026"})),
                    },
                )
            })
            .unwrap();
        let local_id = store.find_by_server_id(Table::AcademicYear, 1).unwrap().local_id;
        store
            .transaction(|txn| {
                txn.set_field(Table::AcademicYear, local_id, "name", json!("my edit"))
            })
            .unwrap();

        let transport = MockTransport::new();
        let mut data = PullData::default();
        data.tables.insert(
            "academic_years".into(),
            vec![pull_row(1, json!({"name": "server edit"}))],
        );
        transport.set_pull_response(response_with(data));

        let outcome = run_pull(&store, &transport, "school-1").unwrap();
        assert_eq!(outcome.blocked, 1);
        assert_eq!(outcome.total(), 0);

        let row = store.get(Table::AcademicYear, local_id).unwrap();
        assert_eq!(row.field_str("name"), Some("my edit"));
        assert!(row.is_dirty);
    }

    #[test]
    fn remote_deletions_apply_children_first() {
        let store = Store::new();
        let transport = MockTransport::new();

        // Seed a synced year with a class.
        let mut data = PullData::default();
        data.tables.insert(
            "academic_years".into(),
            vec![pull_row(1, json!({"name": "2025-2026"}))],
        );
        data.tables.insert(
            "classes".into(),
            vec![pull_row(10, json!({"name": "3A", "academic_year_id": 1}))],
        );
        transport.set_pull_response(response_with(data));
        run_pull(&store, &transport, "school-1").unwrap();

        // Delete both, listed parent first; the engine reorders.
        let mut data = PullData::default();
        data.deletions.push(PullDeletion {
            table: "academic_years".into(),
            server_id: 1,
        });
        data.deletions.push(PullDeletion {
            table: "classes".into(),
            server_id: 10,
        });
        transport.set_pull_response(response_with(data));

        let outcome = run_pull(&store, &transport, "school-1").unwrap();
        assert_eq!(outcome.deletions_applied, 2);
        assert_eq!(store.row_count(Table::AcademicYear), 0);
        assert_eq!(store.row_count(Table::Class), 0);
    }

    #[test]
    fn unknown_table_aborts_without_partial_apply() {
        let store = Store::new();
        let transport = MockTransport::new();

        let mut data = PullData::default();
        data.tables.insert(
            "academic_years".into(),
            vec![pull_row(1, json!({"name": "2025-2026"}))],
        );
        data.tables.insert(
            "report_cards".into(),
            vec![pull_row(7, json!({"term": "P1"}))],
        );
        transport.set_pull_response(response_with(data));

        let result = run_pull(&store, &transport, "school-1");
        assert!(result.is_err());
        // Nothing committed, cursor untouched.
        assert_eq!(store.row_count(Table::AcademicYear), 0);
        assert!(store.settings().last_sync_time.is_none());
    }
}
