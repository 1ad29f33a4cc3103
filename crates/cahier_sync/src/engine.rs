//! The cycle coordinator: push, then pull, then log.

use crate::error::{SyncError, SyncResult};
use crate::pull::{run_pull, PullOutcome};
use crate::push::{run_push, PushOutcome};
use crate::transport::SyncTransport;
use cahier_protocol::LogSubmission;
use cahier_store::{Store, SyncLogEntry, SyncStatus, SyncType};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The outcome of one full push-then-pull cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Full or delta, decided before the push phase began.
    pub sync_type: SyncType,
    /// What the push phase did.
    pub push: PushOutcome,
    /// What the pull phase did.
    pub pull: PullOutcome,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

impl CycleOutcome {
    /// Total rows and deletions moved in either direction.
    pub fn total_records(&self) -> u64 {
        self.push.total() + self.pull.total()
    }
}

/// Coordinates sync cycles against one store and one transport.
///
/// At most one cycle runs at a time: a call that finds a cycle already
/// in flight returns [`SyncError::CycleInProgress`] immediately instead
/// of queueing. Within a cycle, the push phase fully completes before
/// the pull phase begins, so the server never answers a delta that is
/// missing this device's own pending changes.
pub struct SyncEngine<T: SyncTransport> {
    store: Arc<Store>,
    transport: Arc<T>,
    cycle_lock: Mutex<()>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates an engine over a store and a transport.
    pub fn new(store: Arc<Store>, transport: Arc<T>) -> Self {
        Self {
            store,
            transport,
            cycle_lock: Mutex::new(()),
        }
    }

    /// The store this engine syncs.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Runs one push-then-pull cycle.
    ///
    /// Every attempt that gets past the cycle lock leaves a sync log
    /// entry, success or error; the entry is also reported to the remote
    /// log endpoint on a best-effort basis.
    pub fn run_cycle(&self) -> SyncResult<CycleOutcome> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .ok_or(SyncError::CycleInProgress)?;

        let settings = self.store.settings();
        let sync_type = if settings.last_sync_time.is_some() {
            SyncType::Delta
        } else {
            SyncType::Full
        };
        let started = Instant::now();

        match self.run_phases(&settings.tenant_id, settings.is_linked()) {
            Ok((push, pull)) => {
                let outcome = CycleOutcome {
                    sync_type,
                    push,
                    pull,
                    duration: started.elapsed(),
                };
                info!(
                    sync_type = ?sync_type,
                    records = outcome.total_records(),
                    duration_ms = outcome.duration.as_millis() as u64,
                    "sync cycle complete"
                );
                self.log_cycle(&outcome);
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "sync cycle failed");
                self.log_failure(sync_type, started.elapsed(), &err);
                Err(err)
            }
        }
    }

    fn run_phases(
        &self,
        tenant_id: &Option<String>,
        linked: bool,
    ) -> SyncResult<(PushOutcome, PullOutcome)> {
        // Preflight: both credentials must exist before any network call.
        if !linked {
            return Err(SyncError::NotLinked);
        }
        let tenant_id = tenant_id.as_deref().ok_or(SyncError::NotLinked)?;

        let push = run_push(self.store.as_ref(), self.transport.as_ref(), tenant_id)?;
        let pull = run_pull(self.store.as_ref(), self.transport.as_ref(), tenant_id)?;
        Ok((push, pull))
    }

    fn log_cycle(&self, outcome: &CycleOutcome) {
        let mut entry = SyncLogEntry::new(outcome.sync_type, SyncStatus::Success)
            .with_duration_ms(outcome.duration.as_millis() as u64);
        for (table, pushed) in &outcome.push.pushed {
            entry.record(table.wire_name(), *pushed, 0);
        }
        for (table, pulled) in &outcome.pull.pulled {
            entry.record(table.wire_name(), 0, *pulled);
        }
        self.submit_log(&entry);
        self.store.append_log(entry);
    }

    fn log_failure(&self, sync_type: SyncType, duration: Duration, err: &SyncError) {
        let entry = SyncLogEntry::new(sync_type, SyncStatus::Error)
            .with_error(err.to_string())
            .with_duration_ms(duration.as_millis() as u64);
        self.submit_log(&entry);
        self.store.append_log(entry);
    }

    fn submit_log(&self, entry: &SyncLogEntry) {
        let submission = LogSubmission {
            sync_type: match entry.sync_type {
                SyncType::Full => "FULL".into(),
                SyncType::Delta => "DELTA".into(),
            },
            status: match entry.status {
                SyncStatus::Success => "SUCCESS".into(),
                SyncStatus::Error => "ERROR".into(),
            },
            details: format_details(entry),
            error_message: entry.error_message.clone(),
            duration_ms: entry.duration_ms,
            timestamp: entry.timestamp,
        };
        if let Err(err) = self.transport.submit_log(&submission) {
            warn!(error = %err, "sync log submission failed, keeping local entry only");
        }
    }
}

fn format_details(entry: &SyncLogEntry) -> String {
    let parts: Vec<String> = entry
        .records
        .iter()
        .map(|(table, counts)| {
            format!("{table}: {} pushed, {} pulled", counts.pushed, counts.pulled)
        })
        .collect();
    if parts.is_empty() {
        "no records".to_string()
    } else {
        parts.join("; ")
    }
}
