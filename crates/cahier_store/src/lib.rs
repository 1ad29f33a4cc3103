//! # Cahier Store
//!
//! Local store and change-tracking engine for Cahier.
//!
//! This crate provides:
//! - The entity tables synchronized with the remote authority
//! - Per-row dirty flags and the tombstone ledger for deletions
//! - Pre-mutation snapshots enabling diff and revert
//! - The dirty guard (`apply_if_clean`) shared by pull and peer import
//! - The pending-change history and revert service
//! - The append-only sync log
//!
//! ## Key Invariants
//!
//! - A row is dirty from the moment of any local mutation until a push
//!   acknowledges it, or it is explicitly ignored or reverted
//! - A tombstone exists iff a locally deleted row is still unacknowledged
//! - A snapshot exists for a dirty row iff the row had a clean state
//!   before the current edit; it is captured in the same transaction as
//!   the mutation
//! - A remote value never overwrites a row that is currently dirty

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod history;
mod row;
mod settings;
mod store;
mod sync_log;
mod table;

pub use error::{StoreError, StoreResult};
pub use history::{ChangeKind, FieldChange, History, PendingChange, RevertOutcome};
pub use row::{Fields, IncomingRow, Row};
pub use settings::SyncSettings;
pub use store::{Store, StoreTxn, Tombstone};
pub use sync_log::{RecordCounts, SyncLogEntry, SyncStatus, SyncType};
pub use table::Table;
