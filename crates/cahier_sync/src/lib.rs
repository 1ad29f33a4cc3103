//! # Cahier Sync Engine
//!
//! Push/pull synchronization engine for Cahier.
//!
//! This crate provides:
//! - The push engine (dirty rows + tombstones up, acknowledgements back)
//! - The pull engine (remote delta applied under the dirty guard)
//! - The cycle coordinator serializing push-then-pull cycles
//! - A background scheduler for periodic cycles
//! - Transport abstraction with a mock for tests
//! - The peer class-import conflict resolver (merge / overwrite)
//!
//! ## Key Invariants
//!
//! - Within one cycle, push fully completes before pull begins
//! - A pull never changes a row that is dirty at the moment of apply
//! - A failed phase leaves all local flags and tombstones untouched;
//!   the next cycle retries the same work
//! - Every cycle outcome, success or error, lands in the sync log

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod import;
mod pull;
mod push;
mod scheduler;
mod transport;

pub use engine::{CycleOutcome, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use import::{ClassImporter, ImportCounts, ImportReport, ImportStrategy};
pub use pull::PullOutcome;
pub use push::PushOutcome;
pub use scheduler::SyncScheduler;
pub use transport::{MockTransport, SyncTransport};
