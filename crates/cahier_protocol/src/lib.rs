//! # Cahier Sync Protocol
//!
//! Wire types for the Cahier push/pull protocol and the peer
//! class-export payload.
//!
//! This crate provides:
//! - `PushRequest`/`PushResponse` for uploading pending local changes
//! - `PullRequest`/`PullResponse` for downloading the remote delta
//! - `LogSubmission` for best-effort cycle reporting
//! - `ClassPayload` for the peer-to-peer class import path
//!
//! Everything is JSON with camelCase keys. This is a pure protocol crate
//! with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod log;
mod payload;
mod pull;
mod push;

pub use log::LogSubmission;
pub use payload::{ClassInfo, ClassPayload, PayloadGrade, PayloadStudent, PayloadSubject};
pub use pull::{PullData, PullDeletion, PullRequest, PullResponse, PullRow};
pub use push::{
    DeletionAck, DeletionEntry, PushData, PushRequest, PushResponse, PushResults, PushRow, RowAck,
};

/// A JSON object of domain fields.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;
