//! Error taxonomy for the sync engine.

use cahier_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request never reached the server. Nothing local changed; the
    /// next scheduled cycle retries.
    #[error("connectivity error: {message}")]
    Connectivity {
        /// Underlying transport message.
        message: String,
    },

    /// Tenant id or credential missing. Detected before any network call.
    #[error("device is not linked to a school account")]
    NotLinked,

    /// The server rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// The local apply transaction failed and rolled back; dirty flags
    /// remain set, so the next cycle retries.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Another cycle is already running.
    #[error("a sync cycle is already in progress")]
    CycleInProgress,
}

impl SyncError {
    /// Creates a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Whether the next scheduled cycle can be expected to succeed
    /// without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connectivity { .. } | SyncError::Server(_) | SyncError::CycleInProgress
        )
    }

    /// The string shown to the user. Derived from the taxonomy, never
    /// from raw transport text.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::Connectivity { .. } => {
                "The server could not be reached. Your changes are kept and will be synced later."
            }
            SyncError::NotLinked => "This device is not linked to a school account.",
            SyncError::Server(_) => "The server could not process the sync request.",
            SyncError::Store(_) => "Changes could not be applied locally; nothing was lost.",
            SyncError::CycleInProgress => "A synchronization is already running.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::connectivity("timed out").is_retryable());
        assert!(SyncError::Server("500".into()).is_retryable());
        assert!(!SyncError::NotLinked.is_retryable());
    }

    #[test]
    fn user_message_hides_transport_detail() {
        let err = SyncError::connectivity("dns failure at 10.0.0.2");
        assert!(!err.user_message().contains("10.0.0.2"));
        assert!(err.to_string().contains("dns failure"));
    }
}
