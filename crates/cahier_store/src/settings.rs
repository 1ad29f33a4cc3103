//! Persisted sync settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settings consumed and produced by the push/pull cycle.
///
/// The tenant id and bearer token are owned by the licensing collaborator;
/// the engine only reads them. `last_sync_time` is advanced by a fully
/// successful pull and becomes the next cycle's delta window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// The tenant (school) identifier.
    pub tenant_id: Option<String>,
    /// Bearer credential for the remote authority.
    pub bearer_token: Option<String>,
    /// Server time of the last fully successful sync.
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncSettings {
    /// Returns true when both tenant id and credential are present.
    pub fn is_linked(&self) -> bool {
        self.tenant_id.is_some() && self.bearer_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_requires_both_credentials() {
        let mut settings = SyncSettings::default();
        assert!(!settings.is_linked());

        settings.tenant_id = Some("school-1".into());
        assert!(!settings.is_linked());

        settings.bearer_token = Some("token".into());
        assert!(settings.is_linked());
    }
}
