//! Per-user sync bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the most recent schedule sync for a user.
///
/// Stored at `sync_status/{user_id}`, separate from the credential document
/// so sync bookkeeping never races with token updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync_at: Option<DateTime<Utc>>,
    /// True when every fetched record was stored
    pub success: bool,
    /// Joined error messages of the last run, empty on success
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub updated: u32,
}
