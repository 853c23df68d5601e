use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted semaphore row: the permit counter for a concurrency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Semaphore {
    /// The concurrency key this row protects — unique.
    pub key: String,
    /// Remaining permits. `0` means fully claimed.
    pub value: i64,
    /// Lease expiry; past this instant the row is reclaimable by an
    /// external reaper.
    pub expires_at: DateTime<Utc>,
}
