//! Sync result reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SyncRequest;
use crate::error::Result;

/// Outcome of a successful sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Unique id of this sync run.
    pub sync_id: String,

    pub source_db: String,
    pub source_table: String,
    pub target_db: String,
    pub target_table: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u64>,

    /// Rows removed from the target table before the copy.
    pub rows_deleted: u64,

    /// Rows inserted into the target table.
    pub rows_copied: u64,

    /// Number of batch flushes performed.
    pub batches_flushed: u64,

    /// True when reading stopped at `max_rows`.
    pub row_cap_reached: bool,

    /// Start time (UTC).
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,

    /// Copy throughput.
    pub rows_per_second: i64,
}

impl SyncReport {
    pub(crate) fn new(sync_id: String, request: &SyncRequest, started_at: DateTime<Utc>) -> Self {
        Self {
            sync_id,
            source_db: request.source_db.clone(),
            source_table: request.source_table.clone(),
            target_db: request.target_db.clone(),
            target_table: request.target_table.clone(),
            max_rows: request.max_rows,
            rows_deleted: 0,
            rows_copied: 0,
            batches_flushed: 0,
            row_cap_reached: false,
            started_at,
            duration_seconds: 0.0,
            rows_per_second: 0,
        }
    }

    pub(crate) fn finish(&mut self, elapsed: std::time::Duration) {
        self.duration_seconds = elapsed.as_secs_f64();
        self.rows_per_second = if self.duration_seconds > 0.0 {
            (self.rows_copied as f64 / self.duration_seconds) as i64
        } else {
            0
        };
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
