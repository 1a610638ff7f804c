//! Cache statistics and progress tracking

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a maintenance sweep over one namespace.
///
/// Entries that could not be processed are counted separately from entries
/// that were removed, so callers can tell a clean sweep from a limping one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Entries removed by the sweep.
    pub removed: u64,
    /// Entries skipped because processing them failed.
    pub failed: u64,
}

impl SweepOutcome {
    /// Merge another outcome into this one.
    pub fn merge(&mut self, other: SweepOutcome) {
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Aggregate cache size statistics for the app-level management UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSizeStats {
    /// Bytes tracked by metadata, per namespace.
    pub namespaces: HashMap<String, u64>,

    /// Bytes held in blob directories (images, thumbnails).
    pub blob_bytes: u64,

    /// Timestamp when stats were calculated, Unix milliseconds.
    pub calculated_at_ms: i64,
}

impl CacheSizeStats {
    /// Total bytes across namespaces and blob storage.
    pub fn total_bytes(&self) -> u64 {
        self.namespaces.values().sum::<u64>() + self.blob_bytes
    }

    /// Bytes tracked for one namespace.
    pub fn namespace_bytes(&self, namespace: &str) -> u64 {
        self.namespaces.get(namespace).copied().unwrap_or(0)
    }

    /// Calculate cache usage as a percentage of a size budget.
    pub fn usage_percentage(&self, max_size: u64) -> f64 {
        if max_size == 0 {
            return 0.0;
        }

        (self.total_bytes() as f64 / max_size as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self, max_size: u64) -> bool {
        self.usage_percentage(max_size) > 90.0
    }
}

/// Prefetch lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    InProgress,
    Paused,
    Completed,
    Canceled,
    Failed,
}

impl DownloadStatus {
    /// Returns `true` for states a download never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Canceled | DownloadStatus::Failed
        )
    }
}

/// Download progress information for one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Content identifier (e.g. a book id).
    pub content_id: String,

    /// Current lifecycle state.
    pub status: DownloadStatus,

    /// Items finished so far.
    pub completed_items: u64,

    /// Total items in the job.
    pub total_items: u64,

    /// Failure detail when `status` is `Failed`.
    pub error_message: Option<String>,

    /// Job creation timestamp, Unix milliseconds.
    pub started_at_ms: i64,

    /// Last state change timestamp, Unix milliseconds.
    pub updated_at_ms: i64,
}

impl DownloadProgress {
    /// Create a new queued job.
    pub fn new(content_id: impl Into<String>, total_items: u64, now_ms: i64) -> Self {
        Self {
            content_id: content_id.into(),
            status: DownloadStatus::Queued,
            completed_items: 0,
            total_items,
            error_message: None,
            started_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Fraction of the job done, in [0.0, 1.0]. Zero when the job is empty.
    pub fn progress(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            self.completed_items as f64 / self.total_items as f64
        }
    }

    /// Progress as a whole percentage (0-100).
    pub fn percent(&self) -> u8 {
        (self.progress() * 100.0).round().min(100.0) as u8
    }

    /// Move a queued or paused job into `InProgress`.
    pub fn mark_in_progress(&mut self, now_ms: i64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DownloadStatus::InProgress;
        self.updated_at_ms = now_ms;
    }

    /// Pause an in-flight job.
    pub fn mark_paused(&mut self, now_ms: i64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DownloadStatus::Paused;
        self.updated_at_ms = now_ms;
    }

    /// Record one finished item.
    pub fn advance(&mut self, now_ms: i64) {
        if self.status.is_terminal() {
            return;
        }
        self.completed_items = (self.completed_items + 1).min(self.total_items);
        self.updated_at_ms = now_ms;
    }

    /// Finish the job successfully.
    pub fn mark_completed(&mut self, now_ms: i64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DownloadStatus::Completed;
        self.updated_at_ms = now_ms;
    }

    /// Cancel the job.
    pub fn mark_canceled(&mut self, now_ms: i64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DownloadStatus::Canceled;
        self.updated_at_ms = now_ms;
    }

    /// Fail the job with a message.
    pub fn mark_failed(&mut self, message: impl Into<String>, now_ms: i64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DownloadStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at_ms = now_ms;
    }
}
