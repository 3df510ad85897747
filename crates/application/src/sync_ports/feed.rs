use async_trait::async_trait;
use chrono::{DateTime, Utc};

use registra_core::AppResult;
use registra_domain::ChangeBatch;

/// Page size used when the caller does not override it.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Parameters for one consumption of the external change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeedRequest {
    /// Cursor identity the consumer resumes by.
    pub changes_key: String,
    /// External entity type to stream.
    pub entity_logical_name: String,
    /// Columns to select on each snapshot.
    pub columns: Vec<String>,
    /// Drops snapshots modified before this instant, used to skip already
    /// processed history after an initial full sync.
    pub modified_since: Option<DateTime<Utc>>,
    /// Maximum items per batch.
    pub page_size: usize,
    /// Collapses repeated changes to one entity into the latest one.
    ///
    /// This is a correctness policy, not a performance hint: full audit
    /// reconstruction requires every distinct change, so it must stream
    /// with rollup disabled.
    pub roll_up_changes: bool,
    /// Position to resume from; `None` streams from the beginning.
    pub resume_token: Option<String>,
}

/// Source of per-entity-type change batches.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens one pull-based stream of change batches.
    ///
    /// Fails with [`registra_core::AppError::FeedUnavailable`] when the
    /// source cannot be reached; resuming with the last acknowledged
    /// watermark is the caller's responsibility.
    async fn open(&self, request: ChangeFeedRequest) -> AppResult<Box<dyn ChangeFeedStream>>;
}

/// One open consumption of the change feed.
///
/// The stream is unbounded and advanced only by the consumer; batches are
/// yielded incrementally and never materialized as a whole.
#[async_trait]
pub trait ChangeFeedStream: Send {
    /// Returns the next batch, or `None` when the feed is drained.
    ///
    /// May stay pending indefinitely while the feed is idle; that is
    /// expected, not an error.
    async fn next_batch(&mut self) -> AppResult<Option<ChangeBatch>>;
}
