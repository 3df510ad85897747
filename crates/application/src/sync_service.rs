//! The sync loop: merges change feed batches with audit backfill, applies
//! idempotent upserts, and emits local events for genuine changes.

mod apply;
mod notifier;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use registra_core::{AppError, AppResult};
use registra_domain::{ChangeBatch, ChangedItem, SyncedEntityKind};

use crate::audit_backfill::AuditBackfillCache;
use crate::event_log::EventLog;
use crate::event_ports::SyncStore;
use crate::sync_ports::{ChangeFeed, ChangeFeedRequest, DEFAULT_PAGE_SIZE};

pub use notifier::InvalidationNotifier;

/// Per-entity-type sync configuration.
///
/// Each changes key is consumed by at most one worker at a time, preserving
/// per-entity-type ordering; workers for different entity types run fully in
/// parallel.
#[derive(Debug, Clone)]
pub struct SyncEntityConfig {
    /// Entity type this worker synchronizes.
    pub kind: SyncedEntityKind,
    /// Cursor identity for the entity type.
    pub changes_key: String,
    /// Maximum items per feed batch.
    pub page_size: usize,
    /// Rollup policy passed to the change feed.
    pub roll_up_changes: bool,
    /// Skips snapshots modified before this instant.
    pub modified_since: Option<DateTime<Utc>>,
}

impl SyncEntityConfig {
    /// Creates the default configuration for one entity type.
    #[must_use]
    pub fn new(kind: SyncedEntityKind) -> Self {
        Self {
            kind,
            changes_key: kind.logical_name().to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
            roll_up_changes: true,
            modified_since: None,
        }
    }
}

/// Orchestrates one entity type's consumption of the external change feed.
pub struct SyncService {
    store: Arc<dyn SyncStore>,
    feed: Arc<dyn ChangeFeed>,
    backfill: Arc<AuditBackfillCache>,
    event_log: EventLog,
}

impl SyncService {
    /// Creates a sync service over the given ports.
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        feed: Arc<dyn ChangeFeed>,
        backfill: Arc<AuditBackfillCache>,
        event_log: EventLog,
    ) -> Self {
        Self {
            store,
            feed,
            backfill,
            event_log,
        }
    }

    /// Runs one pass over the change feed, resuming from the persisted
    /// watermark, until the feed drains or cancellation is requested.
    ///
    /// Cancellation is honored between batches only; an in-flight item
    /// transaction always runs to commit-or-abort. Transient feed errors
    /// propagate to the caller, which owns retry and backoff; resumption is
    /// safe because the watermark only ever reflects committed batches.
    pub async fn run(
        &self,
        config: &SyncEntityConfig,
        mut cancel: watch::Receiver<bool>,
    ) -> AppResult<()> {
        let watermark = self.store.load_watermark(config.changes_key.as_str()).await?;
        info!(
            changes_key = config.changes_key.as_str(),
            resume_token = watermark.as_deref().unwrap_or("<start>"),
            roll_up_changes = config.roll_up_changes,
            "sync pass started"
        );

        let mut stream = self.feed.open(self.request_for(config, watermark)).await?;

        loop {
            if *cancel.borrow() {
                info!(
                    changes_key = config.changes_key.as_str(),
                    "sync pass cancelled"
                );
                return Ok(());
            }

            let next = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!(
                            changes_key = config.changes_key.as_str(),
                            "sync pass cancelled between batches"
                        );
                        return Ok(());
                    }
                    continue;
                }
                next = stream.next_batch() => next?,
            };

            let Some(batch) = next else {
                info!(
                    changes_key = config.changes_key.as_str(),
                    "change feed drained"
                );
                return Ok(());
            };

            self.apply_batch(config, batch).await?;
        }
    }

    /// Applies one batch item by item, then advances the watermark.
    ///
    /// Batch N+1 is never fetched before this returns, bounding how far the
    /// reader can run ahead of the database. The watermark is written only
    /// after every item committed, so crash recovery redelivers at least
    /// once and never skips.
    pub async fn apply_batch(
        &self,
        config: &SyncEntityConfig,
        batch: ChangeBatch,
    ) -> AppResult<()> {
        let item_count = batch.items.len();
        for item in &batch.items {
            self.apply_item_with_retry(config, item).await?;
        }

        self.store
            .save_watermark(config.changes_key.as_str(), batch.resume_token.as_str())
            .await?;
        info!(
            changes_key = config.changes_key.as_str(),
            item_count,
            resume_token = batch.resume_token.as_str(),
            "batch committed and watermark advanced"
        );

        Ok(())
    }

    async fn apply_item_with_retry(
        &self,
        config: &SyncEntityConfig,
        item: &ChangedItem,
    ) -> AppResult<()> {
        match self.apply_item(config, item).await {
            Err(AppError::Conflict(reason)) => {
                warn!(
                    changes_key = config.changes_key.as_str(),
                    entity_id = %item.entity_id(),
                    reason,
                    "transaction conflict; retrying item against current state"
                );
                self.apply_item(config, item).await
            }
            other => other,
        }
    }

    fn request_for(
        &self,
        config: &SyncEntityConfig,
        resume_token: Option<String>,
    ) -> ChangeFeedRequest {
        ChangeFeedRequest {
            changes_key: config.changes_key.clone(),
            entity_logical_name: config.kind.logical_name().to_owned(),
            columns: config
                .kind
                .columns()
                .iter()
                .map(|column| (*column).to_owned())
                .collect(),
            modified_since: config.modified_since,
            page_size: config.page_size,
            roll_up_changes: config.roll_up_changes,
            resume_token,
        }
    }
}
