use async_trait::async_trait;
use uuid::Uuid;

use registra_core::{AppResult, EventId};
use registra_domain::{Event, LocalRecord, Process, ProcessEvent, SyncedEntityKind};

/// Controls whether a persisted event is handed to the dispatcher on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Deliver to registered handlers once the transaction commits.
    Broadcast,
    /// Persist only. Used for replay, backfill, and echoes of our own
    /// write-backs, where broadcasting would re-trigger downstream handlers.
    Suppressed,
}

/// Transactional unit-of-work port over the local store.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Opens one transaction.
    async fn begin(&self) -> AppResult<Box<dyn SyncTransaction>>;

    /// Returns the persisted cursor position for one changes key.
    async fn load_watermark(&self, changes_key: &str) -> AppResult<Option<String>>;

    /// Persists the cursor position for one changes key.
    ///
    /// Called only after every transaction of the batch committed, so a crash
    /// replays from the previous position rather than skipping work.
    async fn save_watermark(&self, changes_key: &str, position: &str) -> AppResult<()>;
}

/// One open transaction combining state mutations with event persistence.
#[async_trait]
pub trait SyncTransaction: Send {
    /// Loads one synced record by external identity.
    async fn find_record(
        &mut self,
        kind: SyncedEntityKind,
        id: Uuid,
    ) -> AppResult<Option<LocalRecord>>;

    /// Inserts or updates one synced record.
    async fn upsert_record(&mut self, record: &LocalRecord) -> AppResult<()>;

    /// Persists one immutable event.
    ///
    /// Fails with [`registra_core::AppError::DuplicateEvent`] when the event
    /// id collides with an existing row.
    async fn insert_event(&mut self, event: &Event, mode: DispatchMode) -> AppResult<()>;

    /// Persists one process row.
    async fn insert_process(&mut self, process: &Process) -> AppResult<()>;

    /// Persists one process-event join row.
    async fn insert_process_event(&mut self, process_event: &ProcessEvent) -> AppResult<()>;

    /// Returns true when an event with the given id was already committed.
    async fn event_exists(&mut self, event_id: EventId) -> AppResult<bool>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Rolls the transaction back, discarding every buffered write.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}
