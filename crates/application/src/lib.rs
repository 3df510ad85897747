//! Application services and ports for the Registra sync engine.

#![forbid(unsafe_code)]

mod audit_backfill;
mod event_log;
mod event_ports;
mod sync_ports;
mod sync_service;

pub use audit_backfill::AuditBackfillCache;
pub use event_log::{BroadcastDispatcher, EventLog, ProcessContext, RecordedEvent};
pub use event_ports::{DispatchMode, EventHandler, SyncStore, SyncTransaction};
pub use sync_ports::{
    AuditSource, ChangeFeed, ChangeFeedRequest, ChangeFeedStream, DEFAULT_PAGE_SIZE,
    InvalidationCallback, InvalidationChannel, PERSON_RECORDS_CHANNEL,
};
pub use sync_service::{InvalidationNotifier, SyncEntityConfig, SyncService};
