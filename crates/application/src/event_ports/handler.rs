use async_trait::async_trait;

use registra_core::AppResult;
use registra_domain::{Event, Process};

/// Subscriber invoked for each broadcast event after its transaction commits.
///
/// Handlers run independently; one failing never blocks the others. Delivery
/// is best-effort: the event is durable regardless, so a crashed handler
/// recovers by re-scanning the event store, not by retrying the dispatch.
/// Handlers needing exactly-once side effects must be idempotent by event id.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name used in delivery logs.
    fn name(&self) -> &'static str;

    /// Handles one committed event within its owning process.
    async fn handle(&self, event: &Event, process: &Process) -> AppResult<()>;
}
