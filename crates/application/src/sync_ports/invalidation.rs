use std::sync::Arc;

use async_trait::async_trait;

use registra_core::AppResult;

/// Channel signalling person record changes to other running instances.
pub const PERSON_RECORDS_CHANNEL: &str = "registra:person-records";

/// Callback invoked once per received notification.
pub type InvalidationCallback = Arc<dyn Fn() + Send + Sync>;

/// Cross-process pub/sub signal for cache invalidation.
///
/// Notifications carry no payload beyond the channel name; listeners must
/// re-read authoritative state rather than trust anything in the signal.
#[async_trait]
pub trait InvalidationChannel: Send + Sync {
    /// Fire-and-forget broadcast to every listening instance.
    async fn notify(&self, channel: &str) -> AppResult<()>;

    /// Registers a callback invoked per notification on the channel.
    async fn listen(&self, channel: &str, on_notify: InvalidationCallback) -> AppResult<()>;
}
