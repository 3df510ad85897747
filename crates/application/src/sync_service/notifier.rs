use std::sync::Arc;

use async_trait::async_trait;

use registra_core::AppResult;
use registra_domain::{Event, Process};

use crate::event_ports::EventHandler;
use crate::sync_ports::{InvalidationChannel, PERSON_RECORDS_CHANNEL};

/// Signals other running instances when person-scoped facts broadcast.
///
/// Listeners re-read authoritative state on notification; the signal itself
/// carries nothing beyond the channel name.
pub struct InvalidationNotifier {
    channel: Arc<dyn InvalidationChannel>,
}

impl InvalidationNotifier {
    /// Creates a notifier publishing on the given channel implementation.
    #[must_use]
    pub fn new(channel: Arc<dyn InvalidationChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl EventHandler for InvalidationNotifier {
    fn name(&self) -> &'static str {
        "invalidation-notifier"
    }

    async fn handle(&self, event: &Event, _process: &Process) -> AppResult<()> {
        if event.person_ids.is_empty() {
            return Ok(());
        }

        self.channel.notify(PERSON_RECORDS_CHANNEL).await
    }
}
