use std::sync::Arc;

use tracing::{debug, warn};

use registra_domain::{Event, Process};

use crate::event_ports::EventHandler;

/// Delivers committed events to registered handlers.
///
/// Handlers are registered once during startup, before any dispatch runs.
#[derive(Default)]
pub struct BroadcastDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl BroadcastDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one handler.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Delivers committed events to every handler, in commit order.
    ///
    /// Invoked once per commit, after the transaction succeeded. A failing
    /// handler is logged and skipped; the remaining handlers still receive
    /// the event, and the committed state is never affected. Dispatch is not
    /// cancellable once started, so handlers must treat every event as
    /// delivered and manage their own idempotency by event id.
    pub async fn dispatch_committed(&self, events: &[Event], process: &Process) {
        for event in events {
            for handler in &self.handlers {
                match handler.handle(event, process).await {
                    Ok(()) => debug!(
                        handler = handler.name(),
                        event_id = %event.event_id,
                        event_name = event.event_name(),
                        "event delivered"
                    ),
                    Err(error) => warn!(
                        handler = handler.name(),
                        event_id = %event.event_id,
                        event_name = event.event_name(),
                        error = %error,
                        "event handler failed"
                    ),
                }
            }
        }
    }
}
