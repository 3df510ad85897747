//! Durable event log with process correlation and post-commit broadcast.

mod dispatch;
mod process;

use std::sync::Arc;

use tracing::warn;

use registra_core::{AppError, AppResult};
use registra_domain::{Process, ProcessEvent};

use crate::event_ports::{DispatchMode, SyncTransaction};

pub use dispatch::BroadcastDispatcher;
pub use process::{ProcessContext, RecordedEvent};

/// Commits process-correlated events atomically with the caller's state
/// mutations and broadcasts them afterwards.
#[derive(Clone)]
pub struct EventLog {
    dispatcher: Arc<BroadcastDispatcher>,
}

impl EventLog {
    /// Creates an event log delivering through the given dispatcher.
    #[must_use]
    pub fn new(dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Persists the process, its buffered events, and one join row per event
    /// inside the caller's open transaction, then commits.
    ///
    /// The caller's state mutations share the transaction, so either all of
    /// them, the process, and every event are committed, or none are. A
    /// context with zero events is refused, since a process without events
    /// is invalid and must not be committed.
    ///
    /// Broadcast-mode events are handed to the dispatcher exactly once per
    /// commit, in the order they were recorded. Dispatch failures are logged
    /// and never roll back the committed state.
    pub async fn commit_process(
        &self,
        mut transaction: Box<dyn SyncTransaction>,
        context: ProcessContext,
    ) -> AppResult<Process> {
        if context.is_empty() {
            transaction.rollback().await?;
            return Err(AppError::Validation(
                "a process must own at least one event".to_owned(),
            ));
        }

        let (process, recorded) = context.into_parts();

        if let Err(error) = Self::persist(transaction.as_mut(), &process, &recorded).await {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(
                    process_id = %process.process_id,
                    error = %rollback_error,
                    "failed to roll back aborted process transaction"
                );
            }
            return Err(error);
        }

        transaction.commit().await?;

        let broadcast: Vec<_> = recorded
            .into_iter()
            .filter(|recorded| recorded.mode == DispatchMode::Broadcast)
            .map(|recorded| recorded.event)
            .collect();
        self.dispatcher.dispatch_committed(&broadcast, &process).await;

        Ok(process)
    }

    async fn persist(
        transaction: &mut dyn SyncTransaction,
        process: &Process,
        recorded: &[RecordedEvent],
    ) -> AppResult<()> {
        transaction.insert_process(process).await?;

        for entry in recorded {
            transaction.insert_event(&entry.event, entry.mode).await?;
            let link = ProcessEvent::link(process, &entry.event)?;
            transaction.insert_process_event(&link).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
