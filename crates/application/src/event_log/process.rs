use chrono::{DateTime, Utc};

use registra_core::ProcessId;
use registra_domain::{Actor, Event, Process, ProcessType};

use crate::event_ports::DispatchMode;

/// One buffered event awaiting commit under a process.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// The buffered event.
    pub event: Event,
    /// Whether the event broadcasts once committed.
    pub mode: DispatchMode,
}

/// Correlates the events of one logical operation under a single process.
///
/// Beginning a context allocates a process id without persisting anything;
/// events buffer in recording order until the enclosing transaction commits
/// them all together. If that transaction aborts, neither the process nor any
/// of its events exist.
#[derive(Debug)]
pub struct ProcessContext {
    process_id: ProcessId,
    process_type: ProcessType,
    raised_by: Actor,
    started_on: DateTime<Utc>,
    recorded: Vec<RecordedEvent>,
}

impl ProcessContext {
    /// Begins a process for one unit of business work.
    #[must_use]
    pub fn begin(process_type: ProcessType, raised_by: Actor) -> Self {
        Self {
            process_id: ProcessId::new(),
            process_type,
            raised_by,
            started_on: Utc::now(),
            recorded: Vec::new(),
        }
    }

    /// Returns the allocated process id.
    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// Buffers an event for broadcast delivery after commit.
    pub fn record_event(&mut self, event: Event) {
        self.recorded.push(RecordedEvent {
            event,
            mode: DispatchMode::Broadcast,
        });
    }

    /// Buffers an event persisted without broadcast.
    ///
    /// Used for replayed or backfilled facts and for echoes of our own
    /// write-backs, where broadcasting would feed the change back to
    /// handlers that already observed it.
    pub fn record_event_suppressed(&mut self, event: Event) {
        self.recorded.push(RecordedEvent {
            event,
            mode: DispatchMode::Suppressed,
        });
    }

    /// Returns the buffered events in recording order.
    #[must_use]
    pub fn recorded(&self) -> &[RecordedEvent] {
        &self.recorded
    }

    /// Returns true when no event has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Finalizes the context into its process row and buffered events.
    #[must_use]
    pub fn into_parts(self) -> (Process, Vec<RecordedEvent>) {
        let process = Process {
            process_id: self.process_id,
            process_type: self.process_type,
            created_on: self.started_on,
            updated_on: Utc::now(),
            raised_by: self.raised_by,
        };

        (process, self.recorded)
    }
}
