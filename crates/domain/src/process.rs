use chrono::{DateTime, Utc};
use serde_json::Value;

use registra_core::{AppError, AppResult, EventId, PersonId, ProcessId};

use crate::event::{Actor, Event};

/// Kind of business work a process represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    /// Applying a change-feed batch item from the external CRM.
    ChangeSync,
    /// Importing historical audit records for a newly seen entity.
    AuditBackfill,
    /// Operator-initiated correction of local records.
    RecordMaintenance,
}

impl ProcessType {
    /// Returns the stable process type value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeSync => "change_sync",
            Self::AuditBackfill => "audit_backfill",
            Self::RecordMaintenance => "record_maintenance",
        }
    }

    /// Parses a stable process type value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "change_sync" => Ok(Self::ChangeSync),
            "audit_backfill" => Ok(Self::AuditBackfill),
            "record_maintenance" => Ok(Self::RecordMaintenance),
            other => Err(AppError::Validation(format!(
                "unrecognized process type '{other}'"
            ))),
        }
    }
}

/// One unit of business work owning at least one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    /// Process identifier.
    pub process_id: ProcessId,
    /// Kind of business work.
    pub process_type: ProcessType,
    /// Instant the process began.
    pub created_on: DateTime<Utc>,
    /// Instant the process last changed.
    pub updated_on: DateTime<Utc>,
    /// Actor the process is attributed to.
    pub raised_by: Actor,
}

/// Join row linking one event to its owning process.
///
/// Exclusively owned by the process; removed only by retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    /// Same value as the linked event's id.
    pub process_event_id: EventId,
    /// Owning process.
    pub process_id: ProcessId,
    /// Stable event name, denormalized for correlation queries.
    pub event_name: String,
    /// Serialized event payload.
    pub payload: Value,
    /// Aggregate keys the event concerns.
    pub person_ids: Vec<PersonId>,
    /// Creation instant of the linked event.
    pub created_on: DateTime<Utc>,
}

impl ProcessEvent {
    /// Builds the join row for one event under its owning process.
    pub fn link(process: &Process, event: &Event) -> AppResult<Self> {
        let payload = serde_json::to_value(&event.payload).map_err(|error| {
            AppError::Internal(format!("failed to serialize event payload: {error}"))
        })?;

        Ok(Self {
            process_event_id: event.event_id,
            process_id: process.process_id,
            event_name: event.event_name().to_owned(),
            payload,
            person_ids: event.person_ids.clone(),
            created_on: event.created_utc,
        })
    }
}

#[cfg(test)]
mod tests {
    use registra_core::{EventId, PersonId, ProcessId};

    use chrono::Utc;

    use super::{Process, ProcessEvent, ProcessType};
    use crate::event::{Actor, Event, EventPayload};

    #[test]
    fn process_type_round_trips() {
        for process_type in [
            ProcessType::ChangeSync,
            ProcessType::AuditBackfill,
            ProcessType::RecordMaintenance,
        ] {
            match ProcessType::parse(process_type.as_str()) {
                Ok(parsed) => assert_eq!(parsed, process_type),
                Err(error) => panic!("process type should parse: {error}"),
            }
        }

        assert!(ProcessType::parse("bulk_import").is_err());
    }

    #[test]
    fn process_event_links_carry_the_event_identity() {
        let process = Process {
            process_id: ProcessId::new(),
            process_type: ProcessType::ChangeSync,
            created_on: Utc::now(),
            updated_on: Utc::now(),
            raised_by: Actor::SyncProcess,
        };
        let event = Event::new(
            EventId::new(),
            Actor::SyncProcess,
            EventPayload::PersonDeactivated {
                person_id: PersonId::new(),
            },
        );

        let link = match ProcessEvent::link(&process, &event) {
            Ok(link) => link,
            Err(error) => panic!("link should serialize: {error}"),
        };
        assert_eq!(link.process_event_id, event.event_id);
        assert_eq!(link.process_id, process.process_id);
        assert_eq!(link.event_name, "person_deactivated");
        assert_eq!(link.person_ids, event.person_ids);
    }
}
