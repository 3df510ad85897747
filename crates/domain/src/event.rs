use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use registra_core::{AppError, AppResult, EventId, PersonId};

/// Actor a fact is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A platform user identified by account id.
    User(Uuid),
    /// The sync engine acting on behalf of the external system.
    SyncProcess,
}

impl Actor {
    /// Encodes the actor as a stable storage value.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::User(user_id) => format!("user:{user_id}"),
            Self::SyncProcess => "system:sync".to_owned(),
        }
    }

    /// Decodes an actor from its storage value.
    pub fn decode(value: &str) -> AppResult<Self> {
        if value == "system:sync" {
            return Ok(Self::SyncProcess);
        }

        if let Some(raw) = value.strip_prefix("user:") {
            let user_id = Uuid::parse_str(raw).map_err(|error| {
                AppError::Validation(format!("invalid actor user id '{raw}': {error}"))
            })?;
            return Ok(Self::User(user_id));
        }

        Err(AppError::Validation(format!(
            "unrecognized actor value '{value}'"
        )))
    }
}

/// Closed set of fact payloads the engine records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A person record came into existence.
    PersonCreated {
        /// Person the fact concerns.
        person_id: PersonId,
    },
    /// One or more person columns changed value.
    PersonUpdated {
        /// Person the fact concerns.
        person_id: PersonId,
        /// Logical names of the columns that changed.
        changed_columns: Vec<String>,
    },
    /// A person record was deactivated.
    PersonDeactivated {
        /// Person the fact concerns.
        person_id: PersonId,
    },
    /// A professional status record came into existence.
    ProfessionalStatusCreated {
        /// Professional status record identifier.
        professional_status_id: Uuid,
        /// Person the status belongs to.
        person_id: PersonId,
    },
    /// One or more professional status columns changed value.
    ProfessionalStatusUpdated {
        /// Professional status record identifier.
        professional_status_id: Uuid,
        /// Person the status belongs to.
        person_id: PersonId,
        /// Logical names of the columns that changed.
        changed_columns: Vec<String>,
    },
    /// A professional status record was removed.
    ProfessionalStatusRemoved {
        /// Professional status record identifier.
        professional_status_id: Uuid,
        /// Person the status belonged to.
        person_id: PersonId,
    },
}

impl EventPayload {
    /// Returns the stable event name.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PersonCreated { .. } => "person_created",
            Self::PersonUpdated { .. } => "person_updated",
            Self::PersonDeactivated { .. } => "person_deactivated",
            Self::ProfessionalStatusCreated { .. } => "professional_status_created",
            Self::ProfessionalStatusUpdated { .. } => "professional_status_updated",
            Self::ProfessionalStatusRemoved { .. } => "professional_status_removed",
        }
    }

    /// Returns the aggregate keys the fact concerns.
    #[must_use]
    pub fn person_ids(&self) -> Vec<PersonId> {
        match self {
            Self::PersonCreated { person_id }
            | Self::PersonUpdated { person_id, .. }
            | Self::PersonDeactivated { person_id }
            | Self::ProfessionalStatusCreated { person_id, .. }
            | Self::ProfessionalStatusUpdated { person_id, .. }
            | Self::ProfessionalStatusRemoved { person_id, .. } => vec![*person_id],
        }
    }
}

/// An immutable fact. Never mutated or deleted once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Globally unique identifier, assigned at creation.
    pub event_id: EventId,
    /// Creation instant in UTC.
    pub created_utc: DateTime<Utc>,
    /// Actor the fact is attributed to.
    pub raised_by: Actor,
    /// Aggregate keys the fact concerns, for correlation queries.
    pub person_ids: Vec<PersonId>,
    /// Discriminated fact payload.
    pub payload: EventPayload,
}

impl Event {
    /// Creates an event with the given identifier, stamped at the current instant.
    #[must_use]
    pub fn new(event_id: EventId, raised_by: Actor, payload: EventPayload) -> Self {
        let person_ids = payload.person_ids();
        Self {
            event_id,
            created_utc: Utc::now(),
            raised_by,
            person_ids,
            payload,
        }
    }

    /// Returns the stable event name of the payload.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        self.payload.event_name()
    }
}
