use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use registra_core::{AppError, AppResult, PersonId};

use crate::change::EntitySnapshot;
use crate::event::EventPayload;
use crate::marker::MARKER_ATTRIBUTE;

/// Logical column names of the external `contact` entity.
pub const CONTACT_FIRST_NAME: &str = "firstname";
/// Last name column.
pub const CONTACT_LAST_NAME: &str = "lastname";
/// Primary email column.
pub const CONTACT_EMAIL: &str = "emailaddress1";
/// Birth date column, formatted `YYYY-MM-DD`.
pub const CONTACT_BIRTH_DATE: &str = "birthdate";
/// Record state column, `0` active and `1` inactive.
pub const STATE_CODE: &str = "statecode";
/// Owning person column of the external `professionalstatus` entity.
pub const STATUS_PERSON: &str = "personid";
/// Status kind column.
pub const STATUS_KIND: &str = "statuskind";
/// Grant date column, formatted `YYYY-MM-DD`.
pub const STATUS_GRANTED_ON: &str = "grantedon";

/// Entity types the engine synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncedEntityKind {
    /// Person records, the CRM `contact` entity.
    Contact,
    /// Professional status records.
    ProfessionalStatus,
}

impl SyncedEntityKind {
    /// Returns the external entity type name.
    #[must_use]
    pub fn logical_name(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::ProfessionalStatus => "professionalstatus",
        }
    }

    /// Resolves an external entity type name.
    #[must_use]
    pub fn from_logical_name(name: &str) -> Option<Self> {
        match name {
            "contact" => Some(Self::Contact),
            "professionalstatus" => Some(Self::ProfessionalStatus),
            _ => None,
        }
    }

    /// Returns the primary id attribute used by the external audit API.
    #[must_use]
    pub fn primary_id_attribute(&self) -> &'static str {
        match self {
            Self::Contact => "contactid",
            Self::ProfessionalStatus => "professionalstatusid",
        }
    }

    /// Returns the columns selected from the change feed, marker included.
    #[must_use]
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Contact => &[
                CONTACT_FIRST_NAME,
                CONTACT_LAST_NAME,
                CONTACT_EMAIL,
                CONTACT_BIRTH_DATE,
                STATE_CODE,
                MARKER_ATTRIBUTE,
            ],
            Self::ProfessionalStatus => &[
                STATUS_PERSON,
                STATUS_KIND,
                STATUS_GRANTED_ON,
                STATE_CODE,
                MARKER_ATTRIBUTE,
            ],
        }
    }
}

/// Lifecycle state of a synced local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// The record is live.
    Active,
    /// The record was deactivated or cancelled.
    Deactivated,
}

impl RecordState {
    /// Returns the stable state value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deactivated => "deactivated",
        }
    }

    /// Parses a stable state value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "active" => Ok(Self::Active),
            "deactivated" => Ok(Self::Deactivated),
            other => Err(AppError::Validation(format!(
                "unrecognized record state '{other}'"
            ))),
        }
    }
}

/// Kind of professional status a person holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Fully qualified.
    Qualified,
    /// In training toward qualification.
    Trainee,
    /// Qualification suspended.
    Suspended,
}

impl StatusKind {
    /// Returns the stable kind value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualified => "qualified",
            Self::Trainee => "trainee",
            Self::Suspended => "suspended",
        }
    }

    /// Parses a stable kind value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "qualified" => Ok(Self::Qualified),
            "trainee" => Ok(Self::Trainee),
            "suspended" => Ok(Self::Suspended),
            other => Err(AppError::Validation(format!(
                "unrecognized status kind '{other}'"
            ))),
        }
    }
}

/// Local copy of one external person record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    /// Aggregate key, shared with the external entity id.
    pub person_id: PersonId,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Primary email address.
    pub email: Option<String>,
    /// Date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Lifecycle state.
    pub state: RecordState,
    /// Instant the local copy was created.
    pub created_on: DateTime<Utc>,
    /// Instant the local copy last changed.
    pub updated_on: DateTime<Utc>,
}

/// Local copy of one external professional status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfessionalStatusRecord {
    /// Record identifier, shared with the external entity id.
    pub professional_status_id: Uuid,
    /// Owning person.
    pub person_id: PersonId,
    /// Status kind.
    pub kind: StatusKind,
    /// Date the status was granted.
    pub granted_on: Option<NaiveDate>,
    /// Lifecycle state.
    pub state: RecordState,
    /// Instant the local copy was created.
    pub created_on: DateTime<Utc>,
    /// Instant the local copy last changed.
    pub updated_on: DateTime<Utc>,
}

/// One synced local record of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRecord {
    /// Person record.
    Person(PersonRecord),
    /// Professional status record.
    ProfessionalStatus(ProfessionalStatusRecord),
}

impl LocalRecord {
    /// Builds a fresh local record from an external snapshot.
    pub fn from_snapshot(kind: SyncedEntityKind, snapshot: &EntitySnapshot) -> AppResult<Self> {
        if snapshot.entity_logical_name != kind.logical_name() {
            return Err(AppError::Validation(format!(
                "snapshot entity '{}' does not match expected '{}'",
                snapshot.entity_logical_name,
                kind.logical_name()
            )));
        }

        let now = Utc::now();
        match kind {
            SyncedEntityKind::Contact => Ok(Self::Person(PersonRecord {
                person_id: PersonId::from_uuid(snapshot.id),
                first_name: optional_string(snapshot, CONTACT_FIRST_NAME)?.unwrap_or_default(),
                last_name: optional_string(snapshot, CONTACT_LAST_NAME)?.unwrap_or_default(),
                email: optional_string(snapshot, CONTACT_EMAIL)?,
                date_of_birth: optional_date(snapshot, CONTACT_BIRTH_DATE)?,
                state: snapshot_state(snapshot)?.unwrap_or(RecordState::Active),
                created_on: now,
                updated_on: now,
            })),
            SyncedEntityKind::ProfessionalStatus => {
                let person_id = required_uuid(snapshot, STATUS_PERSON)?;
                let kind_value = optional_string(snapshot, STATUS_KIND)?.ok_or_else(|| {
                    AppError::Validation(format!(
                        "professionalstatus snapshot {} is missing '{STATUS_KIND}'",
                        snapshot.id
                    ))
                })?;

                Ok(Self::ProfessionalStatus(ProfessionalStatusRecord {
                    professional_status_id: snapshot.id,
                    person_id: PersonId::from_uuid(person_id),
                    kind: StatusKind::parse(kind_value.as_str())?,
                    granted_on: optional_date(snapshot, STATUS_GRANTED_ON)?,
                    state: snapshot_state(snapshot)?.unwrap_or(RecordState::Active),
                    created_on: now,
                    updated_on: now,
                }))
            }
        }
    }

    /// Applies an external snapshot, returning the merged record and the
    /// logical names of the columns whose value changed.
    ///
    /// Only columns present in the snapshot are considered; the marker column
    /// is metadata and never reported as a change.
    pub fn apply_snapshot(&self, snapshot: &EntitySnapshot) -> AppResult<(Self, Vec<String>)> {
        let mut changed: Vec<String> = Vec::new();

        let merged = match self {
            Self::Person(person) => {
                let mut merged = person.clone();

                if let Some(value) = snapshot.attribute(CONTACT_FIRST_NAME) {
                    let parsed = string_value(value, CONTACT_FIRST_NAME)?.unwrap_or_default();
                    if parsed != merged.first_name {
                        merged.first_name = parsed;
                        changed.push(CONTACT_FIRST_NAME.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(CONTACT_LAST_NAME) {
                    let parsed = string_value(value, CONTACT_LAST_NAME)?.unwrap_or_default();
                    if parsed != merged.last_name {
                        merged.last_name = parsed;
                        changed.push(CONTACT_LAST_NAME.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(CONTACT_EMAIL) {
                    let parsed = string_value(value, CONTACT_EMAIL)?;
                    if parsed != merged.email {
                        merged.email = parsed;
                        changed.push(CONTACT_EMAIL.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(CONTACT_BIRTH_DATE) {
                    let parsed = date_value(value, CONTACT_BIRTH_DATE)?;
                    if parsed != merged.date_of_birth {
                        merged.date_of_birth = parsed;
                        changed.push(CONTACT_BIRTH_DATE.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(STATE_CODE) {
                    let parsed = state_value(value)?;
                    if parsed != merged.state {
                        merged.state = parsed;
                        changed.push(STATE_CODE.to_owned());
                    }
                }

                if !changed.is_empty() {
                    merged.updated_on = Utc::now();
                }
                Self::Person(merged)
            }
            Self::ProfessionalStatus(status) => {
                let mut merged = status.clone();

                if let Some(value) = snapshot.attribute(STATUS_PERSON) {
                    let parsed = uuid_value(value, STATUS_PERSON)?;
                    if parsed != merged.person_id.as_uuid() {
                        merged.person_id = PersonId::from_uuid(parsed);
                        changed.push(STATUS_PERSON.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(STATUS_KIND) {
                    let raw = string_value(value, STATUS_KIND)?.ok_or_else(|| {
                        AppError::Validation(format!(
                            "professionalstatus snapshot {} has null '{STATUS_KIND}'",
                            snapshot.id
                        ))
                    })?;
                    let parsed = StatusKind::parse(raw.as_str())?;
                    if parsed != merged.kind {
                        merged.kind = parsed;
                        changed.push(STATUS_KIND.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(STATUS_GRANTED_ON) {
                    let parsed = date_value(value, STATUS_GRANTED_ON)?;
                    if parsed != merged.granted_on {
                        merged.granted_on = parsed;
                        changed.push(STATUS_GRANTED_ON.to_owned());
                    }
                }
                if let Some(value) = snapshot.attribute(STATE_CODE) {
                    let parsed = state_value(value)?;
                    if parsed != merged.state {
                        merged.state = parsed;
                        changed.push(STATE_CODE.to_owned());
                    }
                }

                if !changed.is_empty() {
                    merged.updated_on = Utc::now();
                }
                Self::ProfessionalStatus(merged)
            }
        };

        Ok((merged, changed))
    }

    /// Returns the entity kind of the record.
    #[must_use]
    pub fn kind(&self) -> SyncedEntityKind {
        match self {
            Self::Person(_) => SyncedEntityKind::Contact,
            Self::ProfessionalStatus(_) => SyncedEntityKind::ProfessionalStatus,
        }
    }

    /// Returns the record identifier shared with the external entity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Person(person) => person.person_id.as_uuid(),
            Self::ProfessionalStatus(status) => status.professional_status_id,
        }
    }

    /// Returns the person the record concerns.
    #[must_use]
    pub fn person_id(&self) -> PersonId {
        match self {
            Self::Person(person) => person.person_id,
            Self::ProfessionalStatus(status) => status.person_id,
        }
    }

    /// Returns the instant the record last changed.
    #[must_use]
    pub fn updated_on(&self) -> DateTime<Utc> {
        match self {
            Self::Person(person) => person.updated_on,
            Self::ProfessionalStatus(status) => status.updated_on,
        }
    }

    /// Returns true when the record has been deactivated.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        match self {
            Self::Person(person) => person.state == RecordState::Deactivated,
            Self::ProfessionalStatus(status) => status.state == RecordState::Deactivated,
        }
    }

    /// Returns a copy of the record marked deactivated.
    #[must_use]
    pub fn mark_removed(&self) -> Self {
        match self {
            Self::Person(person) => {
                let mut removed = person.clone();
                removed.state = RecordState::Deactivated;
                removed.updated_on = Utc::now();
                Self::Person(removed)
            }
            Self::ProfessionalStatus(status) => {
                let mut removed = status.clone();
                removed.state = RecordState::Deactivated;
                removed.updated_on = Utc::now();
                Self::ProfessionalStatus(removed)
            }
        }
    }

    /// Builds the creation fact payload for the record.
    #[must_use]
    pub fn created_payload(&self) -> EventPayload {
        match self {
            Self::Person(person) => EventPayload::PersonCreated {
                person_id: person.person_id,
            },
            Self::ProfessionalStatus(status) => EventPayload::ProfessionalStatusCreated {
                professional_status_id: status.professional_status_id,
                person_id: status.person_id,
            },
        }
    }

    /// Builds the update fact payload listing the changed columns.
    #[must_use]
    pub fn updated_payload(&self, changed_columns: Vec<String>) -> EventPayload {
        match self {
            Self::Person(person) => EventPayload::PersonUpdated {
                person_id: person.person_id,
                changed_columns,
            },
            Self::ProfessionalStatus(status) => EventPayload::ProfessionalStatusUpdated {
                professional_status_id: status.professional_status_id,
                person_id: status.person_id,
                changed_columns,
            },
        }
    }

    /// Builds the removal fact payload for the record.
    #[must_use]
    pub fn removed_payload(&self) -> EventPayload {
        match self {
            Self::Person(person) => EventPayload::PersonDeactivated {
                person_id: person.person_id,
            },
            Self::ProfessionalStatus(status) => EventPayload::ProfessionalStatusRemoved {
                professional_status_id: status.professional_status_id,
                person_id: status.person_id,
            },
        }
    }
}

fn optional_string(snapshot: &EntitySnapshot, column: &str) -> AppResult<Option<String>> {
    match snapshot.attribute(column) {
        Some(value) => string_value(value, column),
        None => Ok(None),
    }
}

fn optional_date(snapshot: &EntitySnapshot, column: &str) -> AppResult<Option<NaiveDate>> {
    match snapshot.attribute(column) {
        Some(value) => date_value(value, column),
        None => Ok(None),
    }
}

fn snapshot_state(snapshot: &EntitySnapshot) -> AppResult<Option<RecordState>> {
    match snapshot.attribute(STATE_CODE) {
        Some(value) => Ok(Some(state_value(value)?)),
        None => Ok(None),
    }
}

fn required_uuid(snapshot: &EntitySnapshot, column: &str) -> AppResult<Uuid> {
    let value = snapshot.attribute(column).ok_or_else(|| {
        AppError::Validation(format!(
            "{} snapshot {} is missing '{column}'",
            snapshot.entity_logical_name, snapshot.id
        ))
    })?;
    uuid_value(value, column)
}

fn string_value(value: &Value, column: &str) -> AppResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        other => Err(AppError::Validation(format!(
            "column '{column}' holds non-text value {other}"
        ))),
    }
}

fn date_value(value: &Value, column: &str) -> AppResult<Option<NaiveDate>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => NaiveDate::parse_from_str(text.as_str(), "%Y-%m-%d")
            .map(Some)
            .map_err(|error| {
                AppError::Validation(format!("column '{column}' holds invalid date: {error}"))
            }),
        other => Err(AppError::Validation(format!(
            "column '{column}' holds non-date value {other}"
        ))),
    }
}

fn state_value(value: &Value) -> AppResult<RecordState> {
    match value.as_i64() {
        Some(0) => Ok(RecordState::Active),
        Some(1) => Ok(RecordState::Deactivated),
        _ => Err(AppError::Validation(format!(
            "column '{STATE_CODE}' holds unrecognized value {value}"
        ))),
    }
}

fn uuid_value(value: &Value, column: &str) -> AppResult<Uuid> {
    let raw = value.as_str().ok_or_else(|| {
        AppError::Validation(format!("column '{column}' holds non-text value {value}"))
    })?;
    Uuid::parse_str(raw).map_err(|error| {
        AppError::Validation(format!("column '{column}' holds invalid uuid: {error}"))
    })
}
