//! Domain model for the Registra sync engine.

#![forbid(unsafe_code)]

/// Audit history fetched from the external CRM.
pub mod audit;
/// Change feed items and rollup policy.
pub mod change;
/// Immutable event facts and their payloads.
pub mod event;
/// Echo marker stamped onto external records at write-back time.
pub mod marker;
/// Synced local aggregates and snapshot mapping.
pub mod person;
/// Processes grouping events into one unit of business work.
pub mod process;

pub use audit::{AuditAction, AuditAttributeChange, AuditDetail, AuditDetailCollection};
pub use change::{ChangeBatch, ChangedItem, EntityRef, EntitySnapshot, roll_up_changes};
pub use event::{Actor, Event, EventPayload};
pub use marker::{MARKER_ATTRIBUTE, SyncMarker};
pub use person::{
    CONTACT_BIRTH_DATE, CONTACT_EMAIL, CONTACT_FIRST_NAME, CONTACT_LAST_NAME, LocalRecord,
    PersonRecord, ProfessionalStatusRecord, RecordState, STATE_CODE, STATUS_GRANTED_ON,
    STATUS_KIND, STATUS_PERSON, StatusKind, SyncedEntityKind,
};
pub use process::{Process, ProcessEvent, ProcessType};
