use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// The entity was created.
    Create,
    /// Column values changed.
    Update,
    /// The entity was deleted.
    Delete,
}

impl AuditAction {
    /// Returns the stable action value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One column transition inside an audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditAttributeChange {
    /// Logical column name.
    pub attribute: String,
    /// Value before the change, when recorded.
    pub old_value: Option<Value>,
    /// Value after the change, when recorded.
    pub new_value: Option<Value>,
}

/// One historical field-level change record for an external entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDetail {
    /// External audit record identifier.
    pub audit_id: Uuid,
    /// Kind of change.
    pub action: AuditAction,
    /// External user the change is attributed to, when known.
    pub user_id: Option<Uuid>,
    /// Instant the external system recorded the change.
    pub recorded_on: DateTime<Utc>,
    /// Column transitions in the change.
    pub changed_attributes: Vec<AuditAttributeChange>,
}

/// Ordered historical changes for one external entity.
///
/// Replaced as a whole on refresh, never partially updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditDetailCollection {
    details: Vec<AuditDetail>,
}

impl AuditDetailCollection {
    /// Creates a collection ordered by recording instant, oldest first.
    #[must_use]
    pub fn new(mut details: Vec<AuditDetail>) -> Self {
        details.sort_by_key(|detail| detail.recorded_on);
        Self { details }
    }

    /// Creates an empty collection for an entity with no audit history.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the ordered details.
    #[must_use]
    pub fn details(&self) -> &[AuditDetail] {
        &self.details
    }

    /// Returns true when the entity has no audit history.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}
