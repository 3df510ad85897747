use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Snapshot of one external entity, restricted to the selected columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySnapshot {
    /// External entity type.
    pub entity_logical_name: String,
    /// External entity identifier.
    pub id: Uuid,
    /// Selected column values keyed by logical column name.
    pub attributes: BTreeMap<String, Value>,
    /// Modification instant reported by the external system.
    pub modified_on: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Returns one attribute value when the column was selected.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Reference to one external entity without column data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    /// External entity type.
    pub entity_logical_name: String,
    /// External entity identifier.
    pub id: Uuid,
}

/// One observed change from the external feed. Consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedItem {
    /// The entity exists externally with the given column values.
    NewOrUpdated(EntitySnapshot),
    /// The entity no longer exists externally.
    RemovedOrDeleted(EntityRef),
}

impl ChangedItem {
    /// Returns the external entity type of the change.
    #[must_use]
    pub fn entity_logical_name(&self) -> &str {
        match self {
            Self::NewOrUpdated(snapshot) => snapshot.entity_logical_name.as_str(),
            Self::RemovedOrDeleted(reference) => reference.entity_logical_name.as_str(),
        }
    }

    /// Returns the external entity identifier of the change.
    #[must_use]
    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::NewOrUpdated(snapshot) => snapshot.id,
            Self::RemovedOrDeleted(reference) => reference.id,
        }
    }
}

/// One page of changes plus the cursor position after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Changes in feed arrival order.
    pub items: Vec<ChangedItem>,
    /// Opaque continuation position; becomes the watermark once the batch commits.
    pub resume_token: String,
}

/// Collapses repeated changes to the same entity into the latest one.
///
/// Identity is `(entity_logical_name, id)`; last write wins by arrival order
/// and survivors keep the arrival order of their final occurrence. With
/// rollup disabled callers use the input unchanged, preserving every change
/// for full audit reconstruction.
#[must_use]
pub fn roll_up_changes(items: Vec<ChangedItem>) -> Vec<ChangedItem> {
    let mut seen: HashSet<(String, Uuid)> = HashSet::new();
    let mut survivors: Vec<ChangedItem> = Vec::with_capacity(items.len());

    for item in items.into_iter().rev() {
        let identity = (item.entity_logical_name().to_owned(), item.entity_id());
        if seen.insert(identity) {
            survivors.push(item);
        }
    }

    survivors.reverse();
    survivors
}
