//! Cache of historical audit records for entities seen for the first time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use registra_core::AppResult;
use registra_domain::AuditDetailCollection;

use crate::sync_ports::AuditSource;

/// Caches audit history fetched from the external CRM.
///
/// A collection is cached whole on first fetch and replaced whole on
/// explicit population; it is never partially updated. One cache instance
/// is scoped to one sync worker, injected rather than shared process-wide,
/// so tests and workers stay isolated.
///
/// Concurrent misses on the same key may both fetch; the cache makes no
/// single-flight guarantee. The duplicate remote call is a performance
/// cost, not a correctness problem, since both fetches cache the same
/// whole collection.
pub struct AuditBackfillCache {
    source: Arc<dyn AuditSource>,
    entries: RwLock<HashMap<(String, Uuid), AuditDetailCollection>>,
}

impl AuditBackfillCache {
    /// Creates an empty cache over the given audit source.
    #[must_use]
    pub fn new(source: Arc<dyn AuditSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns true when history for the entity is already cached.
    ///
    /// A probe only; never performs the remote fetch.
    pub async fn have(&self, entity_logical_name: &str, id: Uuid) -> bool {
        self.entries
            .read()
            .await
            .contains_key(&(entity_logical_name.to_owned(), id))
    }

    /// Returns the cached history, fetching and caching it on a miss.
    ///
    /// An entity without remote audit history yields an empty collection.
    pub async fn get(
        &self,
        entity_logical_name: &str,
        primary_id_attribute: &str,
        id: Uuid,
    ) -> AppResult<AuditDetailCollection> {
        let key = (entity_logical_name.to_owned(), id);

        if let Some(collection) = self.entries.read().await.get(&key) {
            return Ok(collection.clone());
        }

        let collection = self
            .source
            .get_audit_detail(entity_logical_name, primary_id_attribute, id)
            .await?;
        debug!(
            entity_logical_name,
            entity_id = %id,
            detail_count = collection.details().len(),
            "cached audit history"
        );

        self.entries.write().await.insert(key, collection.clone());
        Ok(collection)
    }

    /// Populates the cache explicitly, replacing any existing collection.
    ///
    /// Used when backfill is performed out-of-band ahead of time.
    pub async fn set(
        &self,
        entity_logical_name: &str,
        id: Uuid,
        collection: AuditDetailCollection,
    ) {
        self.entries
            .write()
            .await
            .insert((entity_logical_name.to_owned(), id), collection);
    }
}
