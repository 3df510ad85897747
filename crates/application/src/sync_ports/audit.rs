use async_trait::async_trait;
use uuid::Uuid;

use registra_core::AppResult;
use registra_domain::AuditDetailCollection;

/// Source of historical field-level change records in the external CRM.
#[async_trait]
pub trait AuditSource: Send + Sync {
    /// Fetches the full audit history for one external entity.
    ///
    /// Returns an empty collection, not an error, when the external system
    /// has no audit history for the entity. Fails with
    /// [`registra_core::AppError::AuditFetchFailed`] when the history cannot
    /// be fetched.
    async fn get_audit_detail(
        &self,
        entity_logical_name: &str,
        primary_id_attribute: &str,
        id: Uuid,
    ) -> AppResult<AuditDetailCollection>;
}
