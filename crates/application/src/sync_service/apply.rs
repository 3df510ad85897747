use tracing::{debug, warn};

use registra_core::{AppError, AppResult, EventId};
use registra_domain::{
    Actor, AuditAction, ChangedItem, EntityRef, EntitySnapshot, Event, LocalRecord,
    MARKER_ATTRIBUTE, ProcessType, SyncMarker,
};

use crate::event_log::ProcessContext;
use crate::event_ports::SyncTransaction;

use super::{SyncEntityConfig, SyncService};

/// Outcome of inspecting a snapshot for a self-originated marker.
enum EchoStatus {
    /// No marker, an unrecognized marker, or a marker matching no local
    /// event. All processed as genuine external changes.
    NotAnEcho,
    /// The snapshot is the echo of a previously emitted local event.
    Echo(SyncMarker),
}

impl SyncService {
    /// Applies one changed item in its own transaction.
    ///
    /// State mutation and event emission commit atomically; an item that
    /// changes nothing observable persists nothing at all, which is what
    /// makes at-least-once redelivery idempotent.
    pub(super) async fn apply_item(
        &self,
        config: &SyncEntityConfig,
        item: &ChangedItem,
    ) -> AppResult<()> {
        let mut transaction = self.store.begin().await?;
        let mut context = ProcessContext::begin(ProcessType::ChangeSync, Actor::SyncProcess);

        let outcome = match item {
            ChangedItem::NewOrUpdated(snapshot) => {
                self.apply_snapshot(transaction.as_mut(), &mut context, config, snapshot)
                    .await
            }
            ChangedItem::RemovedOrDeleted(reference) => {
                Self::apply_removal(transaction.as_mut(), &mut context, config, reference).await
            }
        };

        if let Err(error) = outcome {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(
                    entity_id = %item.entity_id(),
                    error = %rollback_error,
                    "failed to roll back aborted sync transaction"
                );
            }
            return Err(error);
        }

        if context.is_empty() {
            transaction.rollback().await?;
            return Ok(());
        }

        self.event_log.commit_process(transaction, context).await?;
        Ok(())
    }

    async fn apply_snapshot(
        &self,
        transaction: &mut dyn SyncTransaction,
        context: &mut ProcessContext,
        config: &SyncEntityConfig,
        snapshot: &EntitySnapshot,
    ) -> AppResult<()> {
        let echo = Self::detect_echo(transaction, snapshot).await?;
        let existing = transaction.find_record(config.kind, snapshot.id).await?;

        match existing {
            None => {
                let record = LocalRecord::from_snapshot(config.kind, snapshot)?;
                self.backfill_history(context, config, &record, snapshot)
                    .await?;
                transaction.upsert_record(&record).await?;

                let event = Event::new(
                    snapshot_event_id(config, snapshot, "created"),
                    Actor::SyncProcess,
                    record.created_payload(),
                );
                record_for(context, &echo, event);
            }
            Some(local) => {
                let (merged, changed_columns) = local.apply_snapshot(snapshot)?;

                if let EchoStatus::Echo(marker) = echo {
                    let event_id = echo_event_id(config, snapshot, marker);
                    if transaction.event_exists(event_id).await? {
                        // The echo was already recorded on an earlier delivery.
                        return Ok(());
                    }
                    if !changed_columns.is_empty() {
                        transaction.upsert_record(&merged).await?;
                    }
                    debug!(
                        entity_id = %snapshot.id,
                        origin_event_id = %marker.event_id(),
                        "suppressing broadcast for echoed local write"
                    );
                    context.record_event_suppressed(Event::new(
                        event_id,
                        Actor::SyncProcess,
                        merged.updated_payload(changed_columns),
                    ));
                    return Ok(());
                }

                if changed_columns.is_empty() {
                    return Ok(());
                }

                transaction.upsert_record(&merged).await?;
                context.record_event(Event::new(
                    snapshot_event_id(config, snapshot, "updated"),
                    Actor::SyncProcess,
                    merged.updated_payload(changed_columns),
                ));
            }
        }

        Ok(())
    }

    async fn apply_removal(
        transaction: &mut dyn SyncTransaction,
        context: &mut ProcessContext,
        config: &SyncEntityConfig,
        reference: &EntityRef,
    ) -> AppResult<()> {
        let Some(local) = transaction.find_record(config.kind, reference.id).await? else {
            debug!(entity_id = %reference.id, "removal for locally unknown entity ignored");
            return Ok(());
        };

        if local.is_removed() {
            return Ok(());
        }

        let removed = local.mark_removed();
        transaction.upsert_record(&removed).await?;

        let entity_id = reference.id.to_string();
        let last_changed = local.updated_on().to_rfc3339();
        let event_id = EventId::derived(&[
            "change-sync",
            config.changes_key.as_str(),
            entity_id.as_str(),
            "removed",
            last_changed.as_str(),
        ]);
        context.record_event(Event::new(
            event_id,
            Actor::SyncProcess,
            removed.removed_payload(),
        ));

        Ok(())
    }

    /// Imports the entity's remote audit history as suppressed events.
    ///
    /// Runs the first time an entity with no local ancestry is seen, before
    /// its creation event, so prior history is not silently lost. Fetch
    /// failures are soft: the entity still syncs, without history.
    async fn backfill_history(
        &self,
        context: &mut ProcessContext,
        config: &SyncEntityConfig,
        record: &LocalRecord,
        snapshot: &EntitySnapshot,
    ) -> AppResult<()> {
        let entity_logical_name = config.kind.logical_name();
        let collection = match self
            .backfill
            .get(
                entity_logical_name,
                config.kind.primary_id_attribute(),
                snapshot.id,
            )
            .await
        {
            Ok(collection) => collection,
            Err(AppError::AuditFetchFailed(reason)) => {
                warn!(
                    entity_id = %snapshot.id,
                    reason,
                    "audit history unavailable; syncing entity without backfill"
                );
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let entity_id = snapshot.id.to_string();
        for detail in collection.details() {
            // The entity's existence is recorded by the creation event that
            // follows; only field-level history needs importing.
            if detail.action == AuditAction::Create {
                continue;
            }

            let changed_columns: Vec<String> = detail
                .changed_attributes
                .iter()
                .map(|change| change.attribute.clone())
                .collect();
            let raised_by = detail.user_id.map_or(Actor::SyncProcess, Actor::User);
            let audit_id = detail.audit_id.to_string();
            let event_id = EventId::derived(&[
                "audit-backfill",
                entity_logical_name,
                entity_id.as_str(),
                audit_id.as_str(),
            ]);

            context.record_event_suppressed(Event::new(
                event_id,
                raised_by,
                record.updated_payload(changed_columns),
            ));
        }

        Ok(())
    }

    async fn detect_echo(
        transaction: &mut dyn SyncTransaction,
        snapshot: &EntitySnapshot,
    ) -> AppResult<EchoStatus> {
        let Some(value) = snapshot.attribute(MARKER_ATTRIBUTE) else {
            return Ok(EchoStatus::NotAnEcho);
        };
        let Some(raw) = value.as_str() else {
            return Ok(EchoStatus::NotAnEcho);
        };

        let Some(marker) = SyncMarker::decode(raw) else {
            debug!(
                entity_id = %snapshot.id,
                marker = raw,
                "unrecognized marker encoding; treating as genuine external change"
            );
            return Ok(EchoStatus::NotAnEcho);
        };

        if transaction.event_exists(marker.event_id()).await? {
            Ok(EchoStatus::Echo(marker))
        } else {
            warn!(
                entity_id = %snapshot.id,
                marker_event_id = %marker.event_id(),
                "echo marker matches no local event; processing as genuine external change"
            );
            Ok(EchoStatus::NotAnEcho)
        }
    }
}

fn record_for(context: &mut ProcessContext, echo: &EchoStatus, event: Event) {
    match echo {
        EchoStatus::Echo(_) => context.record_event_suppressed(event),
        EchoStatus::NotAnEcho => context.record_event(event),
    }
}

fn snapshot_event_id(
    config: &SyncEntityConfig,
    snapshot: &EntitySnapshot,
    fact: &str,
) -> EventId {
    let entity_id = snapshot.id.to_string();
    let modified_on = snapshot.modified_on.to_rfc3339();
    EventId::derived(&[
        "change-sync",
        config.changes_key.as_str(),
        entity_id.as_str(),
        fact,
        modified_on.as_str(),
    ])
}

fn echo_event_id(
    config: &SyncEntityConfig,
    snapshot: &EntitySnapshot,
    marker: SyncMarker,
) -> EventId {
    let entity_id = snapshot.id.to_string();
    let origin = marker.event_id().to_string();
    let modified_on = snapshot.modified_on.to_rfc3339();
    EventId::derived(&[
        "change-sync",
        config.changes_key.as_str(),
        entity_id.as_str(),
        "echo",
        origin.as_str(),
        modified_on.as_str(),
    ])
}
