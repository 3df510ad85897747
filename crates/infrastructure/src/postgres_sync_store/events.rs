use uuid::Uuid;

use registra_application::DispatchMode;
use registra_core::{AppError, AppResult};
use registra_domain::{Event, Process, ProcessEvent};

use super::{PostgresSyncTransaction, map_write_error};

impl PostgresSyncTransaction {
    pub(super) async fn insert_event_row(
        &mut self,
        event: &Event,
        mode: DispatchMode,
    ) -> AppResult<()> {
        let payload = serde_json::to_value(&event.payload).map_err(|error| {
            AppError::Internal(format!("failed to serialize event payload: {error}"))
        })?;
        let person_ids: Vec<Uuid> = event
            .person_ids
            .iter()
            .map(|person_id| person_id.as_uuid())
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO sync_events (
                event_id,
                event_name,
                payload,
                person_ids,
                raised_by,
                broadcast,
                created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(event.event_name())
        .bind(payload)
        .bind(person_ids)
        .bind(event.raised_by.encode())
        .bind(mode == DispatchMode::Broadcast)
        .bind(event.created_utc)
        .execute(&mut *self.transaction)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(database_error))
                if database_error.code().as_deref() == Some("23505") =>
            {
                Err(AppError::DuplicateEvent(format!(
                    "event {} already persisted: {database_error}",
                    event.event_id
                )))
            }
            Err(error) => Err(map_write_error("failed to insert event", error)),
        }
    }

    pub(super) async fn insert_process_row(&mut self, process: &Process) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_processes (
                process_id,
                process_type,
                raised_by,
                created_on,
                updated_on
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(process.process_id.as_uuid())
        .bind(process.process_type.as_str())
        .bind(process.raised_by.encode())
        .bind(process.created_on)
        .bind(process.updated_on)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_write_error("failed to insert process", error))?;

        Ok(())
    }

    pub(super) async fn insert_process_event_row(
        &mut self,
        process_event: &ProcessEvent,
    ) -> AppResult<()> {
        let person_ids: Vec<Uuid> = process_event
            .person_ids
            .iter()
            .map(|person_id| person_id.as_uuid())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO sync_process_events (
                process_event_id,
                process_id,
                event_name,
                payload,
                person_ids,
                created_on
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(process_event.process_event_id.as_uuid())
        .bind(process_event.process_id.as_uuid())
        .bind(process_event.event_name.as_str())
        .bind(process_event.payload.clone())
        .bind(person_ids)
        .bind(process_event.created_on)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_write_error("failed to insert process event", error))?;

        Ok(())
    }
}
