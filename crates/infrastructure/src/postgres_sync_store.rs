//! PostgreSQL-backed unit of work for the sync engine.

mod events;
mod records;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use registra_application::{DispatchMode, SyncStore, SyncTransaction};
use registra_core::{AppError, AppResult, EventId};
use registra_domain::{Event, LocalRecord, Process, ProcessEvent, SyncedEntityKind};

/// PostgreSQL implementation of the sync store port.
#[derive(Clone)]
pub struct PostgresSyncStore {
    pool: PgPool,
}

impl PostgresSyncStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for PostgresSyncStore {
    async fn begin(&self) -> AppResult<Box<dyn SyncTransaction>> {
        let transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin sync transaction: {error}"))
        })?;

        Ok(Box::new(PostgresSyncTransaction { transaction }))
    }

    async fn load_watermark(&self, changes_key: &str) -> AppResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT position
            FROM sync_watermarks
            WHERE changes_key = $1
            "#,
        )
        .bind(changes_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load sync watermark: {error}")))
    }

    async fn save_watermark(&self, changes_key: &str, position: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (changes_key, position, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (changes_key)
            DO UPDATE
            SET position = EXCLUDED.position,
                updated_at = now()
            "#,
        )
        .bind(changes_key)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save sync watermark: {error}")))?;

        Ok(())
    }
}

/// One open PostgreSQL transaction combining upserts with event persistence.
pub struct PostgresSyncTransaction {
    transaction: Transaction<'static, Postgres>,
}

#[async_trait]
impl SyncTransaction for PostgresSyncTransaction {
    async fn find_record(
        &mut self,
        kind: SyncedEntityKind,
        id: Uuid,
    ) -> AppResult<Option<LocalRecord>> {
        match kind {
            SyncedEntityKind::Contact => self.find_person(id).await,
            SyncedEntityKind::ProfessionalStatus => self.find_professional_status(id).await,
        }
    }

    async fn upsert_record(&mut self, record: &LocalRecord) -> AppResult<()> {
        match record {
            LocalRecord::Person(person) => self.upsert_person(person).await,
            LocalRecord::ProfessionalStatus(status) => {
                self.upsert_professional_status(status).await
            }
        }
    }

    async fn insert_event(&mut self, event: &Event, mode: DispatchMode) -> AppResult<()> {
        self.insert_event_row(event, mode).await
    }

    async fn insert_process(&mut self, process: &Process) -> AppResult<()> {
        self.insert_process_row(process).await
    }

    async fn insert_process_event(&mut self, process_event: &ProcessEvent) -> AppResult<()> {
        self.insert_process_event_row(process_event).await
    }

    async fn event_exists(&mut self, event_id: EventId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM sync_events
                WHERE event_id = $1
            )
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_one(&mut *self.transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to probe event existence: {error}")))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.transaction
            .commit()
            .await
            .map_err(|error| map_write_error("failed to commit sync transaction", error))
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.transaction.rollback().await.map_err(|error| {
            AppError::Internal(format!("failed to roll back sync transaction: {error}"))
        })
    }
}

/// Maps driver errors onto the engine's write taxonomy.
///
/// Serialization and deadlock failures surface as conflicts the sync loop
/// retries per item; everything else is internal.
fn map_write_error(context: &str, error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(database_error) = &error {
        if let Some(code) = database_error.code() {
            if code == "40001" || code == "40P01" {
                return AppError::Conflict(format!("{context}: {database_error}"));
            }
        }
    }

    AppError::Internal(format!("{context}: {error}"))
}
