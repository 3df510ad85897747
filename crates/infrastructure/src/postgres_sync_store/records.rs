use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use registra_core::{AppError, AppResult, PersonId};
use registra_domain::{
    LocalRecord, PersonRecord, ProfessionalStatusRecord, RecordState, StatusKind,
};

use super::{PostgresSyncTransaction, map_write_error};

#[derive(Debug, FromRow)]
struct PersonRow {
    person_id: Uuid,
    first_name: String,
    last_name: String,
    email: Option<String>,
    date_of_birth: Option<NaiveDate>,
    state: String,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ProfessionalStatusRow {
    professional_status_id: Uuid,
    person_id: Uuid,
    kind: String,
    granted_on: Option<NaiveDate>,
    state: String,
    created_on: DateTime<Utc>,
    updated_on: DateTime<Utc>,
}

impl PostgresSyncTransaction {
    pub(super) async fn find_person(&mut self, id: Uuid) -> AppResult<Option<LocalRecord>> {
        let row = sqlx::query_as::<_, PersonRow>(
            r#"
            SELECT
                person_id,
                first_name,
                last_name,
                email,
                date_of_birth,
                state,
                created_on,
                updated_on
            FROM person_records
            WHERE person_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load person record: {error}")))?;

        row.map(|row| {
            Ok(LocalRecord::Person(PersonRecord {
                person_id: PersonId::from_uuid(row.person_id),
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                date_of_birth: row.date_of_birth,
                state: RecordState::parse(row.state.as_str())?,
                created_on: row.created_on,
                updated_on: row.updated_on,
            }))
        })
        .transpose()
    }

    pub(super) async fn find_professional_status(
        &mut self,
        id: Uuid,
    ) -> AppResult<Option<LocalRecord>> {
        let row = sqlx::query_as::<_, ProfessionalStatusRow>(
            r#"
            SELECT
                professional_status_id,
                person_id,
                kind,
                granted_on,
                state,
                created_on,
                updated_on
            FROM professional_status_records
            WHERE professional_status_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load professional status record: {error}"))
        })?;

        row.map(|row| {
            Ok(LocalRecord::ProfessionalStatus(ProfessionalStatusRecord {
                professional_status_id: row.professional_status_id,
                person_id: PersonId::from_uuid(row.person_id),
                kind: StatusKind::parse(row.kind.as_str())?,
                granted_on: row.granted_on,
                state: RecordState::parse(row.state.as_str())?,
                created_on: row.created_on,
                updated_on: row.updated_on,
            }))
        })
        .transpose()
    }

    pub(super) async fn upsert_person(&mut self, person: &PersonRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO person_records (
                person_id,
                first_name,
                last_name,
                email,
                date_of_birth,
                state,
                created_on,
                updated_on
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (person_id)
            DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                date_of_birth = EXCLUDED.date_of_birth,
                state = EXCLUDED.state,
                updated_on = EXCLUDED.updated_on
            "#,
        )
        .bind(person.person_id.as_uuid())
        .bind(person.first_name.as_str())
        .bind(person.last_name.as_str())
        .bind(person.email.as_deref())
        .bind(person.date_of_birth)
        .bind(person.state.as_str())
        .bind(person.created_on)
        .bind(person.updated_on)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_write_error("failed to upsert person record", error))?;

        Ok(())
    }

    pub(super) async fn upsert_professional_status(
        &mut self,
        status: &ProfessionalStatusRecord,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO professional_status_records (
                professional_status_id,
                person_id,
                kind,
                granted_on,
                state,
                created_on,
                updated_on
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (professional_status_id)
            DO UPDATE
            SET person_id = EXCLUDED.person_id,
                kind = EXCLUDED.kind,
                granted_on = EXCLUDED.granted_on,
                state = EXCLUDED.state,
                updated_on = EXCLUDED.updated_on
            "#,
        )
        .bind(status.professional_status_id)
        .bind(status.person_id.as_uuid())
        .bind(status.kind.as_str())
        .bind(status.granted_on)
        .bind(status.state.as_str())
        .bind(status.created_on)
        .bind(status.updated_on)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| map_write_error("failed to upsert professional status record", error))?;

        Ok(())
    }
}
