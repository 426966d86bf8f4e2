use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::intake::NewIntake;
use crate::models::{IntakeRecord, IntakeStatus};

use super::{IntakeRepository, Store, StoreError, StoreFuture, review_fields};

const INTAKE_COLUMNS: &str = "id, patient_name, appointment_time, intake_status, chief_complaint,
     symptoms, medical_history, created_at, reviewed, reviewed_at, reviewed_by";

impl IntakeRepository for Store {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
            Ok(())
        })
    }

    fn insert_intake<'a>(
        &'a self,
        intake: &'a NewIntake,
        created_at: DateTime<Utc>,
    ) -> StoreFuture<'a, IntakeRecord> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "INSERT INTO intakes (
                    id,
                    patient_name,
                    appointment_time,
                    intake_status,
                    chief_complaint,
                    symptoms,
                    medical_history,
                    created_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING {INTAKE_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&intake.patient_name)
            .bind(&intake.appointment_time)
            .bind(status_to_db(IntakeStatus::Complete))
            .bind(&intake.chief_complaint)
            .bind(&intake.symptoms)
            .bind(&intake.medical_history)
            .bind(created_at)
            .fetch_one(&self.pool)
            .await?;

            row_to_intake(&row)
        })
    }

    fn list_intakes(&self) -> StoreFuture<'_, Vec<IntakeRecord>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {INTAKE_COLUMNS}
                 FROM intakes
                 ORDER BY created_at DESC, id DESC"
            ))
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(row_to_intake).collect()
        })
    }

    fn set_intake_reviewed<'a>(
        &'a self,
        intake_id: Uuid,
        reviewed: bool,
        reviewed_by: &'a str,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, IntakeRecord> {
        Box::pin(async move {
            let (reviewed_at, reviewed_by) = review_fields(reviewed, reviewed_by, now);

            let row = sqlx::query(&format!(
                "UPDATE intakes
                 SET reviewed = $2, reviewed_at = $3, reviewed_by = $4
                 WHERE id = $1
                 RETURNING {INTAKE_COLUMNS}"
            ))
            .bind(intake_id)
            .bind(reviewed)
            .bind(reviewed_at)
            .bind(reviewed_by)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(row) => row_to_intake(&row),
                None => Err(StoreError::NotFound(intake_id)),
            }
        })
    }
}

fn status_to_db(status: IntakeStatus) -> &'static str {
    match status {
        IntakeStatus::InProgress => "IN_PROGRESS",
        IntakeStatus::Complete => "COMPLETE",
    }
}

fn status_from_db(value: &str) -> Result<IntakeStatus, StoreError> {
    match value {
        "IN_PROGRESS" => Ok(IntakeStatus::InProgress),
        "COMPLETE" => Ok(IntakeStatus::Complete),
        _ => Err(StoreError::InvalidData(format!(
            "unknown intake status persisted: {value}"
        ))),
    }
}

fn row_to_intake(row: &PgRow) -> Result<IntakeRecord, StoreError> {
    let intake_status: String = row.try_get("intake_status")?;

    Ok(IntakeRecord {
        id: row.try_get("id")?,
        patient_name: row.try_get("patient_name")?,
        appointment_time: row.try_get("appointment_time")?,
        intake_status: status_from_db(&intake_status)?,
        chief_complaint: row.try_get("chief_complaint")?,
        symptoms: row.try_get("symptoms")?,
        medical_history: row.try_get("medical_history")?,
        created_at: row.try_get("created_at")?,
        reviewed: row.try_get("reviewed")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
    })
}
