use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::intake::NewIntake;
use crate::models::{IntakeRecord, IntakeStatus};

use super::{IntakeRepository, StoreError, StoreFuture, review_fields};

/// Process-local intake store used when no database is configured.
#[derive(Clone, Default)]
pub struct MemoryIntakeStore {
    records: Arc<Mutex<HashMap<Uuid, IntakeRecord>>>,
}

impl MemoryIntakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<Uuid, IntakeRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IntakeRepository for MemoryIntakeStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn insert_intake<'a>(
        &'a self,
        intake: &'a NewIntake,
        created_at: DateTime<Utc>,
    ) -> StoreFuture<'a, IntakeRecord> {
        Box::pin(async move {
            let record = IntakeRecord {
                id: Uuid::new_v4(),
                patient_name: intake.patient_name.clone(),
                appointment_time: intake.appointment_time.clone(),
                intake_status: IntakeStatus::Complete,
                chief_complaint: intake.chief_complaint.clone(),
                symptoms: intake.symptoms.clone(),
                medical_history: intake.medical_history.clone(),
                created_at,
                reviewed: false,
                reviewed_at: None,
                reviewed_by: String::new(),
            };
            self.lock_records().insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn list_intakes(&self) -> StoreFuture<'_, Vec<IntakeRecord>> {
        Box::pin(async move {
            let mut records = self.lock_records().values().cloned().collect::<Vec<_>>();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(records)
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
            let mut records = self.lock_records();
            let record = records
                .get_mut(&intake_id)
                .ok_or(StoreError::NotFound(intake_id))?;

            let (reviewed_at, reviewed_by) = review_fields(reviewed, reviewed_by, now);
            record.reviewed = reviewed;
            record.reviewed_at = reviewed_at;
            record.reviewed_by = reviewed_by;
            Ok(record.clone())
        })
    }
}
