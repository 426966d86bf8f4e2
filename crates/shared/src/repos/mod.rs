use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::intake::NewIntake;
use crate::models::IntakeRecord;

mod intakes;
mod memory;

pub use memory::MemoryIntakeStore;

const POOL_ACQUIRE_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("intake {0} not found")]
    NotFound(Uuid),
    #[error("store operation timed out")]
    Timeout,
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable collection of finalized intakes and their review state.
pub trait IntakeRepository: Send + Sync {
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Persists a finalized intake as `Complete`, unreviewed.
    fn insert_intake<'a>(
        &'a self,
        intake: &'a NewIntake,
        created_at: DateTime<Utc>,
    ) -> StoreFuture<'a, IntakeRecord>;

    /// All intakes, newest first.
    fn list_intakes(&self) -> StoreFuture<'_, Vec<IntakeRecord>>;

    /// Sets the review flag. Clearing it also clears `reviewed_at` and
    /// `reviewed_by`.
    fn set_intake_reviewed<'a>(
        &'a self,
        intake_id: Uuid,
        reviewed: bool,
        reviewed_by: &'a str,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, IntakeRecord>;
}

/// Review metadata written together with the flag.
pub(crate) fn review_fields(
    reviewed: bool,
    reviewed_by: &str,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, String) {
    if reviewed {
        (Some(now), reviewed_by.trim().to_string())
    } else {
        (None, String::new())
    }
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECONDS))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
