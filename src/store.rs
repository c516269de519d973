//! Record store seam consumed by the ingestion core.
use crate::model::{NewTransaction, Origin, PersistedTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("uniqueness constraint violated: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("record {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
    #[error("invalid record: {0}")]
    Invalid(&'static str),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a record and return its newly assigned id.
    async fn insert(&self, record: &NewTransaction) -> Result<i64, StoreError>;

    /// Returns `false` when no record has this id.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Returns `false` when no record has this id.
    async fn update(&self, id: i64, record: &NewTransaction) -> Result<bool, StoreError>;

    /// All records, newest `occurred_at` first.
    async fn list_all(&self) -> Result<Vec<PersistedTransaction>, StoreError>;

    async fn exists_matching(
        &self,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
        source_bank: &str,
    ) -> Result<bool, StoreError>;

    /// Latest `occurred_at` among records of `origin`, if any.
    async fn max_timestamp(&self, origin: Origin) -> Result<Option<DateTime<Utc>>, StoreError>;
}
