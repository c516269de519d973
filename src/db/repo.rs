use super::model::TransactionRow;
use crate::model::{
    format_amount, format_timestamp, parse_timestamp, NewTransaction, Origin,
    PersistedTransaction,
};
use crate::store::{StoreError, TransactionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs and
/// other schemes pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn check_persistable(record: &NewTransaction) -> Result<(), StoreError> {
    if !record.kind.is_known() {
        return Err(StoreError::Invalid("kind must be Credit or Debit"));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_transaction(pool: &Pool, record: &NewTransaction) -> Result<i64, StoreError> {
    check_persistable(record)?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO transactions (kind, category, amount, occurred_at, notes, source_bank, origin) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(record.kind.as_str())
    .bind(&record.category)
    .bind(format_amount(&record.amount))
    .bind(format_timestamp(&record.occurred_at))
    .bind(&record.notes)
    .bind(&record.source_bank)
    .bind(record.origin.as_str())
    .fetch_one(pool)
    .await
    .map_err(map_write_error)?;
    debug!(id, origin = record.origin.as_str(), "inserted transaction");
    Ok(id)
}

#[instrument(skip_all)]
pub async fn update_transaction(
    pool: &Pool,
    id: i64,
    record: &NewTransaction,
) -> Result<bool, StoreError> {
    check_persistable(record)?;
    let res = sqlx::query(
        "UPDATE transactions SET kind = ?, category = ?, amount = ?, occurred_at = ?, \
         notes = ?, source_bank = ?, origin = ? WHERE id = ?",
    )
    .bind(record.kind.as_str())
    .bind(&record.category)
    .bind(format_amount(&record.amount))
    .bind(format_timestamp(&record.occurred_at))
    .bind(&record.notes)
    .bind(&record.source_bank)
    .bind(record.origin.as_str())
    .bind(id)
    .execute(pool)
    .await
    .map_err(map_write_error)?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_transaction(pool: &Pool, id: i64) -> Result<bool, StoreError> {
    let res = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn fetch_transaction(
    pool: &Pool,
    id: i64,
) -> Result<Option<PersistedTransaction>, StoreError> {
    let row = sqlx::query(
        "SELECT id, kind, category, amount, occurred_at, notes, source_bank, origin \
         FROM transactions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(Some(TransactionRow::from_row(&row)?.into_persisted()?)),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn list_transactions(pool: &Pool) -> Result<Vec<PersistedTransaction>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, kind, category, amount, occurred_at, notes, source_bank, origin \
         FROM transactions ORDER BY occurred_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| TransactionRow::from_row(row)?.into_persisted())
        .collect()
}

#[instrument(skip_all)]
pub async fn transaction_exists(
    pool: &Pool,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
    source_bank: &str,
) -> Result<bool, StoreError> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM transactions WHERE amount = ? AND occurred_at = ? AND source_bank = ? LIMIT 1",
    )
    .bind(format_amount(&amount))
    .bind(format_timestamp(&occurred_at))
    .bind(source_bank)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn latest_occurred_at(
    pool: &Pool,
    origin: Origin,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let latest: Option<String> =
        sqlx::query_scalar("SELECT MAX(occurred_at) FROM transactions WHERE origin = ?")
            .bind(origin.as_str())
            .fetch_one(pool)
            .await?;
    match latest {
        None => Ok(None),
        Some(text) => parse_timestamp(&text)
            .map(Some)
            .ok_or_else(|| StoreError::Corrupt {
                id: 0,
                reason: format!("max occurred_at {:?} is not a timestamp", text),
            }),
    }
}

pub async fn count_transactions(pool: &Pool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// `TransactionStore` backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) and migrate the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert(&self, record: &NewTransaction) -> Result<i64, StoreError> {
        insert_transaction(&self.pool, record).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        delete_transaction(&self.pool, id).await
    }

    async fn update(&self, id: i64, record: &NewTransaction) -> Result<bool, StoreError> {
        update_transaction(&self.pool, id, record).await
    }

    async fn list_all(&self) -> Result<Vec<PersistedTransaction>, StoreError> {
        list_transactions(&self.pool).await
    }

    async fn exists_matching(
        &self,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
        source_bank: &str,
    ) -> Result<bool, StoreError> {
        transaction_exists(&self.pool, amount, occurred_at, source_bank).await
    }

    async fn max_timestamp(&self, origin: Origin) -> Result<Option<DateTime<Utc>>, StoreError> {
        latest_occurred_at(&self.pool, origin).await
    }
}
