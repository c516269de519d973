//! Row models used by repositories.
//!
//! Columns are read as stored text and decoded into domain types in one place
//! so a malformed row surfaces as `StoreError::Corrupt` instead of a panic.

use crate::model::{parse_timestamp, Origin, PersistedTransaction, TransactionKind};
use crate::store::StoreError;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// `transactions` row exactly as stored.
#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub id: i64,
    pub kind: String,
    pub category: String,
    pub amount: String,
    pub occurred_at: String,
    pub notes: String,
    pub source_bank: String,
    pub origin: String,
}

impl TransactionRow {
    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            category: row.try_get("category")?,
            amount: row.try_get("amount")?,
            occurred_at: row.try_get("occurred_at")?,
            notes: row.try_get("notes")?,
            source_bank: row.try_get("source_bank")?,
            origin: row.try_get("origin")?,
        })
    }

    pub fn into_persisted(self) -> Result<PersistedTransaction, StoreError> {
        let id = self.id;
        let corrupt = |reason: String| StoreError::Corrupt { id, reason };

        let kind = TransactionKind::parse_kind(&self.kind)
            .filter(TransactionKind::is_known)
            .ok_or_else(|| corrupt(format!("unknown kind {:?}", self.kind)))?;
        let origin = Origin::parse_origin(&self.origin)
            .ok_or_else(|| corrupt(format!("unknown origin {:?}", self.origin)))?;
        let amount = Decimal::from_str(&self.amount)
            .map_err(|e| corrupt(format!("amount {:?}: {}", self.amount, e)))?;
        let occurred_at = parse_timestamp(&self.occurred_at)
            .ok_or_else(|| corrupt(format!("occurred_at {:?}", self.occurred_at)))?;

        Ok(PersistedTransaction {
            id,
            kind,
            category: self.category,
            amount,
            occurred_at,
            notes: self.notes,
            source_bank: self.source_bank,
            origin,
        })
    }
}
