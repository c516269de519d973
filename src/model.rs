use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of money movement as read from a notification body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Credit,
    Debit,
    Unknown,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "Credit",
            TransactionKind::Debit => "Debit",
            TransactionKind::Unknown => "Unknown",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "Credit" => Some(TransactionKind::Credit),
            "Debit" => Some(TransactionKind::Debit),
            "Unknown" => Some(TransactionKind::Unknown),
            _ => None,
        }
    }

    /// Only credits and debits may be stored.
    pub fn is_known(&self) -> bool {
        !matches!(self, TransactionKind::Unknown)
    }
}

/// Where a stored record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Sms,
    Manual,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Sms => "sms",
            Origin::Manual => "manual",
        }
    }

    pub fn parse_origin(s: &str) -> Option<Self> {
        match s {
            "sms" => Some(Origin::Sms),
            "manual" => Some(Origin::Manual),
            _ => None,
        }
    }
}

/// One inbox entry as delivered by a message source.
///
/// `timestamp` is epoch milliseconds. The field aliases accept the Android
/// inbox export shape (`date`, `originatingAddress`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawMessage {
    pub body: String,
    #[serde(alias = "originatingAddress")]
    pub address: String,
    #[serde(alias = "date")]
    pub timestamp: i64,
}

impl RawMessage {
    pub fn new(body: impl Into<String>, address: impl Into<String>, timestamp: i64) -> Self {
        Self {
            body: body.into(),
            address: address.into(),
            timestamp,
        }
    }

    /// Message timestamp as UTC, or `None` when it lies outside the
    /// representable range.
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Parsed but not yet persisted transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionCandidate {
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub source_bank: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl TransactionCandidate {
    /// Unknown kinds and zero amounts never reach the store.
    pub fn is_valid(&self) -> bool {
        self.kind.is_known() && !self.amount.is_zero()
    }
}

/// Insert/update payload for the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub notes: String,
    pub source_bank: String,
    pub origin: Origin,
}

impl NewTransaction {
    pub fn from_candidate(candidate: &TransactionCandidate, category: &str) -> Self {
        Self {
            kind: candidate.kind,
            category: category.to_string(),
            amount: candidate.amount,
            occurred_at: candidate.occurred_at,
            notes: candidate.description.clone(),
            source_bank: candidate.source_bank.clone(),
            origin: Origin::Sms,
        }
    }
}

/// Stored record with its store-assigned identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedTransaction {
    pub id: i64,
    pub kind: TransactionKind,
    pub category: String,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub notes: String,
    pub source_bank: String,
    pub origin: Origin,
}

/// Canonical persisted text for a timestamp: ISO-8601, UTC, milliseconds.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn from_epoch_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}

/// Canonical persisted text for an amount; `500`, `500.0` and `500.00` agree.
pub fn format_amount(amount: &Decimal) -> String {
    amount.normalize().to_string()
}
