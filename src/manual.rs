//! Manually entered expenses.
use crate::model::{NewTransaction, Origin, PersistedTransaction, TransactionKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

pub const MAX_NOTES_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManualError {
    #[error("please select a category")]
    MissingCategory,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("notes may hold at most 100 characters")]
    NotesTooLong,
}

/// An expense typed in by the user. Always a debit with no source bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualExpense {
    pub category: String,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub notes: String,
}

impl ManualExpense {
    pub fn validate(&self) -> Result<(), ManualError> {
        if self.category.trim().is_empty() {
            return Err(ManualError::MissingCategory);
        }
        if self.amount <= Decimal::ZERO {
            return Err(ManualError::NonPositiveAmount);
        }
        if self.notes.chars().count() > MAX_NOTES_CHARS {
            return Err(ManualError::NotesTooLong);
        }
        Ok(())
    }

    pub fn into_record(self) -> Result<NewTransaction, ManualError> {
        self.validate()?;
        Ok(NewTransaction {
            kind: TransactionKind::Debit,
            category: self.category.trim().to_string(),
            amount: self.amount,
            occurred_at: self.occurred_at,
            notes: self.notes,
            source_bank: String::new(),
            origin: Origin::Manual,
        })
    }
}

/// Field changes to a stored record; `None` keeps the current value.
///
/// Changed fields follow the same rules as a new manual expense. Notes kept
/// from an SMS body are not length-checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordEdit {
    pub category: Option<String>,
    pub amount: Option<Decimal>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl RecordEdit {
    pub fn apply(self, existing: &PersistedTransaction) -> Result<NewTransaction, ManualError> {
        let category = match self.category {
            Some(category) => category.trim().to_string(),
            None => existing.category.clone(),
        };
        if category.trim().is_empty() {
            return Err(ManualError::MissingCategory);
        }
        let amount = self.amount.unwrap_or(existing.amount);
        if amount <= Decimal::ZERO {
            return Err(ManualError::NonPositiveAmount);
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_CHARS {
                return Err(ManualError::NotesTooLong);
            }
        }
        Ok(NewTransaction {
            kind: existing.kind,
            category,
            amount,
            occurred_at: self.occurred_at.unwrap_or(existing.occurred_at),
            notes: self.notes.unwrap_or_else(|| existing.notes.clone()),
            source_bank: existing.source_bank.clone(),
            origin: existing.origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense() -> ManualExpense {
        ManualExpense {
            category: " Food ".into(),
            amount: Decimal::new(1250, 2),
            occurred_at: Utc::now(),
            notes: "lunch".into(),
        }
    }

    #[test]
    fn valid_expense_becomes_manual_debit() {
        let rec = expense().into_record().unwrap();
        assert_eq!(rec.kind, TransactionKind::Debit);
        assert_eq!(rec.origin, Origin::Manual);
        assert_eq!(rec.category, "Food");
        assert_eq!(rec.source_bank, "");
    }

    #[test]
    fn rejects_bad_input() {
        let mut e = expense();
        e.category = "  ".into();
        assert_eq!(e.validate(), Err(ManualError::MissingCategory));

        let mut e = expense();
        e.amount = Decimal::ZERO;
        assert_eq!(e.validate(), Err(ManualError::NonPositiveAmount));
        e.amount = Decimal::from(-5);
        assert_eq!(e.validate(), Err(ManualError::NonPositiveAmount));

        let mut e = expense();
        e.notes = "x".repeat(MAX_NOTES_CHARS);
        assert!(e.validate().is_ok());
        e.notes.push('x');
        assert_eq!(e.validate(), Err(ManualError::NotesTooLong));
    }

    fn stored_sms() -> PersistedTransaction {
        PersistedTransaction {
            id: 7,
            kind: TransactionKind::Credit,
            category: "CASH".into(),
            amount: Decimal::from(2500),
            occurred_at: Utc::now(),
            notes: "y".repeat(MAX_NOTES_CHARS + 40),
            source_bank: "ICICIBANK".into(),
            origin: Origin::Sms,
        }
    }

    #[test]
    fn edit_keeps_unchanged_fields() {
        let existing = stored_sms();
        let rec = RecordEdit {
            category: Some(" Salary ".into()),
            ..RecordEdit::default()
        }
        .apply(&existing)
        .unwrap();
        assert_eq!(rec.category, "Salary");
        assert_eq!(rec.kind, TransactionKind::Credit);
        assert_eq!(rec.origin, Origin::Sms);
        assert_eq!(rec.amount, existing.amount);
        assert_eq!(rec.notes, existing.notes);
        assert_eq!(rec.source_bank, "ICICIBANK");
    }

    #[test]
    fn edit_enforces_manual_entry_rules() {
        let existing = stored_sms();
        let blank = RecordEdit {
            category: Some("   ".into()),
            ..RecordEdit::default()
        };
        assert_eq!(blank.apply(&existing), Err(ManualError::MissingCategory));

        let negative = RecordEdit {
            amount: Some(Decimal::from(-1)),
            ..RecordEdit::default()
        };
        assert_eq!(negative.apply(&existing), Err(ManualError::NonPositiveAmount));

        let long_notes = RecordEdit {
            notes: Some("z".repeat(MAX_NOTES_CHARS + 1)),
            ..RecordEdit::default()
        };
        assert_eq!(long_notes.apply(&existing), Err(ManualError::NotesTooLong));
    }
}
