//! Dashboard figures derived from stored records.
use crate::model::{PersistedTransaction, TransactionKind};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

const UNCATEGORIZED: &str = "Other";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("{0} exceeds the representable amount range")]
    Overflow(&'static str),
}

fn add(total: Decimal, amount: Decimal, what: &'static str) -> Result<Decimal, SummaryError> {
    total.checked_add(amount).ok_or(SummaryError::Overflow(what))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub amount: Decimal,
    /// Share of all debits, in percent, rounded to one decimal place.
    pub percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Credits minus debits over every record.
    pub balance: Decimal,
    /// Debits dated in the same calendar month (UTC) as `now`.
    pub monthly_expenses: Decimal,
    /// Debits grouped by category, largest first.
    pub by_category: Vec<CategoryShare>,
}

impl Summary {
    pub fn compute(records: &[PersistedTransaction], now: DateTime<Utc>) -> Result<Self, SummaryError> {
        let mut balance = Decimal::ZERO;
        let mut monthly_expenses = Decimal::ZERO;
        let mut debit_total = Decimal::ZERO;
        let mut categories: BTreeMap<String, Decimal> = BTreeMap::new();

        for record in records {
            match record.kind {
                TransactionKind::Credit => balance = add(balance, record.amount, "balance")?,
                TransactionKind::Debit => {
                    balance = balance
                        .checked_sub(record.amount)
                        .ok_or(SummaryError::Overflow("balance"))?;
                    debit_total = add(debit_total, record.amount, "total expenses")?;
                    if record.occurred_at.year() == now.year()
                        && record.occurred_at.month() == now.month()
                    {
                        monthly_expenses = add(monthly_expenses, record.amount, "monthly expenses")?;
                    }
                    let category = match record.category.trim() {
                        "" => UNCATEGORIZED,
                        c => c,
                    };
                    let entry = categories.entry(category.to_string()).or_default();
                    *entry = add(*entry, record.amount, "category total")?;
                }
                TransactionKind::Unknown => {}
            }
        }

        let mut by_category: Vec<CategoryShare> = categories
            .into_iter()
            .map(|(category, amount)| CategoryShare {
                percent: percent_of(amount, debit_total),
                category,
                amount,
            })
            .collect();
        by_category.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.category.cmp(&b.category)));

        Ok(Self {
            balance,
            monthly_expenses,
            by_category,
        })
    }
}

/// `part` never exceeds `total`, so the ratio is at most one.
fn percent_of(part: Decimal, total: Decimal) -> Decimal {
    part.checked_div(total)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|p| p.round_dp(1))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_timestamp, Origin};

    fn rec(kind: TransactionKind, amount: i64, category: &str, at: &str) -> PersistedTransaction {
        PersistedTransaction {
            id: 0,
            kind,
            category: category.into(),
            amount: Decimal::from(amount),
            occurred_at: parse_timestamp(at).unwrap(),
            notes: String::new(),
            source_bank: String::new(),
            origin: Origin::Manual,
        }
    }

    #[test]
    fn balance_month_and_categories() {
        let now = parse_timestamp("2024-05-20T12:00:00.000Z").unwrap();
        let records = vec![
            rec(TransactionKind::Credit, 10_000, "CASH", "2024-05-01T00:00:00.000Z"),
            rec(TransactionKind::Debit, 300, "Food", "2024-05-02T00:00:00.000Z"),
            rec(TransactionKind::Debit, 100, "", "2024-05-03T00:00:00.000Z"),
            rec(TransactionKind::Debit, 600, "CASH", "2024-04-30T23:59:59.999Z"),
            // same month, previous year
            rec(TransactionKind::Debit, 1_000, "Food", "2023-05-10T00:00:00.000Z"),
        ];
        let s = Summary::compute(&records, now).unwrap();
        assert_eq!(s.balance, Decimal::from(8_000));
        assert_eq!(s.monthly_expenses, Decimal::from(400));

        let names: Vec<_> = s.by_category.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Food", "CASH", "Other"]);
        assert_eq!(s.by_category[0].amount, Decimal::from(1_300));
        assert_eq!(s.by_category[0].percent, Decimal::new(650, 1));
        assert_eq!(s.by_category[2].percent, Decimal::new(50, 1));
    }

    #[test]
    fn empty_ledger() {
        let s = Summary::compute(&[], Utc::now()).unwrap();
        assert_eq!(s.balance, Decimal::ZERO);
        assert!(s.by_category.is_empty());
    }

    #[test]
    fn largest_amount_does_not_overflow_percentages() {
        let mut big = rec(TransactionKind::Debit, 0, "Rent", "2024-05-02T00:00:00.000Z");
        big.amount = Decimal::MAX;
        let now = parse_timestamp("2024-05-20T12:00:00.000Z").unwrap();

        let s = Summary::compute(&[big.clone()], now).unwrap();
        assert_eq!(s.balance, -Decimal::MAX);
        assert_eq!(s.monthly_expenses, Decimal::MAX);
        assert_eq!(s.by_category[0].percent, Decimal::ONE_HUNDRED);

        let err = Summary::compute(&[big.clone(), big], now).unwrap_err();
        assert!(matches!(err, SummaryError::Overflow(_)));
    }
}
