//! Turns bank notification text into a transaction candidate.
//!
//! Parsing never fails: a body without a keyword yields `Unknown`, a body
//! without a currency-prefixed number yields a zero amount. Both are filtered
//! out downstream.
use crate::model::{TransactionCandidate, TransactionKind};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

// INR 1,234 | Rs 1234 | Rs.1234 | ₹1,234; at most one blank after the prefix
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:INR|Rs\.?|₹)\s?([\d,]+)").expect("valid amount regex")
});

pub fn parse(body: &str, address: &str, occurred_at: DateTime<Utc>) -> TransactionCandidate {
    TransactionCandidate {
        amount: extract_amount(body),
        kind: classify(body),
        source_bank: address.to_string(),
        description: body.to_string(),
        occurred_at,
    }
}

/// `credited` is tested before `debited`; a body containing both is a credit.
pub fn classify(body: &str) -> TransactionKind {
    let lower = body.to_lowercase();
    if lower.contains("credited") {
        TransactionKind::Credit
    } else if lower.contains("debited") {
        TransactionKind::Debit
    } else {
        TransactionKind::Unknown
    }
}

/// First currency-prefixed run of digits and commas, commas removed. A run
/// with no digits left yields zero.
pub fn extract_amount(body: &str) -> Decimal {
    AMOUNT_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace(',', ""))
        .and_then(|digits| Decimal::from_str(&digits).ok())
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::from_epoch_millis;

    fn at() -> DateTime<Utc> {
        from_epoch_millis(1_700_000_000_000)
    }

    #[test]
    fn debit_with_rs_dot_prefix() {
        let c = parse("Rs.500 debited from A/c XXXX1234", "HDFCBK", at());
        assert_eq!(c.kind, TransactionKind::Debit);
        assert_eq!(c.amount, Decimal::from(500));
        assert_eq!(c.source_bank, "HDFCBK");
        assert_eq!(c.description, "Rs.500 debited from A/c XXXX1234");
        assert_eq!(c.occurred_at, at());
    }

    #[test]
    fn credit_with_inr_and_separator() {
        let c = parse("You have credited INR 2,500 to your wallet", "ICICIBANK", at());
        assert_eq!(c.kind, TransactionKind::Credit);
        assert_eq!(c.amount, Decimal::from(2500));
    }

    #[test]
    fn all_prefix_forms_extract_the_same_amount() {
        for body in [
            "Rs 1,234 debited",
            "INR 1234 debited",
            "₹1,234 debited",
            "₹ 1234 debited",
            "rs.1234 debited",
            "inr1,234 debited",
        ] {
            assert_eq!(extract_amount(body), Decimal::from(1234), "body: {body}");
        }
    }

    #[test]
    fn keyword_without_amount_is_zero() {
        let c = parse("Your account was CREDITED today", "SBIINB", at());
        assert_eq!(c.kind, TransactionKind::Credit);
        assert_eq!(c.amount, Decimal::ZERO);
        assert!(!c.is_valid());
    }

    #[test]
    fn no_keyword_no_amount_is_unknown() {
        let c = parse("Your OTP is 4821", "AXISBK", at());
        assert_eq!(c.kind, TransactionKind::Unknown);
        assert_eq!(c.amount, Decimal::ZERO);
        assert!(!c.is_valid());
    }

    #[test]
    fn credit_wins_over_debit() {
        assert_eq!(
            classify("Rs 10 debited from A and credited to B"),
            TransactionKind::Credit
        );
    }

    #[test]
    fn first_match_wins_and_fraction_is_dropped() {
        assert_eq!(
            extract_amount("INR 1,200.75 debited. Avl bal Rs 9,000"),
            Decimal::from(1200)
        );
    }

    #[test]
    fn prefix_without_digits_is_zero() {
        assert_eq!(extract_amount("Rs. , debited"), Decimal::ZERO);
        assert_eq!(extract_amount("debited 500"), Decimal::ZERO);
    }

    #[test]
    fn only_one_blank_may_follow_the_prefix() {
        assert_eq!(extract_amount("INR   500 debited"), Decimal::ZERO);
        assert_eq!(extract_amount("Rs\n\n500 debited"), Decimal::ZERO);
        assert_eq!(extract_amount("Rs\n500 debited"), Decimal::from(500));
        // a later prefix still counts when the first one has no amount
        assert_eq!(extract_amount("INR   500 debited, Rs 20 fee"), Decimal::from(20));
    }

    #[test]
    fn leading_separator_is_ignored() {
        assert_eq!(extract_amount("Rs ,500 debited"), Decimal::from(500));
        assert_eq!(extract_amount("INR,1,250 credited"), Decimal::from(1250));
    }

    #[test]
    fn body_is_kept_verbatim() {
        let body = "  Rs 5 debited  \n";
        assert_eq!(parse(body, " KOTAK ", at()).description, body);
        assert_eq!(parse(body, " KOTAK ", at()).source_bank, " KOTAK ");
    }
}
