//! Order codes: `PREFIX-YYYYMMDD-NNNN`.
//!
//! The sequence restarts every calendar day. It is never stored; each
//! placement derives it from the greatest code already issued for the day,
//! while holding a transaction-scoped token keyed by the date.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use common::OrderId;
use order_store::{NewOrder, StoreTransaction};
use thiserror::Error;

use crate::error::OrderError;
use crate::retry::Attempt;

const MAX_PREFIX_LEN: usize = 10;
const MIN_SEQUENCE_DIGITS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order code {code:?}: {reason}")]
pub struct InvalidOrderCode {
    pub code: String,
    pub reason: &'static str,
}

impl From<InvalidOrderCode> for OrderError {
    fn from(e: InvalidOrderCode) -> Self {
        OrderError::Validation(e.to_string())
    }
}

/// Checks that a prefix is 1 to 10 uppercase ASCII letters or digits.
pub fn validate_prefix(prefix: &str) -> Result<(), OrderError> {
    let valid = !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(OrderError::Validation(format!(
            "order code prefix {prefix:?} must be 1-{MAX_PREFIX_LEN} uppercase letters or digits"
        )))
    }
}

/// A parsed order code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderCode {
    prefix: String,
    date: NaiveDate,
    sequence: u32,
}

impl OrderCode {
    pub fn new(prefix: impl Into<String>, date: NaiveDate, sequence: u32) -> Result<Self, OrderError> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        if sequence == 0 {
            return Err(OrderError::Validation(
                "order code sequence starts at 1".to_string(),
            ));
        }
        Ok(Self {
            prefix,
            date,
            sequence,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// `PREFIX-YYYYMMDD-`, the part shared by all codes of one day.
    pub fn day_prefix(prefix: &str, date: NaiveDate) -> String {
        format!("{prefix}-{}-", date.format("%Y%m%d"))
    }

    /// The date as the number `YYYYMMDD`, used to key the daily token.
    pub fn date_key(date: NaiveDate) -> i32 {
        date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
    }
}

impl std::fmt::Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            Self::day_prefix(&self.prefix, self.date),
            self.sequence,
            width = MIN_SEQUENCE_DIGITS
        )
    }
}

impl FromStr for OrderCode {
    type Err = InvalidOrderCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidOrderCode {
            code: s.to_string(),
            reason,
        };

        let mut parts = s.split('-');
        let (Some(prefix), Some(date), Some(sequence), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected three dash-separated segments"));
        };

        validate_prefix(prefix).map_err(|_| invalid("bad prefix"))?;

        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("date must be YYYYMMDD"));
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid("no such date"))?;

        if sequence.len() < MIN_SEQUENCE_DIGITS || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("sequence must be at least four digits"));
        }
        let sequence: u32 = sequence.parse().map_err(|_| invalid("sequence out of range"))?;
        if sequence == 0 {
            return Err(invalid("sequence starts at 1"));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            date,
            sequence,
        })
    }
}

/// Picks the next free code for `date` inside `tx`.
///
/// Takes the day's token first, so concurrent callers for the same day see
/// each other's committed codes. `floor` is the last sequence this caller
/// already tried.
pub async fn next_code<T: StoreTransaction>(
    tx: &mut T,
    prefix: &str,
    date: NaiveDate,
    floor: u32,
) -> Result<OrderCode, OrderError> {
    tx.acquire_sequence_lock(OrderCode::date_key(date)).await?;

    let day_prefix = OrderCode::day_prefix(prefix, date);
    let max = tx.max_code_sequence(&day_prefix).await?.unwrap_or(0);
    let sequence = max
        .max(floor)
        .checked_add(1)
        .ok_or_else(|| OrderError::Fatal(format!("order code sequence exhausted for {day_prefix}")))?;

    OrderCode::new(prefix, date, sequence)
}

/// Generates a code and inserts the order header under it.
///
/// A collision turns into a retryable conflict; the next attempt starts
/// above the sequence that collided.
pub(crate) struct CodeInsertion<'t, T> {
    tx: &'t mut T,
    header: &'t NewOrder,
    prefix: &'t str,
    date: NaiveDate,
    floor: u32,
}

impl<'t, T: StoreTransaction> CodeInsertion<'t, T> {
    pub(crate) fn new(tx: &'t mut T, header: &'t NewOrder, prefix: &'t str, date: NaiveDate) -> Self {
        Self {
            tx,
            header,
            prefix,
            date,
            floor: 0,
        }
    }
}

#[async_trait]
impl<'t, T: StoreTransaction> Attempt for CodeInsertion<'t, T> {
    type Output = (OrderId, OrderCode);

    async fn attempt(&mut self, _number: u32) -> Result<Self::Output, OrderError> {
        let code = next_code(&mut *self.tx, self.prefix, self.date, self.floor).await?;
        self.floor = code.sequence();

        let mut header = self.header.clone();
        header.code = code.to_string();

        match self.tx.insert_order(&header).await {
            Ok(order_id) => Ok((order_id, code)),
            Err(e) => {
                if e.is_conflict() {
                    metrics::counter!("order_code_conflicts_total").increment(1);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use order_store::{InMemoryOrderStore, OrderStore};

    use super::*;

    fn jan_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn formats_with_zero_padding() {
        let code = OrderCode::new("MOA", jan_first(), 1).unwrap();
        assert_eq!(code.to_string(), "MOA-20250101-0001");
    }

    #[test]
    fn sequence_widens_past_four_digits() {
        let code = OrderCode::new("MOA", jan_first(), 10_000).unwrap();
        assert_eq!(code.to_string(), "MOA-20250101-10000");
    }

    #[test]
    fn parses_back_into_parts() {
        let code: OrderCode = "SHOP2-20241231-0042".parse().unwrap();
        assert_eq!(code.prefix(), "SHOP2");
        assert_eq!(code.date(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(code.sequence(), 42);
        assert_eq!(code.to_string(), "SHOP2-20241231-0042");
    }

    #[test]
    fn rejects_malformed_codes() {
        for bad in [
            "",
            "MOA-20250101",
            "moa-20250101-0001",
            "MOA-2025011-0001",
            "MOA-20250230-0001",
            "MOA-20250101-001",
            "MOA-20250101-0000",
            "MOA-20250101-00a1",
            "MOA-20250101-0001-X",
        ] {
            assert!(bad.parse::<OrderCode>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn prefix_rules() {
        assert!(validate_prefix("MOA").is_ok());
        assert!(validate_prefix("A1B2C3D4E5").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("TOOLONGPREF").is_err());
        assert!(validate_prefix("MO-A").is_err());
        assert!(validate_prefix("Moa").is_err());
    }

    #[test]
    fn date_key_is_numeric_date() {
        assert_eq!(OrderCode::date_key(jan_first()), 20250101);
    }

    #[tokio::test]
    async fn next_code_starts_at_one_and_respects_floor() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();

        let first = next_code(&mut tx, "MOA", jan_first(), 0).await.unwrap();
        assert_eq!(first.to_string(), "MOA-20250101-0001");

        let after_collision = next_code(&mut tx, "MOA", jan_first(), 7).await.unwrap();
        assert_eq!(after_collision.sequence(), 8);
    }
}
