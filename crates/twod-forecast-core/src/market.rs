use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::TwoDigit;

/// Market index/value pair as published, e.g. `1,314.39` / `50,901.86`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MarketReading {
    pub index: String,
    pub value: String,
}

impl MarketReading {
    #[must_use]
    pub fn new(index: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            value: value.into(),
        }
    }
}

/// A reading from the live feed together with when it was observed.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MarketQuote {
    pub reading: MarketReading,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl MarketQuote {
    #[must_use]
    pub fn is_fresh(&self, now: OffsetDateTime, max_age: Duration) -> bool {
        let age = now - self.observed_at;
        age >= Duration::ZERO && age <= max_age
    }
}

/// The two-digit values read off the fractional part of a reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct MarketTails {
    pub difference: TwoDigit,
    pub sum: TwoDigit,
}

/// Cents of `|index - value|` and of `index + value`. `None` when either
/// side does not parse as a decimal.
#[must_use]
pub fn market_tails(reading: &MarketReading) -> Option<MarketTails> {
    let index = parse_cents(&reading.index)?;
    let value = parse_cents(&reading.value)?;

    let difference = (index - value).unsigned_abs() % 100;
    let sum = (index + value).unsigned_abs() % 100;

    Some(MarketTails {
        difference: TwoDigit::new(u8::try_from(difference).ok()?).ok()?,
        sum: TwoDigit::new(u8::try_from(sum).ok()?).ok()?,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn parse_cents(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|ch| *ch != ',').collect();
    let parsed: f64 = cleaned.trim().parse().ok()?;
    if !parsed.is_finite() || parsed.abs() > 1e15 {
        return None;
    }
    Some((parsed * 100.0).round() as i64)
}
