//! Adaptive forecasting for a twice-daily two-digit draw.
//!
//! The crate is organized leaves first:
//! - [`RecordStore`] keeps the dated draw history, deduplicated by date and
//!   sorted most recent first, and parses pasted reports via [`parse_import`].
//! - [`ExpertRegistry`] holds the independent scoring heuristics.
//! - [`ForecastEngine`] combines the experts into one ranking over the 100
//!   candidates and adapts the [`WeightVector`] after each observed outcome.
//!
//! Persistence is injected through [`ForecastStorage`]; [`InMemoryStorage`]
//! is the reference implementation.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, UtcOffset, Weekday};
use ulid::Ulid;

mod adapt;
mod backtest;
mod engine;
mod experts;
mod fusion;
mod import;
mod market;
mod record;
mod ruleset;
mod scenario;
mod storage;
mod weights;

pub use adapt::{record_outcome, RecordedOutcome, Session, WeightUpdate};
pub use backtest::{BacktestConfig, BacktestReport, MonthlyStats, BACKTEST_CONTRACT_VERSION};
pub use engine::{
    ForecastEngine, PredictionMeta, PredictionRequest, PredictionResult, ScoredNumber,
    SIM_VERIFIED_TAG,
};
pub use experts::{
    BreakTotalExpert, DayOfWeekExpert, DigitFrequencyExpert, Expert, ExpertRegistry, ExpertScore,
    GapExpert, MarketExpert, RecencyExpert, RelationshipExpert, ScoringContext, SeasonalExpert,
    TrendExpert,
};
pub use fusion::{
    format_history_prompt, fuse_rankings, ExternalPrediction, ExternalPredictor, FusedPick,
    FusedPicks, PickSource, UnavailablePredictor,
};
pub use import::{parse_import, ImportIssue, ImportIssueCode, ImportReport, ParsedImport};
pub use market::{market_tails, MarketQuote, MarketReading, MarketTails};
pub use record::{DrawEntry, DrawRecord, RecordStore};
pub use ruleset::ForecastRuleset;
pub use storage::{ForecastStorage, InMemoryStorage};
pub use weights::{ExpertKind, WeightVector};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ForecastError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Stable identifier of a stored draw record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecordId(pub Ulid);

impl RecordId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parses a ULID string into a record identifier.
    ///
    /// # Errors
    /// Returns [`ForecastError::Validation`] when `raw` is not a valid ULID.
    pub fn parse(raw: &str) -> Result<Self, ForecastError> {
        Ulid::from_string(raw.trim())
            .map(Self)
            .map_err(|err| ForecastError::Validation(format!("invalid record id {raw:?}: {err}")))
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the 100 possible draw values, `00` through `99`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TwoDigit(u8);

impl TwoDigit {
    /// Builds a value from its numeric form.
    ///
    /// # Errors
    /// Returns [`ForecastError::Validation`] when `value` is above 99.
    pub fn new(value: u8) -> Result<Self, ForecastError> {
        if value > 99 {
            return Err(ForecastError::Validation(format!(
                "two-digit value MUST be in 0..=99, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Parses exactly two ASCII digits, surrounding whitespace ignored.
    ///
    /// # Errors
    /// Returns [`ForecastError::Validation`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, ForecastError> {
        let trimmed = raw.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(ForecastError::Validation(format!(
                "expected a two-digit value like \"07\", got {raw:?}"
            )));
        }
        Ok(Self((bytes[0] - b'0') * 10 + (bytes[1] - b'0')))
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..100_u8).map(Self)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn head(self) -> u8 {
        self.0 / 10
    }

    #[must_use]
    pub fn tail(self) -> u8 {
        self.0 % 10
    }

    #[must_use]
    pub fn digit_sum(self) -> u8 {
        self.head() + self.tail()
    }

    /// `(d1 + d2) mod 10`, the "break" of the value.
    #[must_use]
    pub fn break_value(self) -> u8 {
        self.digit_sum() % 10
    }

    #[must_use]
    pub fn is_double(self) -> bool {
        self.head() == self.tail()
    }

    /// Digits differ by exactly one, with `9`/`0` treated as adjacent.
    #[must_use]
    pub fn is_neighbor_pair(self) -> bool {
        let (head, tail) = (self.head(), self.tail());
        head.abs_diff(tail) == 1 || (head == 9 && tail == 0) || (head == 0 && tail == 9)
    }
}

impl Display for TwoDigit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl Serialize for TwoDigit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TwoDigit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

const WEEKDAY_LABELS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Weekday label for a draw date. Record creation and the day-of-week expert
/// both go through this function.
#[must_use]
pub fn day_name(date: Date) -> &'static str {
    let index = match date.weekday() {
        Weekday::Sunday => 0,
        Weekday::Monday => 1,
        Weekday::Tuesday => 2,
        Weekday::Wednesday => 3,
        Weekday::Thursday => 4,
        Weekday::Friday => 5,
        Weekday::Saturday => 6,
    };
    WEEKDAY_LABELS[index]
}

/// Parses a `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`ForecastError::Validation`] when the text is not in that shape
/// or names a date that does not exist.
pub fn parse_iso_date(raw: &str) -> Result<Date, ForecastError> {
    let invalid = || ForecastError::Validation(format!("invalid date {raw:?}, expected YYYY-MM-DD"));
    let mut parts = raw.trim().split('-');
    let (Some(year), Some(month), Some(day), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u8 = month.parse().map_err(|_| invalid())?;
    let day: u8 = day.parse().map_err(|_| invalid())?;
    calendar_date(year, month, day).ok_or_else(invalid)
}

pub(crate) fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

#[must_use]
pub fn format_iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// # Errors
/// Returns [`ForecastError::Validation`] when `value` cannot be expressed in
/// RFC 3339.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, ForecastError> {
    value
        .format(&Rfc3339)
        .map_err(|err| ForecastError::Validation(format!("failed to format timestamp: {err}")))
}

/// # Errors
/// Returns [`ForecastError::Validation`] when `raw` is not an RFC 3339
/// timestamp.
pub fn parse_rfc3339_utc(raw: &str) -> Result<OffsetDateTime, ForecastError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map(|value| value.to_offset(UtcOffset::UTC))
        .map_err(|err| ForecastError::Validation(format!("invalid RFC 3339 timestamp {raw:?}: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[must_use]
pub fn today_utc() -> Date {
    now_utc().date()
}

pub(crate) mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&super::format_iso_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso_date(&raw).map_err(serde::de::Error::custom)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{date, must_ok};
    use super::*;

    #[test]
    fn two_digit_parse_accepts_padded_values_only() {
        assert_eq!(must_ok(TwoDigit::parse("07")).value(), 7);
        assert_eq!(must_ok(TwoDigit::parse(" 99 ")).value(), 99);
        assert!(TwoDigit::parse("7").is_err());
        assert!(TwoDigit::parse("100").is_err());
        assert!(TwoDigit::parse("4a").is_err());
        assert!(TwoDigit::new(100).is_err());
    }

    #[test]
    fn two_digit_serializes_as_padded_string() {
        let value = must_ok(TwoDigit::parse("05"));
        assert_eq!(must_ok(serde_json::to_string(&value)), "\"05\"");
        let back: TwoDigit = must_ok(serde_json::from_str("\"05\""));
        assert_eq!(back, value);
        assert!(serde_json::from_str::<TwoDigit>("\"5\"").is_err());
    }

    #[test]
    fn neighbor_pairs_wrap_between_nine_and_zero() {
        for raw in ["12", "21", "90", "09", "45"] {
            assert!(must_ok(TwoDigit::parse(raw)).is_neighbor_pair(), "{raw}");
        }
        for raw in ["13", "00", "55", "80"] {
            assert!(!must_ok(TwoDigit::parse(raw)).is_neighbor_pair(), "{raw}");
        }
    }

    #[test]
    fn break_value_is_digit_sum_mod_ten() {
        assert_eq!(must_ok(TwoDigit::parse("78")).break_value(), 5);
        assert_eq!(must_ok(TwoDigit::parse("05")).break_value(), 5);
        assert_eq!(must_ok(TwoDigit::parse("00")).break_value(), 0);
    }

    #[test]
    fn day_name_maps_known_dates() {
        assert_eq!(day_name(date("2026-01-23")), "Friday");
        assert_eq!(day_name(date("2026-01-25")), "Sunday");
    }

    #[test]
    fn rfc3339_round_trips_in_utc() {
        let parsed = must_ok(parse_rfc3339_utc("2026-01-23T16:30:00+06:30"));
        assert_eq!(must_ok(format_rfc3339(parsed)), "2026-01-23T10:00:00Z");
        assert!(parse_rfc3339_utc("yesterday").is_err());
    }

    #[test]
    fn iso_dates_round_trip_and_reject_impossible_days() {
        let parsed = date("2024-02-29");
        assert_eq!(format_iso_date(parsed), "2024-02-29");
        assert!(parse_iso_date("2026-02-29").is_err());
        assert!(parse_iso_date("2026-1-5").is_err());
        assert!(parse_iso_date("23/01/2026").is_err());
    }
}
