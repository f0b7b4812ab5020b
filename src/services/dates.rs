//! Calendar-day helpers. Every date that reaches storage or a comparison is a
//! `NaiveDate`, so time-of-day never leaks into the (habit, day) and
//! (user, day) keys.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{AppError, AppResult};

/// Width of the statistics window when no explicit start is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Widest range a query may ask for, both ends included.
pub const MAX_RANGE_DAYS: i64 = 366;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Truncate a client supplied date or timestamp to its calendar day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (converted to UTC first) and
/// naive `YYYY-MM-DDTHH:MM:SS[.fff]` timestamps.
pub fn parse_day(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();

    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc).date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ts.date());
    }

    Err(AppError::Validation(format!("Invalid date: {raw}")))
}

/// Serde adapter for optional day fields in bodies and query strings.
pub fn deserialize_optional_day<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_day(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

pub fn previous_day(day: NaiveDate) -> Option<NaiveDate> {
    day.pred_opt()
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::Validation(
                "startDate must not be after endDate".into(),
            ));
        }
        let range = Self { start, end };
        if range.days() > MAX_RANGE_DAYS {
            return Err(AppError::Validation(format!(
                "Date range must not exceed {MAX_RANGE_DAYS} days"
            )));
        }
        Ok(range)
    }

    /// Fill in missing bounds: end defaults to `today`, start to
    /// `today - window_days`.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        window_days: i64,
    ) -> AppResult<Self> {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or_else(|| today - Duration::days(window_days));
        Self::new(start, end)
    }

    /// Number of calendar days, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}
