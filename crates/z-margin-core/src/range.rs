//! Inclusive calendar date ranges.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{MarginError, Result};

/// Date format used on the wire (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive range of calendar dates.
///
/// Construction rejects `start > end`, so every `DateRange` holds at least one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the range.
    pub start: NaiveDate,
    /// Last day of the range (inclusive).
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::InvalidRange` if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(MarginError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single day.
    #[must_use]
    pub const fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The `days` calendar days ending at `end`, inclusive.
    ///
    /// `days` of zero is treated as one.
    #[must_use]
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let back = u64::from(days.max(1) - 1);
        let start = end.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Parse a range from `YYYY-MM-DD` strings.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::Configuration` for unparsable dates and
    /// `MarginError::InvalidRange` if `start > end`.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Number of calendar days in the range, inclusive.
    #[must_use]
    pub fn len_days(&self) -> u64 {
        // start <= end is guaranteed by construction.
        u64::try_from((self.end - self.start).num_days()).unwrap_or(0) + 1
    }

    /// Whether `day` falls inside the range.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Iterate every day in the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    /// Smallest range covering both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns `MarginError::Configuration` if the text is not a calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|err| MarginError::Configuration(format!("invalid date '{value}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn rejects_reversed_range() {
        let result = DateRange::parse("2024-02-01", "2024-01-01");
        assert!(matches!(result, Err(MarginError::InvalidRange { .. })));
    }

    #[test]
    fn rejects_bad_date() {
        let result = DateRange::parse("2024-13-01", "2024-01-01");
        assert!(matches!(result, Err(MarginError::Configuration(_))));
    }

    #[test]
    fn inclusive_length_and_days() {
        let range = DateRange::parse("2024-01-30", "2024-02-02").unwrap();
        assert_eq!(range.len_days(), 4);
        let days: Vec<_> = range.days().collect();
        assert_eq!(
            days,
            vec![
                date("2024-01-30"),
                date("2024-01-31"),
                date("2024-02-01"),
                date("2024-02-02")
            ]
        );
    }

    #[test]
    fn single_day_range() {
        let range = DateRange::single(date("2024-01-01"));
        assert_eq!(range.len_days(), 1);
        assert!(range.contains(date("2024-01-01")));
        assert!(!range.contains(date("2024-01-02")));
    }

    #[test]
    fn trailing_window() {
        let range = DateRange::trailing(date("2024-01-30"), 30);
        assert_eq!(range.start, date("2024-01-01"));
        assert_eq!(range.len_days(), 30);
        assert_eq!(DateRange::trailing(date("2024-01-30"), 0).len_days(), 1);
    }

    #[test]
    fn union_covers_both() {
        let a = DateRange::parse("2024-01-05", "2024-01-07").unwrap();
        let b = DateRange::parse("2024-01-01", "2024-01-02").unwrap();
        let u = a.union(&b);
        assert_eq!(u.start, date("2024-01-01"));
        assert_eq!(u.end, date("2024-01-07"));
    }
}
