use crate::error::PulseError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Widest window a single fetch may cover. Providers cap their own report
/// APIs at roughly a year of daily rows.
const MAX_RANGE_DAYS: i64 = 366;

/// Inclusive date window for fetches and aggregate reads.
///
/// Validated at construction so malformed ranges never reach a provider or
/// the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PulseError> {
        if start > end {
            return Err(PulseError::Validation(format!(
                "date range start {start} is after end {end}"
            )));
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(PulseError::Validation(format!(
                "date range spans {days} days, the maximum is {MAX_RANGE_DAYS}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Optional breakdown axes a caller may request from a dimensioned provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Query,
    Page,
    Device,
    Location,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Query => "query",
            Dimension::Page => "page",
            Dimension::Device => "device",
            Dimension::Location => "location",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(d("2025-06-30"), d("2025-06-01")).unwrap_err();
        assert!(matches!(err, PulseError::Validation(_)));
    }

    #[test]
    fn single_day_range_is_valid() {
        let range = DateRange::new(d("2025-06-01"), d("2025-06-01")).unwrap();
        assert_eq!(range.days(), 1);
    }

    #[test]
    fn overlong_range_is_rejected() {
        let err = DateRange::new(d("2024-01-01"), d("2025-06-01")).unwrap_err();
        assert!(matches!(err, PulseError::Validation(_)));
    }
}
