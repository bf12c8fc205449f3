use crate::errors::ServiceError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reporting month in `YYYY-MM` form.
///
/// Parsing rejects malformed strings and out-of-range components so a bad
/// period surfaces immediately instead of producing an empty date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportPeriod {
    year: i32,
    month: u32,
}

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, ServiceError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ServiceError::InvalidPeriod(format!(
                "year {} outside {}..={}",
                year, MIN_YEAR, MAX_YEAR
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(ServiceError::InvalidPeriod(format!(
                "month {} outside 1..=12",
                month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Period containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_else(|| panic!("validated period {}-{} has a first day", self.year, self.month))
    }

    /// Last day of the month.
    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or_else(|| {
            panic!("validated period {}-{} has a last day", self.year, self.month)
        })
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// A month is complete once a later month has begun.
    pub fn is_complete(&self, as_of: NaiveDate) -> bool {
        *self < Self::from_date(as_of)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ReportPeriod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year_part, month_part) = s
            .split_once('-')
            .ok_or_else(|| ServiceError::InvalidPeriod(format!("expected YYYY-MM, got {:?}", s)))?;
        if year_part.len() != 4 || month_part.len() != 2 {
            return Err(ServiceError::InvalidPeriod(format!(
                "expected YYYY-MM, got {:?}",
                s
            )));
        }
        let year: i32 = year_part
            .parse()
            .map_err(|_| ServiceError::InvalidPeriod(format!("bad year in {:?}", s)))?;
        let month: u32 = month_part
            .parse()
            .map_err(|_| ServiceError::InvalidPeriod(format!("bad month in {:?}", s)))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for ReportPeriod {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportPeriod> for String {
    fn from(period: ReportPeriod) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips() {
        let period: ReportPeriod = "2025-03".parse().unwrap();
        assert_eq!(period.year(), 2025);
        assert_eq!(period.month(), 3);
        assert_eq!(period.to_string(), "2025-03");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["2025", "2025-13", "2025-00", "25-03", "2025-3", "1999-01", "abcd-ef"] {
            assert!(
                bad.parse::<ReportPeriod>().is_err(),
                "{:?} should not parse",
                bad
            );
        }
    }

    #[test]
    fn month_bounds() {
        let period: ReportPeriod = "2024-02".parse().unwrap();
        assert_eq!(period.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(period.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn prev_next_cross_year_boundary() {
        let january: ReportPeriod = "2025-01".parse().unwrap();
        assert_eq!(january.prev().to_string(), "2024-12");
        assert_eq!(january.prev().next(), january);
        let december: ReportPeriod = "2024-12".parse().unwrap();
        assert_eq!(december.next().to_string(), "2025-01");
    }

    #[test]
    fn completeness_excludes_current_month() {
        let march: ReportPeriod = "2025-03".parse().unwrap();
        assert!(march.is_complete(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()));
        assert!(!march.is_complete(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()));
    }
}
