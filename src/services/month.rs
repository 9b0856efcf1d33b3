//! Calendar months: validation, day iteration and inclusive month ranges.

use chrono::NaiveDate;

use crate::errors::AppError;

/// A (year, month) pair with month in 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateMonth {
    pub year: i32,
    pub month: u32,
}

impl std::fmt::Display for DateMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl DateMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::BadRequest(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        // Reject years chrono cannot represent.
        NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::BadRequest(format!("year {} is out of range", year)))?;
        Ok(Self { year, month })
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The month after this one, rolling December over into January.
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

    /// Number of days in the month (Gregorian rules, leap Februaries included).
    pub fn day_count(&self) -> u32 {
        self.next()
            .first_day()
            .signed_duration_since(self.first_day())
            .num_days() as u32
    }

    pub fn last_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day_count()).unwrap_or(NaiveDate::MAX)
    }

    /// Every calendar day of the month, first to last inclusive.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.first_day().iter_days().take(self.day_count() as usize)
    }

    /// Months from `self` to `end` inclusive, in chronological order.
    /// Empty when `end` is before `self`.
    pub fn through(self, end: DateMonth) -> impl Iterator<Item = DateMonth> {
        std::iter::successors(Some(self), move |m| Some(m.next()).filter(|n| *n <= end))
            .filter(move |m| *m <= end)
    }

    /// Inclusive count of months from `self` to `end`; 0 when `end` is earlier.
    pub fn months_through(&self, end: &DateMonth) -> u32 {
        let diff = (end.year - self.year) * 12 + end.month as i32 - self.month as i32;
        if diff < 0 {
            0
        } else {
            diff as u32 + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(year: i32, month: u32) -> DateMonth {
        DateMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_invalid_month_rejected() {
        assert!(matches!(DateMonth::new(2024, 0), Err(AppError::BadRequest(_))));
        assert!(matches!(DateMonth::new(2024, 13), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_day_counts() {
        assert_eq!(dm(2024, 1).day_count(), 31);
        assert_eq!(dm(2024, 2).day_count(), 29);
        assert_eq!(dm(2023, 2).day_count(), 28);
        assert_eq!(dm(1900, 2).day_count(), 28);
        assert_eq!(dm(2000, 2).day_count(), 29);
        assert_eq!(dm(2024, 4).day_count(), 30);
        assert_eq!(dm(2024, 12).day_count(), 31);
    }

    #[test]
    fn test_days_cover_whole_month() {
        let days: Vec<NaiveDate> = dm(2024, 2).days().collect();
        assert_eq!(days.len(), 29);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(days[28], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(dm(2024, 2).last_day(), days[28]);
    }

    #[test]
    fn test_next_rolls_over_december() {
        assert_eq!(dm(2023, 12).next(), dm(2024, 1));
        assert_eq!(dm(2023, 5).next(), dm(2023, 6));
    }

    #[test]
    fn test_through_spans_year_boundary() {
        let months: Vec<DateMonth> = dm(2023, 11).through(dm(2024, 2)).collect();
        assert_eq!(
            months,
            vec![dm(2023, 11), dm(2023, 12), dm(2024, 1), dm(2024, 2)]
        );
        assert_eq!(dm(2023, 11).months_through(&dm(2024, 2)), 4);
    }

    #[test]
    fn test_through_single_and_empty() {
        assert_eq!(dm(2024, 3).through(dm(2024, 3)).count(), 1);
        assert_eq!(dm(2024, 3).through(dm(2024, 2)).count(), 0);
        assert_eq!(dm(2024, 3).months_through(&dm(2024, 2)), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(dm(2024, 3).to_string(), "2024-03");
    }
}
