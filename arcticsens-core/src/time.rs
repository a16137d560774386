//! Calendar-aware time coordinates
//!
//! Model output arrives with a variety of calendars (`noleap`, `360_day`, ...) and
//! occasionally with time stored as plain timestamps. The core only ever needs the
//! calendar month and year of each timestep, but it needs them reliably: month
//! selection is always keyed off the time coordinate itself, never off the position
//! of a value within the series.
//!
//! A [`TimeAxis`] is homogeneous by construction. Mixing plain timestamps with
//! calendar dates, or mixing calendars, is rejected when the axis is built.
//!
//! ```rust
//! use arcticsens_core::time::{CalendarKind, Month, TimeAxis};
//!
//! let axis = TimeAxis::monthly(1850, Month::new(1).unwrap(), 24, Some(CalendarKind::NoLeap)).unwrap();
//! assert_eq!(axis.len(), 24);
//! assert_eq!(axis.indices_for_month(Month::new(9).unwrap()), vec![8, 20]);
//! ```

use crate::errors::{ArcticError, ArcticResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// A calendar month, 1 (January) through 12 (December)
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Month(u8);

impl Month {
    /// Create a month from its calendar number (1 = January)
    pub fn new(number: u32) -> ArcticResult<Self> {
        if (1..=12).contains(&number) {
            Ok(Self(number as u8))
        } else {
            Err(ArcticError::InvalidMonth(number))
        }
    }

    /// Calendar number of the month (1 = January)
    pub fn number(self) -> u32 {
        self.0 as u32
    }

    /// Zero-based position of the month within a year
    pub fn index0(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn name(self) -> &'static str {
        MONTH_NAMES[self.index0()]
    }

    /// All twelve months in calendar order
    pub fn all() -> impl Iterator<Item = Month> {
        (1..=12u8).map(Month)
    }
}

impl TryFrom<u32> for Month {
    type Error = ArcticError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Month::new(value)
    }
}

impl From<Month> for u32 {
    fn from(m: Month) -> u32 {
        m.number()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// CF calendar attached to a time coordinate
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    /// Mixed Julian/Gregorian calendar (`standard` or `gregorian`)
    Standard,
    ProlepticGregorian,
    /// 365 days every year (`noleap` or `365_day`)
    NoLeap,
    /// 366 days every year (`all_leap` or `366_day`)
    AllLeap,
    /// Twelve 30-day months
    Day360,
    Julian,
}

impl CalendarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarKind::Standard => "standard",
            CalendarKind::ProlepticGregorian => "proleptic_gregorian",
            CalendarKind::NoLeap => "noleap",
            CalendarKind::AllLeap => "all_leap",
            CalendarKind::Day360 => "360_day",
            CalendarKind::Julian => "julian",
        }
    }

    fn is_leap_year(&self, year: i32) -> bool {
        let gregorian = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
        match self {
            CalendarKind::Standard | CalendarKind::ProlepticGregorian => gregorian,
            CalendarKind::Julian => year % 4 == 0,
            CalendarKind::AllLeap => true,
            CalendarKind::NoLeap | CalendarKind::Day360 => false,
        }
    }

    /// Number of days in `month` of `year` under this calendar
    pub fn days_in_month(&self, year: i32, month: Month) -> u8 {
        if *self == CalendarKind::Day360 {
            return 30;
        }
        match month.number() {
            2 if self.is_leap_year(year) => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }
}

impl FromStr for CalendarKind {
    type Err = ArcticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" => Ok(CalendarKind::Standard),
            "proleptic_gregorian" => Ok(CalendarKind::ProlepticGregorian),
            "noleap" | "365_day" => Ok(CalendarKind::NoLeap),
            "all_leap" | "366_day" => Ok(CalendarKind::AllLeap),
            "360_day" => Ok(CalendarKind::Day360),
            "julian" => Ok(CalendarKind::Julian),
            other => Err(ArcticError::Error(format!("Unknown calendar '{other}'"))),
        }
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A date expressed in an explicit (possibly non-Gregorian) calendar
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    pub month: Month,
    pub day: u8,
    pub calendar: CalendarKind,
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32, calendar: CalendarKind) -> ArcticResult<Self> {
        let month = Month::new(month)?;
        let max_day = calendar.days_in_month(year, month) as u32;
        if day == 0 || day > max_day {
            return Err(ArcticError::Error(format!(
                "Day {day} is outside {} {year} in the {calendar} calendar",
                month.name()
            )));
        }
        Ok(Self {
            year,
            month,
            day: day as u8,
            calendar,
        })
    }
}

/// A single value on a time coordinate
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TimeStamp {
    /// Plain timestamp in the proleptic Gregorian calendar
    Native(NaiveDateTime),
    /// Date carrying its own calendar
    Calendar(CalendarDate),
}

impl TimeStamp {
    pub fn year(&self) -> i32 {
        match self {
            TimeStamp::Native(dt) => dt.year(),
            TimeStamp::Calendar(date) => date.year,
        }
    }

    pub fn month(&self) -> Month {
        match self {
            // chrono months are always 1..=12
            TimeStamp::Native(dt) => Month(dt.month() as u8),
            TimeStamp::Calendar(date) => date.month,
        }
    }

    /// `(year, month)` key used to pair timesteps across series
    pub fn year_month(&self) -> (i32, Month) {
        (self.year(), self.month())
    }

    fn representation(&self) -> &'static str {
        match self {
            TimeStamp::Native(_) => "timestamp",
            TimeStamp::Calendar(_) => "calendar date",
        }
    }

    fn calendar(&self) -> Option<CalendarKind> {
        match self {
            TimeStamp::Native(_) => None,
            TimeStamp::Calendar(date) => Some(date.calendar),
        }
    }
}

/// Homogeneous time coordinate of a field or index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimeStamp>", into = "Vec<TimeStamp>")]
pub struct TimeAxis {
    values: Vec<TimeStamp>,
}

impl TimeAxis {
    /// Build a time axis, rejecting mixed representations and mixed calendars
    pub fn new(values: Vec<TimeStamp>) -> ArcticResult<Self> {
        if let Some(first) = values.first() {
            for (idx, value) in values.iter().enumerate().skip(1) {
                if value.representation() != first.representation() {
                    return Err(ArcticError::MixedTimeRepresentation(format!(
                        "element {idx} is a {} but the axis starts with a {}",
                        value.representation(),
                        first.representation()
                    )));
                }
                if value.calendar() != first.calendar() {
                    return Err(ArcticError::MixedTimeRepresentation(format!(
                        "element {idx} uses calendar {:?} but the axis starts with {:?}",
                        value.calendar(),
                        first.calendar()
                    )));
                }
            }
        }
        Ok(Self { values })
    }

    /// Regular monthly axis starting at `start_year`/`start_month`
    ///
    /// Timesteps are placed mid-month (day 15). With `calendar = None` plain timestamps
    /// are produced, otherwise calendar dates.
    pub fn monthly(
        start_year: i32,
        start_month: Month,
        n: usize,
        calendar: Option<CalendarKind>,
    ) -> ArcticResult<Self> {
        let values = (0..n)
            .map(|step| {
                let offset = start_month.index0() + step;
                let year = start_year + (offset / 12) as i32;
                mid_month(year, (offset % 12) as u32 + 1, calendar)
            })
            .collect::<ArcticResult<Vec<_>>>()?;
        Self::new(values)
    }

    /// Mid-month plain timestamps from parallel year and month lists
    pub fn from_year_months(years: &[i32], months: &[u32]) -> ArcticResult<Self> {
        if years.len() != months.len() {
            return Err(ArcticError::ShapeMismatch(format!(
                "{} years for {} months",
                years.len(),
                months.len()
            )));
        }
        let values = years
            .iter()
            .zip(months)
            .map(|(&year, &month)| {
                Month::new(month)?;
                mid_month(year, month, None)
            })
            .collect::<ArcticResult<Vec<_>>>()?;
        Self::new(values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TimeStamp> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeStamp> {
        self.values.iter()
    }

    /// Calendar of the axis, `None` for plain timestamps
    pub fn calendar(&self) -> Option<CalendarKind> {
        self.values.first().and_then(|v| v.calendar())
    }

    /// Month of year of every timestep
    pub fn months(&self) -> Vec<Month> {
        self.values.iter().map(|v| v.month()).collect()
    }

    /// Positions of all timesteps falling in `month`
    pub fn indices_for_month(&self, month: Month) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.month() == month)
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn mid_month(year: i32, month: u32, calendar: Option<CalendarKind>) -> ArcticResult<TimeStamp> {
    match calendar {
        None => NaiveDate::from_ymd_opt(year, month, 15)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(TimeStamp::Native)
            .ok_or_else(|| ArcticError::Error(format!("Cannot build timestamp {year}-{month}-15"))),
        Some(cal) => Ok(TimeStamp::Calendar(CalendarDate::new(year, month, 15, cal)?)),
    }
}

impl TryFrom<Vec<TimeStamp>> for TimeAxis {
    type Error = ArcticError;

    fn try_from(values: Vec<TimeStamp>) -> Result<Self, Self::Error> {
        TimeAxis::new(values)
    }
}

impl From<TimeAxis> for Vec<TimeStamp> {
    fn from(axis: TimeAxis) -> Self {
        axis.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(year: i32, month: u32) -> TimeStamp {
        TimeStamp::Native(
            NaiveDate::from_ymd_opt(year, month, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn month_bounds() {
        assert!(Month::new(0).is_err());
        assert!(Month::new(13).is_err());
        let sep = Month::new(9).unwrap();
        assert_eq!(sep.index0(), 8);
        assert_eq!(sep.name(), "September");
        assert_eq!(Month::all().count(), 12);
    }

    #[test]
    fn calendar_names() {
        assert_eq!(
            "365_day".parse::<CalendarKind>().unwrap(),
            CalendarKind::NoLeap
        );
        assert_eq!(
            "gregorian".parse::<CalendarKind>().unwrap(),
            CalendarKind::Standard
        );
        assert!("martian".parse::<CalendarKind>().is_err());
    }

    #[test]
    fn days_in_month_by_calendar() {
        let feb = Month::new(2).unwrap();
        assert_eq!(CalendarKind::Standard.days_in_month(2000, feb), 29);
        assert_eq!(CalendarKind::Standard.days_in_month(1900, feb), 28);
        assert_eq!(CalendarKind::Julian.days_in_month(1900, feb), 29);
        assert_eq!(CalendarKind::NoLeap.days_in_month(2000, feb), 28);
        assert_eq!(CalendarKind::AllLeap.days_in_month(2001, feb), 29);
        assert_eq!(CalendarKind::Day360.days_in_month(2001, feb), 30);
    }

    #[test]
    fn calendar_date_validates_day() {
        assert!(CalendarDate::new(2001, 2, 30, CalendarKind::Day360).is_ok());
        assert!(CalendarDate::new(2001, 2, 30, CalendarKind::NoLeap).is_err());
        assert!(CalendarDate::new(2001, 1, 0, CalendarKind::NoLeap).is_err());
    }

    #[test]
    fn mixed_representation_rejected() {
        let values = vec![
            native(2000, 1),
            TimeStamp::Calendar(CalendarDate::new(2000, 2, 15, CalendarKind::Standard).unwrap()),
        ];
        let err = TimeAxis::new(values).unwrap_err();
        assert!(matches!(err, ArcticError::MixedTimeRepresentation(_)));
    }

    #[test]
    fn mixed_calendars_rejected() {
        let values = vec![
            TimeStamp::Calendar(CalendarDate::new(2000, 1, 15, CalendarKind::NoLeap).unwrap()),
            TimeStamp::Calendar(CalendarDate::new(2000, 2, 15, CalendarKind::Day360).unwrap()),
        ];
        assert!(TimeAxis::new(values).is_err());
    }

    #[test]
    fn monthly_axis_wraps_years() {
        let axis = TimeAxis::monthly(1999, Month::new(11).unwrap(), 4, None).unwrap();
        let keys: Vec<(i32, u32)> = axis
            .iter()
            .map(|t| (t.year(), t.month().number()))
            .collect();
        assert_eq!(keys, vec![(1999, 11), (1999, 12), (2000, 1), (2000, 2)]);
        assert_eq!(axis.calendar(), None);
    }

    #[test]
    fn month_indices_follow_coordinate_not_stride() {
        // February 2000 missing from the series
        let axis = TimeAxis::new(vec![
            native(2000, 1),
            native(2000, 3),
            native(2000, 4),
            native(2001, 1),
            native(2001, 2),
            native(2001, 3),
        ])
        .unwrap();
        assert_eq!(axis.indices_for_month(Month::new(3).unwrap()), vec![1, 5]);
        assert_eq!(axis.indices_for_month(Month::new(2).unwrap()), vec![4]);
    }

    #[test]
    fn deserialization_revalidates() {
        let values = vec![
            native(2000, 1),
            TimeStamp::Calendar(CalendarDate::new(2000, 2, 15, CalendarKind::Standard).unwrap()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert!(serde_json::from_str::<TimeAxis>(&json).is_err());
    }

    #[test]
    fn from_parallel_year_month_lists() {
        let axis = TimeAxis::from_year_months(&[1980, 1980, 1981], &[3, 9, 3]).unwrap();
        assert_eq!(axis.indices_for_month(Month::new(3).unwrap()), vec![0, 2]);
        assert_eq!(axis.get(2).unwrap().year(), 1981);
        assert!(TimeAxis::from_year_months(&[1980], &[13]).is_err());
        assert!(TimeAxis::from_year_months(&[1980, 1981], &[1]).is_err());
    }
}
