//! Date helpers and the optional-bounds [`DateRange`] used by search screens

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display format for dates in ranges and reports
pub const DATE_FORMAT_DEFAULT: &str = "%Y-%m-%d";

/// Midnight at the start of the given day
pub fn start_of_day(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_time(NaiveTime::MIN)
}

/// 23:59:59 on the given day
pub fn end_of_day(dt: NaiveDateTime) -> NaiveDateTime {
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    dt.date().and_time(last)
}

/// Whether `check` falls within `earlier..=later` days of `current`.
/// A window that leaves the representable date range is never reasonable.
pub fn is_reasonable_date(
    current: NaiveDateTime,
    check: NaiveDateTime,
    earlier: i64,
    later: i64,
) -> bool {
    let shift = |days: i64| {
        Duration::try_days(days).and_then(|delta| current.checked_add_signed(delta))
    };
    match (shift(earlier), shift(later)) {
        (Some(low), Some(high)) => check >= low && check <= high,
        _ => false,
    }
}

/// A date range whose ends are both optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Self {
        Self { from, to }
    }

    /// Range over whole days
    pub fn days(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            from: from.map(|d| d.and_time(NaiveTime::MIN)),
            to: to.map(|d| d.and_time(NaiveTime::MIN)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn only_from(&self) -> bool {
        self.from.is_some() && self.to.is_none()
    }

    pub fn only_to(&self) -> bool {
        self.from.is_none() && self.to.is_some()
    }

    /// Start of the `from` day, or the minimum date when open
    pub fn from_date(&self) -> NaiveDateTime {
        self.from.map(start_of_day).unwrap_or(NaiveDateTime::MIN)
    }

    /// End of the `to` day, or the maximum date when open
    pub fn to_date(&self) -> NaiveDateTime {
        self.to.map(end_of_day).unwrap_or(NaiveDateTime::MAX)
    }

    /// Whether `dt` falls on a day inside the range
    pub fn contains(&self, dt: NaiveDateTime) -> bool {
        dt >= self.from_date() && dt <= self.to_date()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.to) {
            (None, None) => Ok(()),
            (Some(from), None) => write!(f, "From {}", from.format(DATE_FORMAT_DEFAULT)),
            (None, Some(to)) => write!(f, "To {}", to.format(DATE_FORMAT_DEFAULT)),
            (Some(from), Some(to)) => write!(
                f,
                "From {} To {}",
                from.format(DATE_FORMAT_DEFAULT),
                to.format(DATE_FORMAT_DEFAULT)
            ),
        }
    }
}
