//! Schedule types.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// A recipient's availability configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Whether schedule gating applies to this recipient at all.
    pub is_enabled: bool,
    /// Per-weekday availability windows.
    pub weekly: Option<WeeklySchedule>,
}

/// Availability windows keyed by the seven fixed weekday names.
///
/// A day that is absent contributes no available windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub sunday: Option<DaySchedule>,
    pub monday: Option<DaySchedule>,
    pub tuesday: Option<DaySchedule>,
    pub wednesday: Option<DaySchedule>,
    pub thursday: Option<DaySchedule>,
    pub friday: Option<DaySchedule>,
    pub saturday: Option<DaySchedule>,
}

impl WeeklySchedule {
    /// Look up the configuration for a weekday.
    pub fn day(&self, weekday: Weekday) -> Option<&DaySchedule> {
        match weekday {
            Weekday::Sun => self.sunday.as_ref(),
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
        }
    }

    /// Whether any weekday is enabled with at least one hour range.
    pub fn has_open_day(&self) -> bool {
        [
            &self.sunday,
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
        ]
        .into_iter()
        .any(|d| d.as_ref().is_some_and(DaySchedule::is_open))
    }
}

/// One weekday's availability windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaySchedule {
    pub is_enabled: bool,
    /// Hour ranges in declared order. Evaluation does not sort them.
    pub hours: Vec<TimeRange>,
}

impl DaySchedule {
    /// Whether this day contributes any available windows.
    pub fn is_open(&self) -> bool {
        self.is_enabled && !self.hours.is_empty()
    }

    /// Whether any of this day's ranges spans past midnight into the next
    /// calendar day.
    pub fn has_overnight_range(&self) -> bool {
        self.hours.iter().any(TimeRange::wraps_midnight)
    }
}

/// A time range in 12-hour `"hh:mm AM"`/`"hh:mm PM"` form.
///
/// End-before-start denotes an overnight window spanning into the next
/// calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Both endpoints as minutes-of-day, or `None` if either is malformed.
    ///
    /// A range with an unparseable endpoint contributes no window.
    pub fn minutes(&self) -> Option<(u32, u32)> {
        Some((parse_clock(&self.start)?, parse_clock(&self.end)?))
    }

    /// Whether this range spans past midnight (end is numerically before
    /// start).
    pub fn wraps_midnight(&self) -> bool {
        self.minutes().is_some_and(|(start, end)| end < start)
    }

    /// Whether a minute-of-day falls inside this range.
    ///
    /// Boundaries are inclusive. A wrapped range contains `t` when
    /// `t >= start || t <= end`.
    pub fn contains_minute(&self, t: u32) -> bool {
        let Some((start, end)) = self.minutes() else {
            return false;
        };
        if end < start {
            t >= start || t <= end
        } else {
            start <= t && t <= end
        }
    }
}

/// Parse a 12-hour `"hh:mm AM"`/`"hh:mm PM"` clock string into minutes since
/// midnight.
///
/// `12:00 AM` is midnight (0) and `12:00 PM` is noon (720). Returns `None`
/// for anything malformed.
pub fn parse_clock(s: &str) -> Option<u32> {
    let (time, meridiem) = s.trim().split_once(' ')?;
    let (hour, minute) = time.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return None;
    }
    let hour24 = match meridiem.trim().to_ascii_uppercase().as_str() {
        "AM" => hour % 12,
        "PM" => hour % 12 + 12,
        _ => return None,
    };
    Some(hour24 * 60 + minute)
}
