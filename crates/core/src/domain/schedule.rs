use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Local wall-clock time as minutes since midnight, written `HH:MM`.
///
/// `24:00` is accepted so a window can run to the end of the day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_minutes(minutes: u16) -> Result<Self, DomainError> {
        if minutes > MINUTES_PER_DAY {
            return Err(DomainError::InvariantViolation(format!(
                "clock time of {minutes} minutes is past the end of the day"
            )));
        }
        Ok(Self(minutes))
    }

    pub fn hm(hour: u16, minute: u16) -> Result<Self, DomainError> {
        if minute > 59 {
            return Err(DomainError::InvariantViolation(format!("invalid minute `{minute}`")));
        }
        if hour > 24 {
            return Err(DomainError::InvariantViolation(format!("invalid hour `{hour}`")));
        }
        Self::from_minutes(hour * 60 + minute)
    }

    pub const fn minutes(self) -> u16 {
        self.0
    }
}

impl FromStr for ClockTime {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvariantViolation(format!("`{value}` is not HH:MM"));
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse::<u16>().map_err(|_| invalid())?;
        let minute = minute.parse::<u16>().map_err(|_| invalid())?;
        if hour > 24 || (hour == 24 && minute != 0) {
            return Err(invalid());
        }
        Self::hm(hour, minute)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// One window on a given day of the negotiation week.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub day: Weekday,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeSlot {
    pub fn new(day: Weekday, start: ClockTime, end: ClockTime) -> Result<Self, DomainError> {
        let slot = Self { day, start, end };
        slot.check_ordered()?;
        Ok(slot)
    }

    pub fn check_ordered(&self) -> Result<(), DomainError> {
        if self.end <= self.start {
            return Err(DomainError::InvariantViolation(format!(
                "slot {self} must end after it starts"
            )));
        }
        Ok(())
    }

    pub fn minutes(&self) -> u16 {
        self.end.minutes().saturating_sub(self.start.minutes())
    }

    /// Intersection with `other`; `None` on different days or an empty overlap.
    pub fn overlap(&self, other: &TimeSlot) -> Option<TimeSlot> {
        if self.day != other.day {
            return None;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeSlot { day: self.day, start, end })
    }

    pub fn contains(&self, other: &TimeSlot) -> bool {
        self.day == other.day && self.start <= other.start && other.end <= self.end
    }

    /// The first `minutes` of this slot, if it is long enough.
    pub fn truncated(&self, minutes: u16) -> Option<TimeSlot> {
        if minutes == 0 || self.minutes() < minutes {
            return None;
        }
        let end = ClockTime(self.start.minutes() + minutes);
        Some(TimeSlot { day: self.day, start: self.start, end })
    }

    pub fn end_instant(&self, anchor: &CalendarAnchor) -> Option<DateTime<Utc>> {
        anchor.resolve(self.day, self.end)
    }

    /// Whether the slot resolves on `anchor` and finishes no later than `deadline`.
    pub fn ends_by(&self, anchor: &CalendarAnchor, deadline: DateTime<Utc>) -> bool {
        self.end_instant(anchor).is_some_and(|end| end <= deadline)
    }

    /// Position within the week, Monday first.
    pub fn chronological_key(&self) -> (u32, ClockTime) {
        (self.day.num_days_from_monday(), self.start)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.day, self.start, self.end)
    }
}

/// Pins day-of-week slots to concrete instants: the week they fall in and its UTC offset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarAnchor {
    /// Monday of the negotiation week.
    pub week_of: NaiveDate,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl CalendarAnchor {
    pub fn new(week_of: NaiveDate, utc_offset_minutes: i32) -> Self {
        Self { week_of, utc_offset_minutes }
    }

    pub fn resolve(&self, day: Weekday, time: ClockTime) -> Option<DateTime<Utc>> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)?;
        let local = self.week_of.and_hms_opt(0, 0, 0)?
            + Duration::days(i64::from(day.num_days_from_monday()))
            + Duration::minutes(i64::from(time.minutes()));
        offset.from_local_datetime(&local).single().map(|instant| instant.with_timezone(&Utc))
    }
}

/// Every window shared by both calendars that fits `min_minutes`, trimmed to exactly that
/// length and ordered through the week regardless of how either list was written.
pub fn feasible_slots(ours: &[TimeSlot], theirs: &[TimeSlot], min_minutes: u16) -> Vec<TimeSlot> {
    let mut slots: Vec<TimeSlot> = ours
        .iter()
        .flat_map(|mine| theirs.iter().filter_map(move |other| mine.overlap(other)))
        .filter_map(|shared| shared.truncated(min_minutes))
        .collect();
    slots.sort_by_key(TimeSlot::chronological_key);
    slots.dedup();
    slots
}

/// Earliest window shared by both calendars that fits `min_minutes`, trimmed to exactly that length.
pub fn choose_feasible_slot(
    ours: &[TimeSlot],
    theirs: &[TimeSlot],
    min_minutes: u16,
) -> Option<TimeSlot> {
    feasible_slots(ours, theirs, min_minutes).into_iter().next()
}

/// Longest stretch of `slot` that lies inside both availability lists, in minutes.
pub fn shared_minutes(slot: &TimeSlot, first: &[TimeSlot], second: &[TimeSlot]) -> u16 {
    first
        .iter()
        .filter_map(|window| slot.overlap(window))
        .flat_map(|partial| second.iter().filter_map(move |window| partial.overlap(window)))
        .map(|shared| shared.minutes())
        .max()
        .unwrap_or(0)
}
