use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const MINUTES_PER_DAY: u16 = 24 * 60;

// ==============================================================================
// TIME OF DAY
// ==============================================================================

/// Minute-granularity wall-clock time, canonically encoded as zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }
}

impl From<NaiveTime> for TimeOfDay {
    // Seconds are truncated.
    fn from(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = WorkingHoursError;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:00` (Postgres `time` columns).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || WorkingHoursError::InvalidScheduleFormat(raw.to_string());

        let mut parts = raw.trim().split(':');
        let hour = numeric_field(parts.next(), 1, 2).ok_or_else(invalid)?;
        let minute = numeric_field(parts.next(), 2, 2).ok_or_else(invalid)?;

        match parts.next() {
            None => {}
            Some("00") => {}
            Some(_) => return Err(invalid()),
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

fn numeric_field(part: Option<&str>, min_len: usize, max_len: usize) -> Option<u8> {
    let part = part?;
    if part.len() < min_len || part.len() > max_len || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Times already reserved for one doctor on one date.
pub type BookedSet = HashSet<TimeOfDay>;

// ==============================================================================
// WORKING HOURS
// ==============================================================================

/// One weekday's working window as stored upstream. Bounds stay raw strings so
/// that empty or malformed entries can be read and treated as "not working".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl DayWindow {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            active: None,
        }
    }

    pub fn is_working(&self) -> bool {
        self.active != Some(false) && has_text(&self.start) && has_text(&self.end)
    }

    /// Parsed `[start, end)` bounds, or `None` when the day is not worked.
    pub fn bounds(&self) -> Result<Option<(TimeOfDay, TimeOfDay)>, WorkingHoursError> {
        let (Some(start), Some(end)) = (self.start.as_deref(), self.end.as_deref()) else {
            return Ok(None);
        };
        if !self.is_working() {
            return Ok(None);
        }

        let start: TimeOfDay = start.parse()?;
        let end: TimeOfDay = end.parse()?;
        if end <= start {
            return Err(WorkingHoursError::InvalidWindow { start, end });
        }

        Ok(Some((start, end)))
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let name = name.trim().to_ascii_lowercase();
    WEEKDAYS.into_iter().find(|day| weekday_name(*day) == name)
}

/// A doctor's recurring week. Missing days are days off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredSchedule")]
pub struct WeeklySchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monday: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuesday: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wednesday: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thursday: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friday: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturday: Option<DayWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunday: Option<DayWindow>,
}

impl WeeklySchedule {
    pub fn day(&self, weekday: Weekday) -> Option<&DayWindow> {
        self.slot(weekday).as_ref()
    }

    pub fn set_day(&mut self, weekday: Weekday, window: Option<DayWindow>) {
        *self.slot_mut(weekday) = window;
    }

    pub fn with_day(mut self, weekday: Weekday, window: DayWindow) -> Self {
        self.set_day(weekday, Some(window));
        self
    }

    /// Window for a civil date. The weekday comes from the calendar date
    /// alone, never from an instant.
    pub fn window_for(&self, date: NaiveDate) -> Option<&DayWindow> {
        self.day(date.weekday())
    }

    pub fn working_days(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEKDAYS
            .into_iter()
            .filter(|day| self.day(*day).is_some_and(DayWindow::is_working))
    }

    pub fn validate(&self) -> Result<(), WorkingHoursError> {
        for day in WEEKDAYS {
            if let Some(window) = self.day(day) {
                window.bounds()?;
            }
        }
        Ok(())
    }

    fn slot(&self, weekday: Weekday) -> &Option<DayWindow> {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    fn slot_mut(&mut self, weekday: Weekday) -> &mut Option<DayWindow> {
        match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }
}

/// Shapes found in the `working_hours` column: the day map, or the older
/// `[{day, start, end}]` list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSchedule {
    Days(BTreeMap<String, Option<DayWindow>>),
    Legacy(Vec<LegacyDayEntry>),
}

#[derive(Deserialize)]
struct LegacyDayEntry {
    day: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

impl From<StoredSchedule> for WeeklySchedule {
    fn from(stored: StoredSchedule) -> Self {
        let mut schedule = WeeklySchedule::default();

        match stored {
            StoredSchedule::Days(days) => {
                for (name, window) in days {
                    if let Some(day) = weekday_from_name(&name) {
                        schedule.set_day(day, window);
                    }
                }
            }
            StoredSchedule::Legacy(entries) => {
                for entry in entries {
                    let (Some(day), Some(start), Some(end)) = (entry.day, entry.start, entry.end) else {
                        continue;
                    };
                    if start.is_empty() || end.is_empty() {
                        continue;
                    }
                    if let Some(day) = weekday_from_name(&day) {
                        schedule.set_day(day, Some(DayWindow::new(&start, &end)));
                    }
                }
            }
        }

        schedule
    }
}

// ==============================================================================
// PERSISTENCE ROWS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorScheduleRow {
    pub id: String,
    #[serde(default)]
    pub working_hours: Option<WeeklySchedule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookedTimeRow {
    pub time: String,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHoursPayload {
    pub working_hours: WeeklySchedule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsResponse {
    pub doctor_id: String,
    pub date: NaiveDate,
    pub available_slots: Vec<TimeOfDay>,
    pub total_slots: usize,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkingHoursError {
    #[error("Invalid schedule time format: {0:?} (expected HH:MM)")]
    InvalidScheduleFormat(String),

    #[error("Working window must end after it starts ({start}-{end})")]
    InvalidWindow { start: TimeOfDay, end: TimeOfDay },

    #[error("Doctor not found: {0}")]
    DoctorNotFound(String),
}
