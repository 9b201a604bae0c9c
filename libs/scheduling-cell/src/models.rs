use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::SchedulingError;

/// Slot length used when a caller does not ask for a specific interval.
pub const DEFAULT_SLOT_INTERVAL_MINUTES: u32 = 30;

/// Concurrent-appointment ceiling applied when overbooking is enabled but no
/// explicit maximum is configured.
pub const DEFAULT_MAX_CONCURRENT_APPOINTMENTS: u32 = 2;

/// A half-open local-time interval `[start, end)` expressed as `HH:MM`
/// wall-clock strings, scoped to a single weekday or calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub start: String, // HH:MM
    pub end: String,   // HH:MM
}

impl TimeBlock {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    pub fn start_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.start)
    }

    pub fn end_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.end)
    }
}

/// Parse an `HH:MM` wall-clock string into minutes since local midnight.
/// `24:00` is accepted as an end-of-day bound.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 24 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Recurring weekly blocks keyed by weekday. The wire format uses English
/// weekday names, matching the upstream calendar configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    #[serde(rename = "Monday", default, skip_serializing_if = "Vec::is_empty")]
    pub monday: Vec<TimeBlock>,
    #[serde(rename = "Tuesday", default, skip_serializing_if = "Vec::is_empty")]
    pub tuesday: Vec<TimeBlock>,
    #[serde(rename = "Wednesday", default, skip_serializing_if = "Vec::is_empty")]
    pub wednesday: Vec<TimeBlock>,
    #[serde(rename = "Thursday", default, skip_serializing_if = "Vec::is_empty")]
    pub thursday: Vec<TimeBlock>,
    #[serde(rename = "Friday", default, skip_serializing_if = "Vec::is_empty")]
    pub friday: Vec<TimeBlock>,
    #[serde(rename = "Saturday", default, skip_serializing_if = "Vec::is_empty")]
    pub saturday: Vec<TimeBlock>,
    #[serde(rename = "Sunday", default, skip_serializing_if = "Vec::is_empty")]
    pub sunday: Vec<TimeBlock>,
}

impl WeeklySchedule {
    pub fn blocks_for(&self, weekday: Weekday) -> &[TimeBlock] {
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

    pub fn blocks_for_mut(&mut self, weekday: Weekday) -> &mut Vec<TimeBlock> {
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

    pub fn is_empty(&self) -> bool {
        ALL_WEEKDAYS.iter().all(|d| self.blocks_for(*d).is_empty())
    }
}

pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Map an English weekday name from upstream config to a typed weekday.
pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "Monday" => Some(Weekday::Mon),
        "Tuesday" => Some(Weekday::Tue),
        "Wednesday" => Some(Weekday::Wed),
        "Thursday" => Some(Weekday::Thu),
        "Friday" => Some(Weekday::Fri),
        "Saturday" => Some(Weekday::Sat),
        "Sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// A dated exception window. Entries in `day_schedules` take precedence over
/// the weekly schedule for the dates they name, including entries that map to
/// an empty block list (the doctor does not attend that date at all).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    pub id: i64,
    #[serde(rename = "startDate")]
    pub start_date: NaiveDate,
    #[serde(rename = "endDate")]
    pub end_date: NaiveDate,
    #[serde(rename = "daySchedules", default)]
    pub day_schedules: BTreeMap<NaiveDate, Vec<TimeBlock>>,
}

impl DateOverride {
    /// Inclusive range containment.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Canonical per-doctor schedule, derived fresh from org configuration on
/// every read and immutable for the duration of an evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklySchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<DateOverride>>,
    pub allow_overbooking: bool,
    pub max_concurrent_appointments: u32,
    pub timezone: String,
}

impl DoctorSchedule {
    /// Whether any weekly or override data is configured at all.
    pub fn has_schedule(&self) -> bool {
        self.weekly.is_some() || self.overrides.is_some()
    }

    pub fn policy(&self) -> OverbookingPolicy {
        OverbookingPolicy {
            allow_overbooking: self.allow_overbooking,
            max_concurrent: self.max_concurrent_appointments,
        }
    }
}

/// Overbooking policy for a single evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverbookingPolicy {
    pub allow_overbooking: bool,
    pub max_concurrent: u32,
}

impl OverbookingPolicy {
    /// How many overlapping appointments a slot can hold. Without
    /// overbooking a slot is exclusive; with it, the configured maximum
    /// applies (zero counts as unconfigured).
    pub fn capacity(&self) -> u32 {
        if self.allow_overbooking {
            if self.max_concurrent == 0 {
                DEFAULT_MAX_CONCURRENT_APPOINTMENTS
            } else {
                self.max_concurrent
            }
        } else {
            1
        }
    }
}

/// One existing, non-cancelled appointment. Each range is one unit of
/// occupied concurrency; overlapping ranges are never merged before counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A candidate unit of bookable time. UTC instants carry the authoritative
/// boundaries; the local labels are rendered in the doctor's timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    #[serde(rename = "startISO")]
    pub start_utc: DateTime<Utc>,
    #[serde(rename = "endISO")]
    pub end_utc: DateTime<Utc>,
    #[serde(rename = "startLocal")]
    pub start_local: String, // HH:MM
    #[serde(rename = "endLocal")]
    pub end_local: String, // HH:MM
}

/// Result of evaluating one slot against a day's busy ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub available: bool,
    pub occupied_count: usize,
    pub capacity: u32,
}

/// A slot together with its evaluated availability, as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedSlot {
    #[serde(flatten)]
    pub slot: AvailableSlot,
    pub available: bool,
    pub occupied_count: usize,
    pub capacity: u32,
}

/// External `DD-MM-YYYY` identifier for a calendar day in the doctor's local
/// calendar, distinct from the ISO instants used for range boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%d-%m-%Y"))
    }
}

impl FromStr for DayKey {
    type Err = SchedulingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(value, "%d-%m-%Y")
            .map(Self)
            .map_err(|_| SchedulingError::InvalidDayKey(value.to_string()))
    }
}

impl TryFrom<String> for DayKey {
    type Error = SchedulingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

/// Per-day answer for calendar-level availability highlighting. `degraded`
/// marks days evaluated against an empty busy list because the busy-range
/// fetch failed; those are assumed rather than confirmed available.
#[derive(Debug, Clone, Serialize)]
pub struct DayBookability {
    pub day_key: DayKey,
    pub has_slots: bool,
    pub degraded: bool,
}

/// Counts of entries the normalizer discarded while merging heterogeneous
/// upstream config. Skips are tolerated, never raised, but they are counted
/// so callers can tell partial data from clean data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub skipped_entries: usize,
    pub skipped_blocks: usize,
    pub dropped_duplicate_overrides: usize,
    pub substituted_timezone: bool,
}

impl MergeStats {
    pub fn is_clean(&self) -> bool {
        self.skipped_entries == 0
            && self.skipped_blocks == 0
            && self.dropped_duplicate_overrides == 0
            && !self.substituted_timezone
    }
}

/// Output of the schedule normalizer.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedSchedule {
    pub schedule: DoctorSchedule,
    pub stats: MergeStats,
}
