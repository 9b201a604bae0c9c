use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_doctoc::DoctocClient;

use crate::error::SchedulingError;
use crate::models::{
    BusyRange, DayBookability, DayKey, DoctorSchedule, NormalizedSchedule,
    DEFAULT_SLOT_INTERVAL_MINUTES,
};
use crate::services::availability::bookable_slots_for_day;
use crate::services::normalizer::merge_calendar_config;
use crate::services::slots::generate_slots;

/// Fixed fan-out for per-day busy-range fetches when a whole date range is
/// evaluated, balancing latency against load on the booking store.
pub const DAY_QUERY_CONCURRENCY: usize = 5;

/// Answers day-level bookability questions by composing the slot generator
/// and availability evaluator with busy-range fetches from the booking
/// store. All intermediate state is scoped to the individual call, so an
/// abandoned evaluation cannot leak into a later one.
pub struct CalendarAvailabilityService {
    doctoc: DoctocClient,
    default_timezone: String,
}

impl CalendarAvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            doctoc: DoctocClient::new(config),
            default_timezone: config.default_timezone.clone(),
        }
    }

    /// Fetch and normalize a doctor's calendar configuration.
    pub async fn fetch_doctor_schedule(
        &self,
        org_id: &str,
        doctor_id: &str,
    ) -> Result<NormalizedSchedule, SchedulingError> {
        debug!("Fetching calendar config for doctor {}", doctor_id);

        let user_info: Value = self
            .doctoc
            .get_user_info(org_id, doctor_id, &["calendarInfo"])
            .await
            .map_err(|e| SchedulingError::Upstream(e.to_string()))?;

        let calendar_info = user_info.get("calendarInfo").cloned().unwrap_or(json!({}));
        Ok(merge_calendar_config(&calendar_info, &self.default_timezone))
    }

    /// Fetch one day's busy ranges for a doctor. Cancelled appointments are
    /// excluded by the store before the response is built.
    pub async fn fetch_busy_ranges(
        &self,
        org_id: &str,
        doctor_id: &str,
        day_key: DayKey,
    ) -> Result<Vec<BusyRange>, SchedulingError> {
        let raw = self
            .doctoc
            .get_busy_ranges(org_id, &day_key.to_string(), Some(doctor_id))
            .await
            .map_err(|e| SchedulingError::Upstream(e.to_string()))?;

        Ok(parse_busy_ranges(&raw))
    }

    /// Whether the date still has at least one bookable slot.
    ///
    /// A failed busy-range fetch degrades to schedule-only availability
    /// instead of hiding the day; the result is flagged so callers can tell
    /// assumed from confirmed availability.
    pub async fn day_bookability(
        &self,
        org_id: &str,
        doctor_id: &str,
        schedule: &DoctorSchedule,
        day_key: DayKey,
    ) -> DayBookability {
        match self.fetch_busy_ranges(org_id, doctor_id, day_key).await {
            Ok(busy_ranges) => {
                let slots = bookable_slots_for_day(
                    day_key.date(),
                    schedule,
                    &busy_ranges,
                    DEFAULT_SLOT_INTERVAL_MINUTES,
                );
                DayBookability {
                    day_key,
                    has_slots: !slots.is_empty(),
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(
                    "Busy-range fetch failed for {} on {}, using schedule-only fallback: {}",
                    doctor_id, day_key, e
                );
                let slots =
                    generate_slots(day_key.date(), schedule, DEFAULT_SLOT_INTERVAL_MINUTES);
                DayBookability {
                    day_key,
                    has_slots: !slots.is_empty(),
                    degraded: true,
                }
            }
        }
    }

    /// Evaluate bookability for an inclusive date range, e.g. a visible
    /// calendar month. Fetches are issued in chunks of
    /// [`DAY_QUERY_CONCURRENCY`]; each day's result is independent.
    pub async fn range_bookability(
        &self,
        org_id: &str,
        doctor_id: &str,
        schedule: &DoctorSchedule,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayBookability>, SchedulingError> {
        if from > to {
            return Err(SchedulingError::InvalidDateRange {
                from: DayKey::new(from).to_string(),
                to: DayKey::new(to).to_string(),
            });
        }

        let mut day_keys = Vec::new();
        let mut current = from;
        while current <= to {
            day_keys.push(DayKey::new(current));
            current += Duration::days(1);
        }

        debug!(
            "Evaluating bookability for {} days ({} per batch)",
            day_keys.len(),
            DAY_QUERY_CONCURRENCY
        );

        let mut results = Vec::with_capacity(day_keys.len());
        for chunk in day_keys.chunks(DAY_QUERY_CONCURRENCY) {
            let batch = chunk
                .iter()
                .map(|day_key| self.day_bookability(org_id, doctor_id, schedule, *day_key));
            results.extend(join_all(batch).await);
        }

        Ok(results)
    }

    /// Whether `day_key` is the current date in the doctor's timezone, in
    /// which case callers must drop already-started slots before offering
    /// them (the generator itself is day-granular).
    pub fn is_today(&self, schedule: &DoctorSchedule, day_key: DayKey, now: DateTime<Utc>) -> bool {
        let tz: chrono_tz::Tz = schedule
            .timezone
            .parse()
            .unwrap_or(chrono_tz::America::Lima);
        now.with_timezone(&tz).date_naive() == day_key.date()
    }
}

/// Extract busy ranges from either response shape the store has used over
/// time: a bare array, or an object wrapping a `busy_ranges` array. Entries
/// with unparseable instants are dropped.
pub fn parse_busy_ranges(raw: &Value) -> Vec<BusyRange> {
    let entries = if let Some(items) = raw.as_array() {
        items.as_slice()
    } else if let Some(items) = raw.get("busy_ranges").and_then(Value::as_array) {
        items.as_slice()
    } else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<BusyRange>(entry.clone()) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!("Dropping malformed busy range {}: {}", entry, e);
                None
            }
        })
        .collect()
}
