use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::error::SchedulingError;
use crate::models::{DayBookability, DayKey, EvaluatedSlot, DEFAULT_SLOT_INTERVAL_MINUTES};
use crate::services::availability::evaluate_slot;
use crate::services::calendar::CalendarAvailabilityService;
use crate::services::slots::{generate_slots, upcoming_slots};

#[derive(Debug, Deserialize)]
pub struct DaySlotsQuery {
    pub org_id: String,
    pub date: String, // DD-MM-YYYY
    pub interval_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DayRangeQuery {
    pub org_id: String,
    pub from: String, // DD-MM-YYYY
    pub to: String,   // DD-MM-YYYY
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub org_id: String,
}

/// Slots for one day, each with its evaluated availability. For the current
/// date (in the doctor's timezone) already-started slots are dropped before
/// evaluation.
#[axum::debug_handler]
pub async fn get_day_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DaySlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let day_key: DayKey = query
        .date
        .parse()
        .map_err(|e: SchedulingError| AppError::BadRequest(e.to_string()))?;

    let service = CalendarAvailabilityService::new(&state);
    let normalized = service
        .fetch_doctor_schedule(&query.org_id, &doctor_id)
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;
    let schedule = normalized.schedule;

    if !schedule.has_schedule() {
        return Ok(Json(json!({
            "day_key": day_key,
            "timezone": schedule.timezone,
            "degraded": false,
            "slots": [],
            "total": 0
        })));
    }

    let interval = query
        .interval_minutes
        .unwrap_or(DEFAULT_SLOT_INTERVAL_MINUTES);
    let mut slots = generate_slots(day_key.date(), &schedule, interval);

    let now = Utc::now();
    if service.is_today(&schedule, day_key, now) {
        slots = upcoming_slots(slots, now);
    }

    let (busy_ranges, degraded) = match service
        .fetch_busy_ranges(&query.org_id, &doctor_id, day_key)
        .await
    {
        Ok(busy_ranges) => (busy_ranges, false),
        Err(e) => {
            warn!(
                "Busy-range fetch failed for {} on {}, serving schedule-only slots: {}",
                doctor_id, day_key, e
            );
            (Vec::new(), true)
        }
    };

    let policy = schedule.policy();
    let evaluated: Vec<EvaluatedSlot> = slots
        .into_iter()
        .map(|slot| {
            let availability = evaluate_slot(&slot, &busy_ranges, &policy);
            EvaluatedSlot {
                slot,
                available: availability.available,
                occupied_count: availability.occupied_count,
                capacity: availability.capacity,
            }
        })
        .collect();

    Ok(Json(json!({
        "day_key": day_key,
        "timezone": schedule.timezone,
        "degraded": degraded,
        "total": evaluated.len(),
        "slots": evaluated
    })))
}

/// Per-day bookability over an inclusive date range, for calendar-level
/// availability highlighting.
#[axum::debug_handler]
pub async fn get_day_bookability_range(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DayRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let from: DayKey = query
        .from
        .parse()
        .map_err(|e: SchedulingError| AppError::BadRequest(e.to_string()))?;
    let to: DayKey = query
        .to
        .parse()
        .map_err(|e: SchedulingError| AppError::BadRequest(e.to_string()))?;

    let service = CalendarAvailabilityService::new(&state);
    let normalized = service
        .fetch_doctor_schedule(&query.org_id, &doctor_id)
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;
    let schedule = normalized.schedule;

    let days = if schedule.has_schedule() {
        service
            .range_bookability(&query.org_id, &doctor_id, &schedule, from.date(), to.date())
            .await
            .map_err(|e| match e {
                SchedulingError::InvalidDateRange { .. } => AppError::BadRequest(e.to_string()),
                _ => AppError::ExternalService(e.to_string()),
            })?
    } else {
        // No schedule configured: every day is a normal "no slots" answer,
        // no busy-range fetches needed.
        if from.date() > to.date() {
            return Err(AppError::BadRequest(
                SchedulingError::InvalidDateRange {
                    from: from.to_string(),
                    to: to.to_string(),
                }
                .to_string(),
            ));
        }
        let mut days = Vec::new();
        let mut current = from.date();
        while current <= to.date() {
            days.push(DayBookability {
                day_key: DayKey::new(current),
                has_slots: false,
                degraded: false,
            });
            current += chrono::Duration::days(1);
        }
        days
    };

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "total": days.len(),
        "days": days
    })))
}

/// The normalized schedule plus the merge diagnostics, mostly for admin
/// tooling and debugging partial configurations.
#[axum::debug_handler]
pub async fn get_doctor_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let service = CalendarAvailabilityService::new(&state);
    let normalized = service
        .fetch_doctor_schedule(&query.org_id, &doctor_id)
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "schedule": normalized.schedule,
        "stats": normalized.stats
    })))
}
