// libs/scheduling-cell/tests/calendar_query_test.rs
//
// Integration tests for the day bookability query against a mocked
// booking-store endpoint.

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::error::SchedulingError;
use scheduling_cell::models::DayKey;
use scheduling_cell::services::calendar::CalendarAvailabilityService;
use shared_config::AppConfig;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

struct TestSetup {
    service: CalendarAvailabilityService,
    mock_server: MockServer,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;

        let config = AppConfig {
            doctoc_base_url: mock_server.uri(),
            doctoc_api_token: "test-token".to_string(),
            default_timezone: "America/Lima".to_string(),
        };
        let service = CalendarAvailabilityService::new(&config);

        Self {
            service,
            mock_server,
        }
    }

    /// Calendar config with one weekly Monday block 10:00-11:00 in Lima.
    fn calendar_info() -> serde_json::Value {
        json!({
            "calendarInfo": {
                "timezone": "America/Lima",
                "overschedule": false,
                "horarios": {
                    "presencial": {
                        "general": {
                            "horariesFijo": {
                                "Monday": [
                                    { "id": 1, "start": "10:00", "end": "11:00" }
                                ]
                            }
                        }
                    }
                }
            }
        })
    }

    async fn mock_user_info(&self) {
        Mock::given(method("POST"))
            .and(path("/manageUserInfoAPIV2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Self::calendar_info()))
            .mount(&self.mock_server)
            .await;
    }

    async fn mock_busy_ranges(&self, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/getDayQuotesAPIV2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.mock_server)
            .await;
    }
}

// 2025-06-16 is a Monday; Lima is UTC-5, so the 10:00 local slot is 15:00Z.
fn monday_key() -> DayKey {
    "16-06-2025".parse().unwrap()
}

// ==============================================================================
// SCHEDULE FETCH + NORMALIZATION
// ==============================================================================

#[tokio::test]
async fn fetches_and_normalizes_doctor_schedule() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .expect("schedule fetch should succeed");

    let weekly = normalized.schedule.weekly.expect("weekly schedule");
    assert_eq!(weekly.monday.len(), 1);
    assert_eq!(weekly.monday[0].start, "10:00");
    assert_eq!(normalized.schedule.timezone, "America/Lima");
    assert!(normalized.stats.is_clean());
}

#[tokio::test]
async fn missing_calendar_info_yields_unconfigured_schedule() {
    let setup = TestSetup::new().await;
    Mock::given(method("POST"))
        .and(path("/manageUserInfoAPIV2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&setup.mock_server)
        .await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .expect("schedule fetch should succeed");

    assert!(!normalized.schedule.has_schedule());
}

#[tokio::test]
async fn schedule_fetch_failure_is_an_error() {
    let setup = TestSetup::new().await;
    Mock::given(method("POST"))
        .and(path("/manageUserInfoAPIV2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&setup.mock_server)
        .await;

    let result = setup.service.fetch_doctor_schedule("org-1", "doctor-1").await;
    assert!(result.is_err());
}

// ==============================================================================
// BUSY-RANGE FETCH
// ==============================================================================

#[tokio::test]
async fn accepts_wrapped_busy_range_response() {
    let setup = TestSetup::new().await;
    setup
        .mock_busy_ranges(json!({
            "status": "ok",
            "busy_ranges": [
                { "start": "2025-06-16T15:00:00Z", "end": "2025-06-16T15:30:00Z" }
            ]
        }))
        .await;

    let ranges = setup
        .service
        .fetch_busy_ranges("org-1", "doctor-1", monday_key())
        .await
        .expect("busy-range fetch should succeed");

    assert_eq!(ranges.len(), 1);
}

#[tokio::test]
async fn accepts_bare_array_busy_range_response() {
    let setup = TestSetup::new().await;
    setup
        .mock_busy_ranges(json!([
            { "start": "2025-06-16T15:00:00Z", "end": "2025-06-16T15:30:00Z" },
            { "start": "2025-06-16T15:30:00Z", "end": "2025-06-16T16:00:00Z" }
        ]))
        .await;

    let ranges = setup
        .service
        .fetch_busy_ranges("org-1", "doctor-1", monday_key())
        .await
        .expect("busy-range fetch should succeed");

    assert_eq!(ranges.len(), 2);
}

// ==============================================================================
// DAY BOOKABILITY
// ==============================================================================

#[tokio::test]
async fn day_with_free_slot_is_bookable() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;
    // First slot is taken, second is free.
    setup
        .mock_busy_ranges(json!([
            { "start": "2025-06-16T15:00:00Z", "end": "2025-06-16T15:30:00Z" }
        ]))
        .await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .unwrap();

    let result = setup
        .service
        .day_bookability("org-1", "doctor-1", &normalized.schedule, monday_key())
        .await;

    assert!(result.has_slots);
    assert!(!result.degraded);
}

#[tokio::test]
async fn fully_booked_day_is_not_bookable() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;
    setup
        .mock_busy_ranges(json!([
            { "start": "2025-06-16T15:00:00Z", "end": "2025-06-16T15:30:00Z" },
            { "start": "2025-06-16T15:30:00Z", "end": "2025-06-16T16:00:00Z" }
        ]))
        .await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .unwrap();

    let result = setup
        .service
        .day_bookability("org-1", "doctor-1", &normalized.schedule, monday_key())
        .await;

    assert!(!result.has_slots);
    assert!(!result.degraded);
}

#[tokio::test]
async fn non_working_day_is_not_bookable() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;
    setup.mock_busy_ranges(json!([])).await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .unwrap();

    // 17-06-2025 is a Tuesday; only Monday is scheduled.
    let result = setup
        .service
        .day_bookability(
            "org-1",
            "doctor-1",
            &normalized.schedule,
            "17-06-2025".parse().unwrap(),
        )
        .await;

    assert!(!result.has_slots);
}

#[tokio::test]
async fn fetch_failure_falls_back_to_schedule_only() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;
    Mock::given(method("POST"))
        .and(path("/getDayQuotesAPIV2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&setup.mock_server)
        .await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .unwrap();

    let result = setup
        .service
        .day_bookability("org-1", "doctor-1", &normalized.schedule, monday_key())
        .await;

    // The schedule says Monday has slots, so the day is shown as
    // (tentatively) available and flagged degraded.
    assert!(result.has_slots);
    assert!(result.degraded);
}

// ==============================================================================
// RANGE BOOKABILITY
// ==============================================================================

#[tokio::test]
async fn range_query_answers_every_day_independently() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;
    // Monday's first slot booked; everything else free.
    setup
        .mock_busy_ranges(json!([
            { "start": "2025-06-16T15:00:00Z", "end": "2025-06-16T15:30:00Z" }
        ]))
        .await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .unwrap();

    let from = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
    let to = NaiveDate::from_ymd_opt(2025, 6, 22).unwrap();
    let days = setup
        .service
        .range_bookability("org-1", "doctor-1", &normalized.schedule, from, to)
        .await
        .expect("range query should succeed");

    assert_eq!(days.len(), 7);
    // Results come back in day order regardless of batch completion order.
    assert_eq!(days[0].day_key, monday_key());
    // Only Monday is a working day, and it still has its 10:30 slot.
    assert!(days[0].has_slots);
    assert!(days[1..].iter().all(|d| !d.has_slots));

    // One busy-range request per day in the range.
    let requests = setup
        .mock_server
        .received_requests()
        .await
        .expect("request recording enabled");
    let busy_requests = requests
        .iter()
        .filter(|r| r.url.path() == "/getDayQuotesAPIV2")
        .count();
    assert_eq!(busy_requests, 7);
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let setup = TestSetup::new().await;
    setup.mock_user_info().await;

    let normalized = setup
        .service
        .fetch_doctor_schedule("org-1", "doctor-1")
        .await
        .unwrap();

    let from = NaiveDate::from_ymd_opt(2025, 6, 22).unwrap();
    let to = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
    let result = setup
        .service
        .range_bookability("org-1", "doctor-1", &normalized.schedule, from, to)
        .await;

    assert_matches!(result, Err(SchedulingError::InvalidDateRange { .. }));
}

#[tokio::test]
async fn busy_request_carries_day_key_and_doctor() {
    let setup = TestSetup::new().await;
    Mock::given(method("POST"))
        .and(path("/getDayQuotesAPIV2"))
        .and(body_partial_json(json!({
            "orgID": "org-1",
            "dayKey": "16-06-2025",
            "userId": "doctor-1",
            "format": "busy_ranges"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    let ranges = setup
        .service
        .fetch_busy_ranges("org-1", "doctor-1", monday_key())
        .await
        .expect("busy-range fetch should succeed");

    assert!(ranges.is_empty());
}
