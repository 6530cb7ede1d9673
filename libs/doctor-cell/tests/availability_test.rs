// libs/doctor-cell/tests/availability_test.rs
use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{DoctorError, SetDateOverrideRequest, BulkGenerateRequest};
use doctor_cell::services::availability::{
    expand_pattern, iso_weekday, last_day_of_month, AvailabilityService,
};
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

const TOKEN: &str = "test-token";

fn config_for(server: &MockServer) -> AppConfig {
    TestConfig::with_supabase_url(&server.uri()).to_app_config()
}

fn date(s: &str) -> NaiveDate {
    s.parse().expect("valid date")
}

fn time(s: &str) -> NaiveTime {
    s.parse().expect("valid time")
}

fn slot_row(
    doctor_id: Uuid,
    day_of_week: i16,
    start: &str,
    end: &str,
    slot_date: Option<&str>,
) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "day_of_week": day_of_week,
        "start_time": start,
        "end_time": end,
        "date": slot_date,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

// ==============================================================================
// PATTERN EXPANSION (pure)
// ==============================================================================

#[test]
fn expand_pattern_covers_every_monday_through_second_future_month() {
    // Fixed "today": Wednesday 2031-03-05.
    let today = date("2031-03-05");
    let mondays = expand_pattern(today, 1, 2);

    assert_eq!(mondays.len(), 12);
    assert_eq!(mondays.first(), Some(&date("2031-03-10")));
    assert_eq!(mondays.last(), Some(&date("2031-05-26")));
    assert!(mondays.iter().all(|d| iso_weekday(*d) == 1));
}

#[test]
fn expand_pattern_zero_months_stays_inside_current_week() {
    // Wednesday; the remaining week has no Monday left.
    let today = date("2031-03-05");
    assert!(expand_pattern(today, 1, 0).is_empty());

    // Friday of the same week is still ahead.
    assert_eq!(expand_pattern(today, 5, 0), vec![date("2031-03-07")]);

    // A Monday "today" includes itself.
    assert_eq!(expand_pattern(date("2031-03-03"), 1, 0), vec![date("2031-03-03")]);
}

#[test]
fn last_day_of_month_handles_length_and_year_boundaries() {
    assert_eq!(last_day_of_month(date("2031-02-11")), date("2031-02-28"));
    assert_eq!(last_day_of_month(date("2032-02-01")), date("2032-02-29"));
    assert_eq!(last_day_of_month(date("2031-12-05")), date("2031-12-31"));
}

// ==============================================================================
// ENGINE OPERATIONS (mocked gateway)
// ==============================================================================

#[tokio::test]
async fn bulk_generate_replaces_and_inserts_one_row_per_occurrence() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let today = date("2031-03-05");

    let inserted: Vec<serde_json::Value> = expand_pattern(today, 1, 2)
        .iter()
        .map(|d| slot_row(doctor_id, 1, "09:00:00", "12:00:00", Some(&d.to_string())))
        .collect();

    // Pre-existing rows at the generated dates are fully replaced.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("start_time", "eq.09:00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(inserted)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AvailabilityService::new(&config);

    let slots = service
        .bulk_generate_from_pattern(
            doctor_id,
            BulkGenerateRequest {
                day_of_week: 1,
                start_time: time("09:00"),
                end_time: time("12:00"),
                repeat_months: 2,
            },
            today,
            TOKEN,
        )
        .await
        .expect("bulk generate should succeed");

    assert_eq!(slots.len(), 12);
    assert!(slots.iter().all(|s| s.day_of_week == 1));
    assert!(slots.iter().all(|s| s.date.is_some()));
    assert_eq!(slots.first().and_then(|s| s.date), Some(date("2031-03-10")));
    assert_eq!(slots.last().and_then(|s| s.date), Some(date("2031-05-26")));
}

#[tokio::test]
async fn date_override_wins_over_recurring_slot() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let lookup_date = date("2031-03-10"); // a Monday

    // Date-specific row exists with a different window than the weekly one.
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("date", format!("eq.{}", lookup_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(doctor_id, 1, "14:00:00", "17:00:00", Some("2031-03-10"))
        ])))
        .mount(&server)
        .await;

    // The recurring fallback must not be consulted when an override exists.
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("date", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(doctor_id, 1, "09:00:00", "12:00:00", None)
        ])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AvailabilityService::new(&config);

    let slots = service
        .lookup_availability(doctor_id, lookup_date, TOKEN)
        .await
        .expect("lookup should succeed");

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].date, Some(lookup_date));
    assert_eq!(slots[0].start_time, time("14:00"));
}

#[tokio::test]
async fn recurring_slot_answers_when_no_override_exists() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let lookup_date = date("2031-03-10"); // a Monday

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("date", format!("eq.{}", lookup_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("date", "is.null"))
        .and(query_param("day_of_week", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(doctor_id, 1, "09:00:00", "12:00:00", None)
        ])))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AvailabilityService::new(&config);

    let slots = service
        .lookup_availability(doctor_id, lookup_date, TOKEN)
        .await
        .expect("lookup should succeed");

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].date, None);
    assert_eq!(slots[0].time_label(), "09:00 - 12:00");
}

#[tokio::test]
async fn override_set_then_unset_leaves_no_slot_row() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let override_date = date("2031-03-10");
    let today = date("2031-03-05");

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("date", format!("eq.{}", override_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            slot_row(doctor_id, 1, "09:00:00", "12:00:00", Some("2031-03-10"))
        ])))
        .expect(1)
        .mount(&server)
        .await;

    // Unsetting deletes the exact (doctor, date, start_time) row instead of
    // storing a negative record.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("date", format!("eq.{}", override_date)))
        .and(query_param("start_time", "eq.09:00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AvailabilityService::new(&config);

    let request = SetDateOverrideRequest {
        date: override_date,
        start_time: time("09:00"),
        end_time: time("12:00"),
        is_available: true,
    };
    let stored = service
        .set_date_override(doctor_id, request.clone(), today, TOKEN)
        .await
        .expect("setting the override should succeed");
    assert!(stored.is_some());

    let removed = service
        .set_date_override(
            doctor_id,
            SetDateOverrideRequest {
                is_available: false,
                ..request
            },
            today,
            TOKEN,
        )
        .await
        .expect("unsetting the override should succeed");

    assert!(removed.is_none());
}

#[tokio::test]
async fn past_date_override_is_rejected() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    let config = config_for(&server);
    let service = AvailabilityService::new(&config);

    let result = service
        .set_date_override(
            doctor_id,
            SetDateOverrideRequest {
                date: date("2031-03-01"),
                start_time: time("09:00"),
                end_time: time("12:00"),
                is_available: true,
            },
            date("2031-03-05"),
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(DoctorError::Validation(_)));
}

#[tokio::test]
async fn inverted_time_range_is_rejected() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    let config = config_for(&server);
    let service = AvailabilityService::new(&config);

    let result = service
        .set_date_override(
            doctor_id,
            SetDateOverrideRequest {
                date: date("2031-03-10"),
                start_time: time("12:00"),
                end_time: time("09:00"),
                is_available: true,
            },
            date("2031-03-05"),
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(DoctorError::Validation(_)));
}
