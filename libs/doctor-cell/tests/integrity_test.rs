// libs/doctor-cell/tests/integrity_test.rs
use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{DoctorError, UpdateDoctorRequest};
use doctor_cell::services::doctor::DoctorService;
use doctor_cell::services::integrity::ReferenceIntegrityService;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

const TOKEN: &str = "test-token";

fn config_for(server: &MockServer) -> AppConfig {
    TestConfig::with_supabase_url(&server.uri()).to_app_config()
}

fn clinic_id() -> String {
    TestConfig::default().clinic_id
}

fn doctor_row(id: Uuid, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "clinic_id": clinic_id(),
        "name": name,
        "specialization_id": null
    })
}

#[tokio::test]
async fn rename_cascade_rewrites_legacy_name_references() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_name", "eq.Smith"))
        .and(body_partial_json(json!({ "doctor_name": "Jones" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4(), "doctor_name": "Jones" },
            { "id": Uuid::new_v4(), "doctor_name": "Jones" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = ReferenceIntegrityService::new(&config);

    let report = service
        .propagate_doctor_change(doctor_id, "Smith", Some("Jones"), TOKEN)
        .await;

    assert!(report.is_clean());
    assert_eq!(report.updated, vec!["appointments".to_string()]);
}

#[tokio::test]
async fn deletion_cascade_assigns_the_unknown_sentinel() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_name", "eq.Smith"))
        .and(body_partial_json(json!({ "doctor_name": "Unknown" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(body_partial_json(json!({ "doctor_name": "Unknown" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = ReferenceIntegrityService::new(&config);

    let report = service
        .propagate_doctor_change(doctor_id, "Smith", None, TOKEN)
        .await;

    assert!(report.is_clean());
    assert_eq!(report.updated.len(), 2);
}

#[tokio::test]
async fn doctor_rename_runs_the_cascade() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row(doctor_id, "Smith")])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row(doctor_id, "Jones")])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_name", "eq.Smith"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = DoctorService::new(&config);

    let (doctor, cascade) = service
        .update_doctor(
            doctor_id,
            UpdateDoctorRequest {
                name: "Jones".to_string(),
                specialization_id: None,
            },
            TOKEN,
        )
        .await
        .expect("rename should succeed");

    assert_eq!(doctor.name, "Jones");
    assert!(cascade.is_clean());
}

#[tokio::test]
async fn failed_cascade_aborts_the_doctor_deletion() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row(doctor_id, "Smith")])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .mount(&server)
        .await;

    // The doctor row must survive a failed reference cleanup.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = DoctorService::new(&config);

    let result = service.delete_doctor(doctor_id, TOKEN).await;

    assert_matches!(result, Err(DoctorError::ReferenceIntegrity(report)) if !report.is_clean());
}

#[tokio::test]
async fn clean_cascade_is_followed_by_the_doctor_delete() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row(doctor_id, "Smith")])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = DoctorService::new(&config);

    let report = service
        .delete_doctor(doctor_id, TOKEN)
        .await
        .expect("delete should succeed");

    assert!(report.is_clean());
}
