// libs/appointment-cell/tests/manager_test.rs
// Wiremock stands in for the PostgREST persistence gateway.

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, ApproveAppointmentRequest, BillingInput,
    BillingPatch, BillingStatus, ClinicalNoteInput, CompleteAppointmentRequest,
    PrescriptionInput,
};
use appointment_cell::services::manager::AppointmentManagerService;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

const TOKEN: &str = "test-token";

fn config_for(server: &MockServer) -> AppConfig {
    TestConfig::with_supabase_url(&server.uri()).to_app_config()
}

fn clinic_id() -> String {
    TestConfig::default().clinic_id
}

fn appointment_row(
    id: Uuid,
    user_id: Uuid,
    status: &str,
    doctor_id: Option<Uuid>,
    doctor_name: Option<&str>,
) -> serde_json::Value {
    json!({
        "id": id,
        "clinic_id": clinic_id(),
        "user_id": user_id,
        "patient_name": "Maria Cruz",
        "patient_age": 34,
        "patient_identity": "self",
        "blood_type": "O+",
        "date": "2031-06-10",
        "time": "09:30:00",
        "reason": "Follow-up checkup",
        "specialization_id": null,
        "doctor_id": doctor_id,
        "doctor_name": doctor_name,
        "status": status,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn doctor_row(id: Uuid, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "clinic_id": clinic_id(),
        "name": name,
        "specialization_id": null
    })
}

fn billing_row(id: Uuid, appointment_id: Uuid, user_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "appointment_id": appointment_id,
        "clinic_id": clinic_id(),
        "user_id": user_id,
        "title": "Consultation fee",
        "amount": 500.0,
        "due_date": "2031-06-20",
        "status": status,
        "description": "Billing for service on 2031-06-10",
        "created_at": Utc::now().to_rfc3339()
    })
}

fn complete_request() -> CompleteAppointmentRequest {
    CompleteAppointmentRequest {
        prescription: PrescriptionInput {
            name: "Amoxicillin".to_string(),
            details: "500mg three times daily for 7 days".to_string(),
        },
        clinical_note: ClinicalNoteInput {
            content: "Patient recovering well, continue medication".to_string(),
        },
        billing: BillingInput {
            title: "Consultation fee".to_string(),
            amount: 500.0,
            due_date: "2031-06-20".parse().ok(),
            status: None,
        },
    }
}

async fn mount_appointment_fetch(server: &MockServer, row: serde_json::Value, id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(server)
        .await;
}

async fn mount_empty_availability(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn approve_resolves_doctor_by_name_and_stores_id() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "pending", None, Some("Smith")),
        appointment_id,
    ).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("name", "eq.Smith"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row(doctor_id, "Smith")])))
        .mount(&server)
        .await;

    mount_empty_availability(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, user_id, "approved", Some(doctor_id), Some("Smith"))
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let request = ApproveAppointmentRequest {
        doctor_id: None,
        doctor_name: Some("Smith".to_string()),
    };
    let appointment = service
        .approve(appointment_id, request, Utc::now(), TOKEN)
        .await
        .expect("approve should succeed");

    assert_eq!(appointment.status, AppointmentStatus::Approved);
    assert_eq!(appointment.doctor_id, Some(doctor_id));
}

#[tokio::test]
async fn approve_is_rejected_once_declined() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "declined", None, Some("Smith")),
        appointment_id,
    ).await;

    // No write may be attempted from a terminal status.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let request = ApproveAppointmentRequest {
        doctor_id: None,
        doctor_name: Some("Smith".to_string()),
    };
    let result = service
        .approve(appointment_id, request, Utc::now(), TOKEN)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Declined))
    );
}

#[tokio::test]
async fn approve_fails_when_doctor_name_does_not_resolve() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "pending", None, Some("Nobody")),
        appointment_id,
    ).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let request = ApproveAppointmentRequest {
        doctor_id: None,
        doctor_name: Some("Nobody".to_string()),
    };
    let result = service
        .approve(appointment_id, request, Utc::now(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::DoctorNotFound));
}

#[tokio::test]
async fn decline_requires_pending_status() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "approved", None, None),
        appointment_id,
    ).await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let result = service.decline(appointment_id, Utc::now(), TOKEN).await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Approved))
    );
}

#[tokio::test]
async fn complete_with_missing_fields_fails_and_writes_nothing() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "approved", Some(doctor_id), Some("Smith")),
        appointment_id,
    ).await;

    // Validation must reject before any side-effect write or status flip.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let mut request = complete_request();
    request.prescription.name = String::new();
    request.billing.amount = 0.0;

    let result = service
        .complete(appointment_id, request, Utc::now(), TOKEN)
        .await;

    match result {
        Err(AppointmentError::Validation(msg)) => {
            assert!(msg.contains("prescription.name"));
            assert!(msg.contains("billing.amount"));
        }
        other => panic!("Expected validation error, got {:?}", other.map(|a| a.status)),
    }
}

#[tokio::test]
async fn complete_flips_status_only_after_side_effects_land() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "approved", Some(doctor_id), Some("Smith")),
        appointment_id,
    ).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("select", "user_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "user_id": account_id }])))
        .mount(&server)
        .await;

    for table in ["doctor_notes", "prescriptions", "billings"] {
        Mock::given(method("POST"))
            .and(path(format!("/rest/v1/{}", table)))
            .and(query_param("on_conflict", "appointment_id"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "ok": true }])))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, user_id, "completed", Some(doctor_id), Some("Smith"))
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let appointment = service
        .complete(appointment_id, complete_request(), Utc::now(), TOKEN)
        .await
        .expect("complete should succeed");

    assert_eq!(appointment.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn complete_names_the_failed_step_and_leaves_status_alone() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mount_appointment_fetch(
        &server,
        appointment_row(appointment_id, user_id, "approved", Some(doctor_id), Some("Smith")),
        appointment_id,
    ).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("select", "user_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "user_id": account_id }])))
        .mount(&server)
        .await;

    for table in ["doctor_notes", "prescriptions"] {
        Mock::given(method("POST"))
            .and(path(format!("/rest/v1/{}", table)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "ok": true }])))
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/rest/v1/billings"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .mount(&server)
        .await;

    // The status flip must never run when a side-effect write failed.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let result = service
        .complete(appointment_id, complete_request(), Utc::now(), TOKEN)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::CompletionStep { step: "billing", .. })
    );
}

#[tokio::test]
async fn update_billing_status_without_billing_row_is_a_noop() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/billings"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/billings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let result = service
        .update_billing_status(appointment_id, BillingStatus::Paid, TOKEN)
        .await
        .expect("no-op should be success");

    assert!(result.is_none());
}

#[tokio::test]
async fn update_billing_field_rejects_duplicate_billing_rows() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/billings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            billing_row(Uuid::new_v4(), appointment_id, user_id, "unpaid"),
            billing_row(Uuid::new_v4(), appointment_id, user_id, "unpaid"),
        ])))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let result = service
        .update_billing_field(appointment_id, BillingPatch::Amount(750.0), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::AmbiguousBilling));
}

#[tokio::test]
async fn update_billing_status_patches_the_single_row() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let billing_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/billings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            billing_row(billing_id, appointment_id, user_id, "unpaid")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/billings"))
        .and(query_param("id", format!("eq.{}", billing_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            billing_row(billing_id, appointment_id, user_id, "paid")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let service = AppointmentManagerService::new(&config);

    let billing = service
        .update_billing_status(appointment_id, BillingStatus::Paid, TOKEN)
        .await
        .expect("update should succeed")
        .expect("row should be returned");

    assert_eq!(billing.status, BillingStatus::Paid);
}
