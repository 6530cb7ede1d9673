use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentStatus, ApproveAppointmentRequest, BillingPatch,
    BillingStatus, CompleteAppointmentRequest, CompletedFilter, BillingInput,
    PrescriptionInput,
};
use crate::services::{
    manager::AppointmentManagerService,
    refresh::RefreshCoordinator,
    reporting::AppointmentReportingService,
};

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AppointmentError::DoctorNotAvailable => {
                AppError::ValidationError("Doctor not available at the requested time".to_string())
            }
            AppointmentError::InvalidStatusTransition(status) => AppError::Conflict(format!(
                "Appointment cannot be modified in current status: {}",
                status
            )),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::AmbiguousBilling => {
                AppError::Conflict("Multiple billing records found for appointment".to_string())
            }
            AppointmentError::CompletionStep { step, message } => {
                AppError::Database(format!("Completion step '{}' failed: {}", step, message))
            }
            AppointmentError::Gateway(msg) => AppError::Database(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SortQuery {
    /// "asc" for oldest-first; anything else (or absent) is newest-first.
    pub order: Option<String>,
}

impl SortQuery {
    fn newest_first(&self) -> bool {
        self.order.as_deref() != Some("asc")
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletedQuery {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub doctor: Option<String>,
    pub gender: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub date: Option<NaiveDate>,
    pub doctor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: i32,
    pub month: u32,
    pub doctor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBillingStatusRequest {
    pub status: BillingStatus,
}

#[derive(Debug, Deserialize)]
pub struct SuppressRefreshRequest {
    pub suppressed: bool,
}

// ==============================================================================
// LIST VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_requests(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SortQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentReportingService::new(&state);
    let appointments = service.list_pending(query.newest_first(), auth.token()).await?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn list_accommodated(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SortQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentReportingService::new(&state);
    let appointments = service.list_approved(query.newest_first(), auth.token()).await?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn list_completed(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<CompletedQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentReportingService::new(&state);
    let filter = CompletedFilter {
        status: query.status,
        date: query.date,
        doctor_name: query.doctor,
        gender: query.gender,
        search: query.search,
    };
    let appointments = service.list_completed(filter, auth.token()).await?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let appointment = service.get_appointment(appointment_id, auth.token()).await?;

    Ok(Json(json!({ "appointment": appointment })))
}

// ==============================================================================
// LIFECYCLE TRANSITIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn approve_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(refresh): Extension<Arc<RefreshCoordinator>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ApproveAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let appointment = service
        .approve(appointment_id, request, Utc::now(), auth.token())
        .await?;

    refresh.signal();

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn decline_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(refresh): Extension<Arc<RefreshCoordinator>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let appointment = service
        .decline(appointment_id, Utc::now(), auth.token())
        .await?;

    refresh.signal();

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(refresh): Extension<Arc<RefreshCoordinator>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let appointment = service
        .complete(appointment_id, request, Utc::now(), auth.token())
        .await?;

    refresh.signal();

    Ok(Json(json!({ "appointment": appointment })))
}

// ==============================================================================
// SIDE-EFFECT RECORDS
// ==============================================================================

#[axum::debug_handler]
pub async fn save_draft_prescription(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(input): Json<PrescriptionInput>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let prescription = service
        .save_draft_prescription(appointment_id, input, Utc::now(), auth.token())
        .await?;

    Ok(Json(json!({ "prescription": prescription })))
}

#[axum::debug_handler]
pub async fn save_draft_billing(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(input): Json<BillingInput>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let billing = service
        .save_draft_billing(appointment_id, input, Utc::now(), auth.token())
        .await?;

    Ok(Json(json!({ "billing": billing })))
}

#[axum::debug_handler]
pub async fn update_billing_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateBillingStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let billing = service
        .update_billing_status(appointment_id, request.status, auth.token())
        .await?;

    Ok(Json(json!({
        "billing": billing,
        "updated": billing.is_some()
    })))
}

#[axum::debug_handler]
pub async fn update_billing_field(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(patch): Json<BillingPatch>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentManagerService::new(&state);
    let billing = service
        .update_billing_field(appointment_id, patch, auth.token())
        .await?;

    Ok(Json(json!({
        "billing": billing,
        "updated": billing.is_some()
    })))
}

// ==============================================================================
// REPORTS & CALENDAR
// ==============================================================================

#[axum::debug_handler]
pub async fn daily_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentReportingService::new(&state);
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let stats = service
        .daily_stats(date, query.doctor.as_deref(), auth.token())
        .await?;

    Ok(Json(json!({ "stats": stats })))
}

#[axum::debug_handler]
pub async fn doctor_reports(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentReportingService::new(&state);
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let reports = service.doctor_daily_reports(date, auth.token()).await?;

    Ok(Json(json!({ "reports": reports })))
}

#[axum::debug_handler]
pub async fn calendar_month(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentReportingService::new(&state);
    let appointments = service
        .month_appointments(query.year, query.month, query.doctor.as_deref(), auth.token())
        .await?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

// ==============================================================================
// BACKGROUND REFRESH
// ==============================================================================

#[axum::debug_handler]
pub async fn set_refresh_suppressed(
    Extension(refresh): Extension<Arc<RefreshCoordinator>>,
    Json(request): Json<SuppressRefreshRequest>,
) -> Result<Json<Value>, AppError> {
    refresh.set_suppressed(request.suppressed);

    Ok(Json(json!({ "suppressed": request.suppressed })))
}

#[axum::debug_handler]
pub async fn refresh_state(
    Extension(refresh): Extension<Arc<RefreshCoordinator>>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(json!({
        "generation": refresh.generation(),
        "suppressed": refresh.is_suppressed()
    })))
}
