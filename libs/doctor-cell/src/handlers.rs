use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
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
    BulkGenerateRequest, ClearScope, CreateDoctorRequest, DoctorError,
    SetDateOverrideRequest, SetRecurringAvailabilityRequest, UpdateDoctorRequest,
};
use crate::services::{
    availability::AvailabilityService,
    doctor::DoctorService,
};

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
            DoctorError::Validation(msg) => AppError::ValidationError(msg),
            DoctorError::ReferenceIntegrity(report) => AppError::Conflict(format!(
                "Reference cleanup failed for: {}",
                report.failed_tables()
            )),
            DoctorError::Gateway(msg) => AppError::Database(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub date: Option<NaiveDate>,
    pub day_of_week: Option<i16>,
}

// ==============================================================================
// DOCTOR REGISTRY
// ==============================================================================

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctor = service.create_doctor(request, auth.token()).await?;

    Ok(Json(json!({ "doctor": doctor })))
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctors = service.list_doctors(auth.token()).await?;

    let total = doctors.len();
    Ok(Json(json!({
        "doctors": doctors,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let doctor = service.get_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!({ "doctor": doctor })))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let (doctor, cascade) = service.update_doctor(doctor_id, request, auth.token()).await?;

    Ok(Json(json!({
        "doctor": doctor,
        "cascade": cascade
    })))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let cascade = service.delete_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!({
        "deleted": true,
        "cascade": cascade
    })))
}

#[axum::debug_handler]
pub async fn list_specializations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&state);
    let specializations = service.list_specializations(auth.token()).await?;

    Ok(Json(json!({ "specializations": specializations })))
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn set_recurring_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<SetRecurringAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let slot = service
        .set_recurring_availability(doctor_id, request, auth.token())
        .await?;

    Ok(Json(json!({ "slot": slot })))
}

#[axum::debug_handler]
pub async fn set_date_override(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<SetDateOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let slot = service
        .set_date_override(doctor_id, request, Utc::now().date_naive(), auth.token())
        .await?;

    Ok(Json(json!({ "slot": slot })))
}

#[axum::debug_handler]
pub async fn bulk_generate_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<BulkGenerateRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let slots = service
        .bulk_generate_from_pattern(doctor_id, request, Utc::now().date_naive(), auth.token())
        .await?;

    let generated = slots.len();
    Ok(Json(json!({
        "slots": slots,
        "generated": generated
    })))
}

#[axum::debug_handler]
pub async fn get_month_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let days = service
        .get_availability_for_month(doctor_id, query.year, query.month, auth.token())
        .await?;

    Ok(Json(json!({ "days": days })))
}

#[axum::debug_handler]
pub async fn get_day_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let slots = service
        .lookup_availability(doctor_id, query.date, auth.token())
        .await?;

    let available = !slots.is_empty();
    Ok(Json(json!({
        "date": query.date,
        "slots": slots,
        "available": available
    })))
}

#[axum::debug_handler]
pub async fn clear_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = match (query.date, query.day_of_week) {
        (Some(date), None) => ClearScope::Date(date),
        (None, Some(day_of_week)) => ClearScope::Weekday(day_of_week),
        _ => {
            return Err(AppError::BadRequest(
                "Provide exactly one of date or day_of_week".to_string(),
            ))
        }
    };

    let service = AvailabilityService::new(&state);
    service.clear_availability(doctor_id, scope, auth.token()).await?;

    Ok(Json(json!({ "cleared": true })))
}
