use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::PatientError;
use crate::services::patient::PatientService;

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
            PatientError::Gateway(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&state);
    let patient = service.get_patient(patient_id, auth.token()).await?;

    Ok(Json(json!({ "patient": patient })))
}
