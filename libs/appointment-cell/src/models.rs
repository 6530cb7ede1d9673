// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    /// Requesting account. The patient profile on the appointment may
    /// describe someone else (a relative booking on their behalf).
    pub user_id: Uuid,
    pub patient_name: Option<String>,
    pub patient_age: Option<i32>,
    /// Relation of the treated person to the requester ("self", "child", ...).
    pub patient_identity: Option<String>,
    pub blood_type: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: Option<String>,
    pub specialization_id: Option<Uuid>,
    /// Canonical doctor reference.
    pub doctor_id: Option<Uuid>,
    /// Legacy denormalized doctor reference, kept in sync for installations
    /// that still query by name.
    pub doctor_name: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Declined,
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Declined | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Approved => write!(f, "approved"),
            AppointmentStatus::Declined => write!(f, "declined"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Doctor reference as supplied by a caller: id is canonical, name is the
/// legacy compatibility path resolved through a clinic-scoped lookup.
#[derive(Debug, Clone)]
pub enum DoctorRef {
    Id(Uuid),
    Name(String),
}

// ==============================================================================
// SIDE-EFFECT RECORDS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    pub user_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub name: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Billing {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub amount: f64,
    pub due_date: Option<NaiveDate>,
    pub status: BillingStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorNote {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub clinic_id: Uuid,
    /// Account id of the requester, resolved through the patient profile's
    /// owning-user reference.
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Unpaid,
    Paid,
    Partial,
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingStatus::Unpaid => write!(f, "unpaid"),
            BillingStatus::Paid => write!(f, "paid"),
            BillingStatus::Partial => write!(f, "partial"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub doctor_name: Option<String>,
}

impl ApproveAppointmentRequest {
    pub fn doctor_ref(&self) -> Option<DoctorRef> {
        if let Some(id) = self.doctor_id {
            Some(DoctorRef::Id(id))
        } else {
            self.doctor_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| DoctorRef::Name(name.to_string()))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionInput {
    pub name: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingInput {
    pub title: String,
    pub amount: f64,
    pub due_date: Option<NaiveDate>,
    pub status: Option<BillingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNoteInput {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub prescription: PrescriptionInput,
    pub clinical_note: ClinicalNoteInput,
    pub billing: BillingInput,
}

/// One mutable billing field. Billing rows stay editable after creation
/// without touching the owning appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "value")]
pub enum BillingPatch {
    Title(String),
    Amount(f64),
    DueDate(NaiveDate),
}

// ==============================================================================
// QUERY / REPORTING MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletedFilter {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub doctor_name: Option<String>,
    pub gender: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorDailyReport {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub total: usize,
    pub completed: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor not available at the requested time")]
    DoctorNotAvailable,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Multiple billing records found for appointment")]
    AmbiguousBilling,

    #[error("Completion step '{step}' failed: {message}")]
    CompletionStep { step: &'static str, message: String },

    #[error("Database error: {0}")]
    Gateway(String),
}

impl AppointmentError {
    pub fn gateway(err: anyhow::Error) -> Self {
        AppointmentError::Gateway(err.to_string())
    }
}
