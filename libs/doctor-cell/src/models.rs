// libs/doctor-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

// ==============================================================================
// CORE DOCTOR MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub specialization_id: Option<Uuid>,
}

/// Read-only reference data maintained outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialization {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
}

/// One bookable window. `date` set means a one-off override for that single
/// calendar date; `date` null means the slot recurs on every `day_of_week`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    /// Time label in the "09:00 - 12:00" form the calendar views render.
    pub fn time_label(&self) -> String {
        format!(
            "{} - {}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub specialization_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: String,
    pub specialization_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRecurringAvailabilityRequest {
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDateOverrideRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGenerateRequest {
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// 0 = only the remainder of the current week; N = every matching
    /// weekday from today through the end of the Nth future month.
    pub repeat_months: u32,
}

/// Which slots a clear operation removes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ClearScope {
    /// Every slot pinned to this calendar date.
    Date(NaiveDate),
    /// Every recurring slot on this ISO weekday (1=Monday..7=Sunday).
    Weekday(i16),
}

/// Per-day availability resolution for a month of calendar rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub available: bool,
    pub time_label: Option<String>,
    /// True when a date override supplied the answer rather than the
    /// recurring weekly pattern.
    pub from_override: bool,
}

// ==============================================================================
// REFERENCE INTEGRITY MODELS
// ==============================================================================

/// Outcome of a denormalized-reference cascade. Partial failure is reported,
/// not rolled back; the caller decides whether the doctor edit may proceed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeReport {
    pub updated: Vec<String>,
    pub errors: Vec<CascadeError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeError {
    pub table: String,
    pub message: String,
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed_tables(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.table.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for CascadeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} updated, {} failed",
            self.updated.len(),
            self.errors.len()
        )
    }
}

/// Label assigned to appointments whose doctor record was deleted.
pub const UNKNOWN_DOCTOR: &str = "Unknown";

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Reference cleanup failed for: {}", .0.failed_tables())]
    ReferenceIntegrity(CascadeReport),

    #[error("Database error: {0}")]
    Gateway(String),
}

impl DoctorError {
    pub fn gateway(err: anyhow::Error) -> Self {
        DoctorError::Gateway(err.to_string())
    }
}
