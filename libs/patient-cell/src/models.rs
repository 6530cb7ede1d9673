use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient reference data. The patients collection is shared across clinics
/// (no clinic_id column) - preserved as observed in the source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub address: Option<String>,
    pub gender: Option<String>,
}

/// Display-ready patient info with the fallbacks the admin views expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub name: String,
    pub address: String,
    pub gender: String,
}

impl From<&Patient> for PatientSummary {
    fn from(patient: &Patient) -> Self {
        Self {
            name: patient.full_name.clone(),
            address: patient.address.clone().unwrap_or_else(|| "No address".to_string()),
            gender: patient.gender.clone().unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

impl PatientSummary {
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            address: "No address".to_string(),
            gender: "N/A".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Database error: {0}")]
    Gateway(String),
}
