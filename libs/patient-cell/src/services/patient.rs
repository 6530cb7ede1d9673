use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, PatientError, PatientSummary};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let rows = self.supabase
            .select("patients", &format!("id=eq.{}", patient_id), Some(auth_token))
            .await
            .map_err(|e| PatientError::Gateway(e.to_string()))?;

        let row = rows.first().ok_or(PatientError::NotFound)?;

        serde_json::from_value(row.clone())
            .map_err(|e| PatientError::Gateway(e.to_string()))
    }

    /// Lookup used by the admin list views. A missing row degrades to the
    /// "Unknown" placeholder instead of failing the whole listing.
    pub async fn patient_summary(&self, patient_id: Uuid, auth_token: &str) -> PatientSummary {
        match self.get_patient(patient_id, auth_token).await {
            Ok(patient) => PatientSummary::from(&patient),
            Err(e) => {
                warn!("Patient lookup failed for {}: {}", patient_id, e);
                PatientSummary::unknown()
            }
        }
    }

    /// Resolve the auth account id behind a patient row by following
    /// patients.user_id. Falls back to the patient id itself when the
    /// indirection is absent.
    pub async fn resolve_account_id(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Uuid, PatientError> {
        let rows = self.supabase
            .select(
                "patients",
                &format!("id=eq.{}&select=user_id", patient_id),
                Some(auth_token),
            )
            .await
            .map_err(|e| PatientError::Gateway(e.to_string()))?;

        let account_id = rows.first()
            .and_then(|row: &Value| row["user_id"].as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        match account_id {
            Some(id) => Ok(id),
            None => {
                debug!("No account id behind patient {}, using patient id directly", patient_id);
                Ok(patient_id)
            }
        }
    }
}
