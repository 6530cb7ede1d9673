// libs/doctor-cell/src/services/integrity.rs
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{CascadeError, CascadeReport, UNKNOWN_DOCTOR};

/// Keeps appointment->doctor references consistent across doctor renames and
/// deletions.
///
/// Legacy installations denormalize the doctor name onto appointment rows, so
/// a rename must rewrite every matching row and a deletion must reassign them
/// to the "Unknown" sentinel. Partial failure is never rolled back; the
/// report tells the caller exactly which updates landed so it can decide
/// whether the doctor edit itself may proceed.
pub struct ReferenceIntegrityService {
    supabase: SupabaseClient,
    clinic_id: String,
}

impl ReferenceIntegrityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            clinic_id: config.clinic_id.clone(),
        }
    }

    /// Rewrite denormalized doctor references in every table that carries
    /// them. `new_name = None` means the doctor is being deleted and matching
    /// rows get the sentinel label instead.
    pub async fn propagate_doctor_change(
        &self,
        doctor_id: Uuid,
        old_name: &str,
        new_name: Option<&str>,
        auth_token: &str,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        let replacement = new_name.unwrap_or(UNKNOWN_DOCTOR);
        let is_deletion = new_name.is_none();

        // Legacy name-based appointment references.
        let name_query = format!(
            "doctor_name=eq.{}&clinic_id=eq.{}",
            urlencoding::encode(old_name),
            self.clinic_id
        );
        match self.supabase
            .update(
                "appointments",
                &name_query,
                json!({ "doctor_name": replacement }),
                Some(auth_token),
            )
            .await
        {
            Ok(rows) => {
                info!(
                    "Rewrote {} name-based appointment references: {} -> {}",
                    rows.len(),
                    old_name,
                    replacement
                );
                report.updated.push("appointments".to_string());
            }
            Err(e) => {
                warn!("Appointment reference rewrite failed: {}", e);
                report.errors.push(CascadeError {
                    table: "appointments".to_string(),
                    message: e.to_string(),
                });
            }
        }

        // Id-based references only need attention when the doctor row is
        // about to disappear: detach the id and leave the sentinel label.
        if is_deletion {
            let id_query = format!(
                "doctor_id=eq.{}&clinic_id=eq.{}",
                doctor_id, self.clinic_id
            );
            match self.supabase
                .update(
                    "appointments",
                    &id_query,
                    json!({ "doctor_id": null, "doctor_name": UNKNOWN_DOCTOR }),
                    Some(auth_token),
                )
                .await
            {
                Ok(rows) => {
                    info!(
                        "Detached {} id-based appointment references for doctor {}",
                        rows.len(),
                        doctor_id
                    );
                    report.updated.push("appointments.doctor_id".to_string());
                }
                Err(e) => {
                    warn!("Appointment id-reference detach failed: {}", e);
                    report.errors.push(CascadeError {
                        table: "appointments.doctor_id".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Add further tables here if they ever denormalize doctor names.

        report
    }
}
