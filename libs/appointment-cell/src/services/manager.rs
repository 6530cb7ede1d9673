// libs/appointment-cell/src/services/manager.rs
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use doctor_cell::models::DoctorError;
use doctor_cell::services::availability::AvailabilityService;
use doctor_cell::services::doctor::DoctorService;
use patient_cell::services::patient::PatientService;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ApproveAppointmentRequest,
    Billing, BillingInput, BillingPatch, BillingStatus, CompleteAppointmentRequest,
    DoctorNote, DoctorRef, Prescription, PrescriptionInput,
};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Orchestrates the appointment state machine and its side-effect records.
///
/// All writes go through the persistence gateway; status changes are guarded
/// by a status filter on the update so a racing operation surfaces as a
/// failed transition instead of silently overwriting.
pub struct AppointmentManagerService {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
    doctors: DoctorService,
    availability: AvailabilityService,
    patients: PatientService,
    clinic_id: String,
}

impl AppointmentManagerService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(),
            doctors: DoctorService::new(config),
            availability: AvailabilityService::new(config),
            patients: PatientService::new(config),
            clinic_id: config.clinic_id.clone(),
        }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let query = format!("id=eq.{}&clinic_id=eq.{}", appointment_id, self.clinic_id);
        let rows = self.supabase
            .select("appointments", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        let row = rows.first().ok_or(AppointmentError::NotFound)?;
        parse_appointment(row)
    }

    /// Approve a pending appointment with a resolvable doctor reference.
    /// Stores the canonical doctor id and keeps the legacy name column in
    /// sync. The availability engine is consulted; a doctor with a schedule
    /// that does not cover the requested time is rejected, a doctor with no
    /// schedule at all is allowed through (legacy installs).
    pub async fn approve(
        &self,
        appointment_id: Uuid,
        request: ApproveAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Approved)?;

        let doctor_ref = request
            .doctor_ref()
            .ok_or_else(|| AppointmentError::Validation(
                "Doctor not set for this appointment".to_string(),
            ))?;

        let doctor = self.resolve_doctor(doctor_ref, auth_token).await?;

        match self.availability
            .is_bookable(doctor.id, appointment.date, appointment.time, auth_token)
            .await
        {
            Ok(Some(false)) => return Err(AppointmentError::DoctorNotAvailable),
            Ok(_) => {}
            Err(e) => return Err(map_doctor_error(e)),
        }

        info!(
            "Approving appointment {} with doctor {} ({})",
            appointment_id, doctor.name, doctor.id
        );

        self.transition(
            appointment_id,
            AppointmentStatus::Pending,
            json!({
                "status": AppointmentStatus::Approved,
                "doctor_id": doctor.id,
                "doctor_name": doctor.name,
                "updated_at": now.to_rfc3339(),
            }),
            auth_token,
        ).await
    }

    /// Decline a pending appointment. Declined is terminal.
    pub async fn decline(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Declined)?;

        info!("Declining appointment {}", appointment_id);

        self.transition(
            appointment_id,
            AppointmentStatus::Pending,
            json!({
                "status": AppointmentStatus::Declined,
                "updated_at": now.to_rfc3339(),
            }),
            auth_token,
        ).await
    }

    /// Complete an approved appointment, recording prescription, billing and
    /// clinical note as one logical unit.
    ///
    /// The three side-effect writes are idempotent upserts keyed on the
    /// appointment, issued concurrently and jointly awaited; the status flip
    /// happens only after all three landed. Any failure leaves the
    /// appointment approved, and a retry cannot duplicate rows.
    pub async fn complete(
        &self,
        appointment_id: Uuid,
        request: CompleteAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

        validate_completion_fields(&request)?;

        let doctor_id = self.resolve_treating_doctor(&appointment, auth_token).await?;

        let note_patient_id = self.patients
            .resolve_account_id(appointment.user_id, auth_token)
            .await
            .map_err(|e| AppointmentError::Gateway(e.to_string()))?;

        let note_row = json!({
            "appointment_id": appointment.id,
            "clinic_id": self.clinic_id,
            "patient_id": note_patient_id,
            "doctor_id": doctor_id,
            "content": request.clinical_note.content.trim(),
            "created_at": now.to_rfc3339(),
        });
        let prescription_row = json!({
            "appointment_id": appointment.id,
            "clinic_id": self.clinic_id,
            "user_id": appointment.user_id,
            "doctor_id": doctor_id,
            "name": request.prescription.name.trim(),
            "details": request.prescription.details.trim(),
            "created_at": now.to_rfc3339(),
        });
        let billing_row = json!({
            "appointment_id": appointment.id,
            "clinic_id": self.clinic_id,
            "user_id": appointment.user_id,
            "title": request.billing.title.trim(),
            "amount": request.billing.amount,
            "due_date": request.billing.due_date,
            "status": request.billing.status.unwrap_or(BillingStatus::Unpaid),
            "description": format!("Billing for service on {}", appointment.date),
            "created_at": now.to_rfc3339(),
        });

        debug!("Writing completion records for appointment {}", appointment_id);

        let note_write = async {
            self.supabase
                .upsert("doctor_notes", "appointment_id", note_row, Some(auth_token))
                .await
                .map_err(|e| AppointmentError::CompletionStep {
                    step: "doctor_note",
                    message: e.to_string(),
                })
        };
        let prescription_write = async {
            self.supabase
                .upsert("prescriptions", "appointment_id", prescription_row, Some(auth_token))
                .await
                .map_err(|e| AppointmentError::CompletionStep {
                    step: "prescription",
                    message: e.to_string(),
                })
        };
        let billing_write = async {
            self.supabase
                .upsert("billings", "appointment_id", billing_row, Some(auth_token))
                .await
                .map_err(|e| AppointmentError::CompletionStep {
                    step: "billing",
                    message: e.to_string(),
                })
        };

        futures::try_join!(note_write, prescription_write, billing_write)?;

        let completed = self.transition(
            appointment_id,
            AppointmentStatus::Approved,
            json!({
                "status": AppointmentStatus::Completed,
                "updated_at": now.to_rfc3339(),
            }),
            auth_token,
        ).await.map_err(|e| match e {
            AppointmentError::Gateway(message) => AppointmentError::CompletionStep {
                step: "appointment",
                message,
            },
            other => other,
        })?;

        info!("Appointment {} completed", appointment_id);
        Ok(completed)
    }

    /// Record a prescription while the appointment is still approved.
    pub async fn save_draft_prescription(
        &self,
        appointment_id: Uuid,
        input: PrescriptionInput,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Prescription, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if appointment.status != AppointmentStatus::Approved {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        if input.name.trim().is_empty() || input.details.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "Missing required fields: prescription.name, prescription.details".to_string(),
            ));
        }

        let doctor_id = self.resolve_treating_doctor(&appointment, auth_token).await.ok();

        let row = json!({
            "appointment_id": appointment.id,
            "clinic_id": self.clinic_id,
            "user_id": appointment.user_id,
            "doctor_id": doctor_id,
            "name": input.name.trim(),
            "details": input.details.trim(),
            "created_at": now.to_rfc3339(),
        });

        let rows = self.supabase
            .insert("prescriptions", row, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        parse_row(rows.first(), "Failed to save prescription")
    }

    /// Record a billing entry while the appointment is still approved.
    pub async fn save_draft_billing(
        &self,
        appointment_id: Uuid,
        input: BillingInput,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Billing, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if appointment.status != AppointmentStatus::Approved {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        if input.title.trim().is_empty() || input.amount <= 0.0 {
            return Err(AppointmentError::Validation(
                "Missing required fields: billing.title, billing.amount".to_string(),
            ));
        }

        let row = json!({
            "appointment_id": appointment.id,
            "clinic_id": self.clinic_id,
            "user_id": appointment.user_id,
            "title": input.title.trim(),
            "amount": input.amount,
            "due_date": input.due_date,
            "status": input.status.unwrap_or(BillingStatus::Unpaid),
            "description": format!("Billing for service on {}", appointment.date),
            "created_at": now.to_rfc3339(),
        });

        let rows = self.supabase
            .insert("billings", row, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        parse_row(rows.first(), "Failed to save billing")
    }

    /// Patch the payment status of the billing row owned by an appointment.
    /// No billing row yet is a successful no-op, not an error.
    pub async fn update_billing_status(
        &self,
        appointment_id: Uuid,
        new_status: BillingStatus,
        auth_token: &str,
    ) -> Result<Option<Billing>, AppointmentError> {
        let Some(billing) = self.find_billing(appointment_id, auth_token).await? else {
            debug!("No billing row for appointment {} yet, nothing to update", appointment_id);
            return Ok(None);
        };

        let rows = self.supabase
            .update(
                "billings",
                &format!("id=eq.{}", billing.id),
                json!({ "status": new_status }),
                Some(auth_token),
            )
            .await
            .map_err(AppointmentError::gateway)?;

        parse_row(rows.first(), "Failed to update billing status").map(Some)
    }

    /// Patch a single mutable billing field, same ownership rules as
    /// `update_billing_status`.
    pub async fn update_billing_field(
        &self,
        appointment_id: Uuid,
        patch: BillingPatch,
        auth_token: &str,
    ) -> Result<Option<Billing>, AppointmentError> {
        let Some(billing) = self.find_billing(appointment_id, auth_token).await? else {
            debug!("No billing row for appointment {} yet, nothing to update", appointment_id);
            return Ok(None);
        };

        let patch_body = match patch {
            BillingPatch::Title(title) => {
                if title.trim().is_empty() {
                    return Err(AppointmentError::Validation(
                        "Billing title cannot be empty".to_string(),
                    ));
                }
                json!({ "title": title.trim() })
            }
            BillingPatch::Amount(amount) => {
                if amount <= 0.0 {
                    return Err(AppointmentError::Validation(
                        "Billing amount must be positive".to_string(),
                    ));
                }
                json!({ "amount": amount })
            }
            BillingPatch::DueDate(due_date) => json!({ "due_date": due_date }),
        };

        let rows = self.supabase
            .update(
                "billings",
                &format!("id=eq.{}", billing.id),
                patch_body,
                Some(auth_token),
            )
            .await
            .map_err(AppointmentError::gateway)?;

        parse_row(rows.first(), "Failed to update billing").map(Some)
    }

    pub async fn list_prescriptions(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Prescription>, AppointmentError> {
        let query = format!(
            "appointment_id=eq.{}&clinic_id=eq.{}",
            appointment_id, self.clinic_id
        );
        let rows = self.supabase
            .select("prescriptions", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        rows.iter()
            .map(|row| parse_row(Some(row), "Malformed prescription row"))
            .collect()
    }

    pub async fn list_notes(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DoctorNote>, AppointmentError> {
        let query = format!(
            "appointment_id=eq.{}&clinic_id=eq.{}",
            appointment_id, self.clinic_id
        );
        let rows = self.supabase
            .select("doctor_notes", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        rows.iter()
            .map(|row| parse_row(Some(row), "Malformed doctor note row"))
            .collect()
    }

    // Private helpers

    /// Status-guarded update: the filter pins the expected current status so
    /// a racing writer shows up as zero updated rows.
    async fn transition(
        &self,
        appointment_id: Uuid,
        expected_status: AppointmentStatus,
        patch: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let query = format!(
            "id=eq.{}&clinic_id=eq.{}&status=eq.{}",
            appointment_id, self.clinic_id, expected_status
        );
        let rows = self.supabase
            .update("appointments", &query, patch, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        match rows.first() {
            Some(row) => parse_appointment(row),
            None => {
                warn!(
                    "Appointment {} left status {} while operation was in flight",
                    appointment_id, expected_status
                );
                Err(AppointmentError::InvalidStatusTransition(expected_status))
            }
        }
    }

    async fn resolve_doctor(
        &self,
        doctor_ref: DoctorRef,
        auth_token: &str,
    ) -> Result<doctor_cell::models::Doctor, AppointmentError> {
        match doctor_ref {
            DoctorRef::Id(id) => self.doctors
                .get_doctor(id, auth_token)
                .await
                .map_err(map_doctor_error),
            DoctorRef::Name(name) => self.doctors
                .find_doctor_by_name(&name, auth_token)
                .await
                .map_err(map_doctor_error),
        }
    }

    /// The doctor treating this appointment: the stored id wins, the legacy
    /// denormalized name is the fallback lookup path.
    async fn resolve_treating_doctor(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        if let Some(id) = appointment.doctor_id {
            return Ok(id);
        }

        let name = appointment
            .doctor_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(AppointmentError::DoctorNotFound)?;

        let doctor = self.doctors
            .find_doctor_by_name(name, auth_token)
            .await
            .map_err(map_doctor_error)?;

        Ok(doctor.id)
    }

    /// At most one billing row is expected per appointment; duplicates from
    /// historic double-inserts are surfaced instead of patched blindly.
    async fn find_billing(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Billing>, AppointmentError> {
        let query = format!(
            "appointment_id=eq.{}&clinic_id=eq.{}",
            appointment_id, self.clinic_id
        );
        let rows = self.supabase
            .select("billings", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        match rows.len() {
            0 => Ok(None),
            1 => parse_row(rows.first(), "Malformed billing row").map(Some),
            _ => Err(AppointmentError::AmbiguousBilling),
        }
    }
}

fn validate_completion_fields(
    request: &CompleteAppointmentRequest,
) -> Result<(), AppointmentError> {
    let mut missing = Vec::new();

    if request.prescription.name.trim().is_empty() {
        missing.push("prescription.name");
    }
    if request.prescription.details.trim().is_empty() {
        missing.push("prescription.details");
    }
    if request.billing.title.trim().is_empty() {
        missing.push("billing.title");
    }
    if request.billing.amount <= 0.0 {
        missing.push("billing.amount");
    }
    if request.billing.due_date.is_none() {
        missing.push("billing.due_date");
    }
    if request.clinical_note.content.trim().is_empty() {
        missing.push("clinical_note.content");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppointmentError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn map_doctor_error(err: DoctorError) -> AppointmentError {
    match err {
        DoctorError::NotFound => AppointmentError::DoctorNotFound,
        DoctorError::Validation(msg) => AppointmentError::Validation(msg),
        other => AppointmentError::Gateway(other.to_string()),
    }
}

fn parse_appointment(row: &Value) -> Result<Appointment, AppointmentError> {
    serde_json::from_value(row.clone()).map_err(|e| AppointmentError::Gateway(e.to_string()))
}

fn parse_row<T: serde::de::DeserializeOwned>(
    row: Option<&Value>,
    context: &str,
) -> Result<T, AppointmentError> {
    let row = row.ok_or_else(|| AppointmentError::Gateway(context.to_string()))?;
    serde_json::from_value(row.clone()).map_err(|e| AppointmentError::Gateway(e.to_string()))
}
