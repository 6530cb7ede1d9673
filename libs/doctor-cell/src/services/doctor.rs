// libs/doctor-cell/src/services/doctor.rs
use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CascadeReport, CreateDoctorRequest, Doctor, DoctorError, Specialization,
    UpdateDoctorRequest,
};
use crate::services::integrity::ReferenceIntegrityService;

pub struct DoctorService {
    supabase: SupabaseClient,
    integrity: ReferenceIntegrityService,
    clinic_id: String,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            integrity: ReferenceIntegrityService::new(config),
            clinic_id: config.clinic_id.clone(),
        }
    }

    pub async fn create_doctor(
        &self,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DoctorError::Validation("Doctor name is required".to_string()));
        }

        debug!("Creating doctor: {}", name);

        // Names are the clinic-scoped lookup key for legacy references.
        if self.find_doctor_by_name(name, auth_token).await.is_ok() {
            return Err(DoctorError::Validation(format!(
                "Doctor named {} already exists in this clinic",
                name
            )));
        }

        let doctor_data = json!({
            "clinic_id": self.clinic_id,
            "name": name,
            "specialization_id": request.specialization_id,
        });

        let rows = self.supabase
            .insert("doctors", doctor_data, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let doctor = parse_doctor(rows.first().ok_or_else(|| {
            DoctorError::Gateway("Failed to create doctor".to_string())
        })?)?;

        info!("Doctor created with ID: {}", doctor.id);
        Ok(doctor)
    }

    pub async fn list_doctors(&self, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        let query = format!("clinic_id=eq.{}&order=name.asc", self.clinic_id);
        let rows = self.supabase
            .select("doctors", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        rows.iter().map(parse_doctor).collect()
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let query = format!("id=eq.{}&clinic_id=eq.{}", doctor_id, self.clinic_id);
        let rows = self.supabase
            .select("doctors", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let row = rows.first().ok_or(DoctorError::NotFound)?;
        parse_doctor(row)
    }

    /// Clinic-scoped lookup by name. Compatibility shim for legacy rows that
    /// reference doctors by denormalized name instead of id.
    pub async fn find_doctor_by_name(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let query = format!(
            "clinic_id=eq.{}&name=eq.{}&limit=1",
            self.clinic_id,
            urlencoding::encode(name)
        );
        let rows = self.supabase
            .select("doctors", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let row = rows.first().ok_or(DoctorError::NotFound)?;
        parse_doctor(row)
    }

    /// Update a doctor. A name change cascades through the reference
    /// integrity service; partial cascade failure is reported alongside the
    /// updated doctor (the rename itself stands).
    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<(Doctor, CascadeReport), DoctorError> {
        let new_name = request.name.trim().to_string();
        if new_name.is_empty() {
            return Err(DoctorError::Validation("Doctor name is required".to_string()));
        }

        let current = self.get_doctor(doctor_id, auth_token).await?;
        let old_name = current.name.clone();

        let query = format!("id=eq.{}&clinic_id=eq.{}", doctor_id, self.clinic_id);
        let rows = self.supabase
            .update(
                "doctors",
                &query,
                json!({
                    "name": new_name,
                    "specialization_id": request.specialization_id,
                }),
                Some(auth_token),
            )
            .await
            .map_err(DoctorError::gateway)?;

        let doctor = parse_doctor(rows.first().ok_or_else(|| {
            DoctorError::Gateway("Failed to update doctor".to_string())
        })?)?;

        let report = if old_name != doctor.name {
            let report = self.integrity
                .propagate_doctor_change(doctor_id, &old_name, Some(&doctor.name), auth_token)
                .await;
            if !report.is_clean() {
                warn!(
                    "Doctor {} renamed but reference cascade partially failed: {}",
                    doctor_id, report
                );
            }
            report
        } else {
            CascadeReport::default()
        };

        Ok((doctor, report))
    }

    /// Delete a doctor. Reference cleanup runs first and must fully succeed;
    /// a failed cascade aborts the deletion so no appointment is left without
    /// its fallback label. Appointments themselves are never deleted.
    pub async fn delete_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<CascadeReport, DoctorError> {
        let doctor = self.get_doctor(doctor_id, auth_token).await?;

        info!("Deleting doctor {} ({})", doctor.name, doctor_id);

        let report = self.integrity
            .propagate_doctor_change(doctor_id, &doctor.name, None, auth_token)
            .await;

        if !report.is_clean() {
            warn!(
                "Aborting deletion of doctor {}: reference cleanup failed ({})",
                doctor_id, report
            );
            return Err(DoctorError::ReferenceIntegrity(report));
        }

        let query = format!("id=eq.{}&clinic_id=eq.{}", doctor_id, self.clinic_id);
        self.supabase
            .delete("doctors", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        info!("Doctor {} deleted", doctor_id);
        Ok(report)
    }

    pub async fn list_specializations(
        &self,
        auth_token: &str,
    ) -> Result<Vec<Specialization>, DoctorError> {
        let query = format!("clinic_id=eq.{}&order=name.asc", self.clinic_id);
        let rows = self.supabase
            .select("specializations", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        rows.iter()
            .map(|row: &Value| {
                serde_json::from_value(row.clone())
                    .map_err(|e| DoctorError::Gateway(e.to_string()))
            })
            .collect()
    }

    /// Id -> name map for report and listing views.
    pub async fn specialization_map(
        &self,
        auth_token: &str,
    ) -> Result<HashMap<Uuid, String>, DoctorError> {
        let specializations = self.list_specializations(auth_token).await?;
        Ok(specializations
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect())
    }
}

fn parse_doctor(row: &Value) -> Result<Doctor, DoctorError> {
    serde_json::from_value(row.clone()).map_err(|e| DoctorError::Gateway(e.to_string()))
}
