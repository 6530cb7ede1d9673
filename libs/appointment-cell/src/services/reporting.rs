// libs/appointment-cell/src/services/reporting.rs
use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use doctor_cell::services::doctor::DoctorService;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CompletedFilter,
    DailyStats, DoctorDailyReport,
};

/// Thin query layer deriving list views and aggregate counts from
/// appointment state. Counts are computed in memory over filtered reads.
pub struct AppointmentReportingService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    clinic_id: String,
}

impl AppointmentReportingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            clinic_id: config.clinic_id.clone(),
        }
    }

    /// Incoming requests awaiting triage.
    pub async fn list_pending(
        &self,
        newest_first: bool,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_by_status(AppointmentStatus::Pending, newest_first, auth_token).await
    }

    /// Approved appointments awaiting the visit.
    pub async fn list_approved(
        &self,
        newest_first: bool,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_by_status(AppointmentStatus::Approved, newest_first, auth_token).await
    }

    /// Completed-history view with the admin screen's filters. Gender and
    /// name-search filters resolve against the patients collection in
    /// memory, the rest push down to the gateway.
    pub async fn list_completed(
        &self,
        filter: CompletedFilter,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let status = filter.status.unwrap_or(AppointmentStatus::Completed);
        let mut query = format!(
            "clinic_id=eq.{}&status=eq.{}&order=created_at.desc",
            self.clinic_id, status
        );
        if let Some(date) = filter.date {
            query.push_str(&format!("&date=eq.{}", date));
        }
        if let Some(ref doctor_name) = filter.doctor_name {
            query.push_str(&format!("&doctor_name=eq.{}", urlencoding::encode(doctor_name)));
        }

        let rows = self.supabase
            .select("appointments", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        let mut appointments: Vec<Appointment> = rows
            .iter()
            .map(parse_appointment)
            .collect::<Result<_, _>>()?;

        if let Some(ref gender) = filter.gender {
            let matching = self.patient_ids_by_gender(gender, auth_token).await?;
            appointments.retain(|a| matching.contains(&a.user_id));
        }

        if let Some(ref search) = filter.search {
            let needle = search.to_lowercase();
            appointments.retain(|a| {
                a.patient_name
                    .as_deref()
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });
        }

        Ok(appointments)
    }

    /// All appointments in a calendar month, optionally narrowed to one
    /// doctor's legacy name reference. The month cursor is explicit state
    /// owned by the caller.
    pub async fn month_appointments(
        &self,
        year: i32,
        month: u32,
        doctor_name: Option<&str>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppointmentError::Validation(format!("Invalid month: {}-{}", year, month)))?;
        let last = doctor_cell::services::availability::last_day_of_month(first);

        let mut query = format!(
            "clinic_id=eq.{}&date=gte.{}&date=lte.{}&order=date.asc,time.asc",
            self.clinic_id, first, last
        );
        if let Some(name) = doctor_name {
            query.push_str(&format!("&doctor_name=eq.{}", urlencoding::encode(name)));
        }

        let rows = self.supabase
            .select("appointments", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        rows.iter().map(parse_appointment).collect()
    }

    /// Aggregate counts for one day.
    pub async fn daily_stats(
        &self,
        date: NaiveDate,
        doctor_name: Option<&str>,
        auth_token: &str,
    ) -> Result<DailyStats, AppointmentError> {
        let mut query = format!("clinic_id=eq.{}&date=eq.{}", self.clinic_id, date);
        if let Some(name) = doctor_name {
            query.push_str(&format!("&doctor_name=eq.{}", urlencoding::encode(name)));
        }

        let rows = self.supabase
            .select("appointments", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        let appointments: Vec<Appointment> = rows
            .iter()
            .map(parse_appointment)
            .collect::<Result<_, _>>()?;

        debug!("Computed daily stats over {} appointments", appointments.len());

        Ok(DailyStats {
            date,
            total: appointments.len(),
            pending: count_status(&appointments, AppointmentStatus::Pending),
            approved: count_status(&appointments, AppointmentStatus::Approved),
            completed: count_status(&appointments, AppointmentStatus::Completed),
        })
    }

    /// Per-doctor totals for one day. A single read per collection, grouped
    /// in memory.
    pub async fn doctor_daily_reports(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<DoctorDailyReport>, AppointmentError> {
        let doctors = self.doctors
            .list_doctors(auth_token)
            .await
            .map_err(|e| AppointmentError::Gateway(e.to_string()))?;

        let query = format!("clinic_id=eq.{}&date=eq.{}", self.clinic_id, date);
        let rows = self.supabase
            .select("appointments", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        let appointments: Vec<Appointment> = rows
            .iter()
            .map(parse_appointment)
            .collect::<Result<_, _>>()?;

        let reports = doctors
            .into_iter()
            .map(|doctor| {
                let theirs: Vec<&Appointment> = appointments
                    .iter()
                    .filter(|a| {
                        a.doctor_id == Some(doctor.id)
                            || a.doctor_name.as_deref() == Some(doctor.name.as_str())
                    })
                    .collect();
                DoctorDailyReport {
                    doctor_id: doctor.id,
                    doctor_name: doctor.name,
                    total: theirs.len(),
                    completed: theirs
                        .iter()
                        .filter(|a| a.status == AppointmentStatus::Completed)
                        .count(),
                }
            })
            .collect();

        Ok(reports)
    }

    async fn list_by_status(
        &self,
        status: AppointmentStatus,
        newest_first: bool,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let direction = if newest_first { "desc" } else { "asc" };
        let query = format!(
            "clinic_id=eq.{}&status=eq.{}&order=created_at.{}",
            self.clinic_id, status, direction
        );

        let rows = self.supabase
            .select("appointments", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        rows.iter().map(parse_appointment).collect()
    }

    async fn patient_ids_by_gender(
        &self,
        gender: &str,
        auth_token: &str,
    ) -> Result<HashSet<Uuid>, AppointmentError> {
        let query = format!("gender=eq.{}&select=id", urlencoding::encode(gender));
        let rows = self.supabase
            .select("patients", &query, Some(auth_token))
            .await
            .map_err(AppointmentError::gateway)?;

        Ok(rows
            .iter()
            .filter_map(|row: &Value| row["id"].as_str())
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect())
    }
}

fn count_status(appointments: &[Appointment], status: AppointmentStatus) -> usize {
    appointments.iter().filter(|a| a.status == status).count()
}

fn parse_appointment(row: &Value) -> Result<Appointment, AppointmentError> {
    serde_json::from_value(row.clone()).map_err(|e| AppointmentError::Gateway(e.to_string()))
}
