// libs/doctor-cell/src/services/availability.rs
use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilitySlot, BulkGenerateRequest, ClearScope, DayAvailability,
    DoctorError, SetDateOverrideRequest, SetRecurringAvailabilityRequest,
};

const TIME_FMT: &str = "%H:%M:%S";

/// Computes and persists doctor time-slot availability.
///
/// Canonical representation is the union of explicit per-date rows and
/// day-of-week fallback rows; a lookup for a date resolves the per-date rows
/// first and falls back to the weekly pattern only when none exist.
pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Upsert (or delete, when `is_available` is false) one recurring weekly
    /// slot. No negative records are stored: "not available" means no row.
    pub async fn set_recurring_availability(
        &self,
        doctor_id: Uuid,
        request: SetRecurringAvailabilityRequest,
        auth_token: &str,
    ) -> Result<Option<AvailabilitySlot>, DoctorError> {
        validate_day_of_week(request.day_of_week)?;
        validate_time_range(request.start_time, request.end_time)?;

        let query = format!(
            "doctor_id=eq.{}&day_of_week=eq.{}&date=is.null&start_time=eq.{}",
            doctor_id,
            request.day_of_week,
            request.start_time.format(TIME_FMT)
        );

        if !request.is_available {
            debug!(
                "Removing recurring availability for doctor {} on weekday {}",
                doctor_id, request.day_of_week
            );
            self.supabase
                .delete("availability_slots", &query, Some(auth_token))
                .await
                .map_err(DoctorError::gateway)?;
            return Ok(None);
        }

        let existing = self.supabase
            .select("availability_slots", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let rows = if existing.is_empty() {
            self.supabase
                .insert(
                    "availability_slots",
                    self.slot_row(doctor_id, request.day_of_week, request.start_time, request.end_time, None),
                    Some(auth_token),
                )
                .await
                .map_err(DoctorError::gateway)?
        } else {
            self.supabase
                .update(
                    "availability_slots",
                    &query,
                    json!({
                        "end_time": request.end_time.format(TIME_FMT).to_string(),
                        "updated_at": Utc::now().to_rfc3339(),
                    }),
                    Some(auth_token),
                )
                .await
                .map_err(DoctorError::gateway)?
        };

        let slot = parse_slot(rows.first().ok_or_else(|| {
            DoctorError::Gateway("Failed to store availability".to_string())
        })?)?;

        debug!("Recurring availability stored with ID: {}", slot.id);
        Ok(Some(slot))
    }

    /// Upsert (or delete) a one-off override for a single calendar date.
    /// Overrides for dates already in the past are rejected.
    pub async fn set_date_override(
        &self,
        doctor_id: Uuid,
        request: SetDateOverrideRequest,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<AvailabilitySlot>, DoctorError> {
        validate_time_range(request.start_time, request.end_time)?;

        if request.date < today {
            return Err(DoctorError::Validation(
                "Cannot set schedules for past dates".to_string(),
            ));
        }

        let query = format!(
            "doctor_id=eq.{}&date=eq.{}&start_time=eq.{}",
            doctor_id,
            request.date,
            request.start_time.format(TIME_FMT)
        );

        if !request.is_available {
            debug!(
                "Removing availability override for doctor {} on {}",
                doctor_id, request.date
            );
            self.supabase
                .delete("availability_slots", &query, Some(auth_token))
                .await
                .map_err(DoctorError::gateway)?;
            return Ok(None);
        }

        let day_of_week = iso_weekday(request.date);

        let existing = self.supabase
            .select("availability_slots", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let rows = if existing.is_empty() {
            self.supabase
                .insert(
                    "availability_slots",
                    self.slot_row(
                        doctor_id,
                        day_of_week,
                        request.start_time,
                        request.end_time,
                        Some(request.date),
                    ),
                    Some(auth_token),
                )
                .await
                .map_err(DoctorError::gateway)?
        } else {
            self.supabase
                .update(
                    "availability_slots",
                    &query,
                    json!({
                        "end_time": request.end_time.format(TIME_FMT).to_string(),
                        "day_of_week": day_of_week,
                        "updated_at": Utc::now().to_rfc3339(),
                    }),
                    Some(auth_token),
                )
                .await
                .map_err(DoctorError::gateway)?
        };

        let slot = parse_slot(rows.first().ok_or_else(|| {
            DoctorError::Gateway("Failed to store availability override".to_string())
        })?)?;

        Ok(Some(slot))
    }

    /// Materialize one per-date slot row for every occurrence of a weekday
    /// between `today` and the repeat horizon. Each generated date fully
    /// replaces any pre-existing slot at the same (doctor, date, start_time).
    pub async fn bulk_generate_from_pattern(
        &self,
        doctor_id: Uuid,
        request: BulkGenerateRequest,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, DoctorError> {
        validate_day_of_week(request.day_of_week)?;
        validate_time_range(request.start_time, request.end_time)?;

        let dates = expand_pattern(today, request.day_of_week, request.repeat_months);
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating {} slots for doctor {} on weekday {}",
            dates.len(),
            doctor_id,
            request.day_of_week
        );

        let date_list = dates
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let replace_query = format!(
            "doctor_id=eq.{}&start_time=eq.{}&date=in.({})",
            doctor_id,
            request.start_time.format(TIME_FMT),
            date_list
        );
        self.supabase
            .delete("availability_slots", &replace_query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let rows: Vec<Value> = dates
            .iter()
            .map(|date| {
                self.slot_row(
                    doctor_id,
                    request.day_of_week,
                    request.start_time,
                    request.end_time,
                    Some(*date),
                )
            })
            .collect();

        let inserted = self.supabase
            .insert("availability_slots", Value::Array(rows), Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let slots = inserted
            .iter()
            .map(parse_slot)
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Generated {} availability slots for doctor {}",
            slots.len(),
            doctor_id
        );
        Ok(slots)
    }

    /// Resolve the slots in effect for a single date: per-date rows win,
    /// the weekly pattern is the fallback.
    pub async fn lookup_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, DoctorError> {
        let date_query = format!(
            "doctor_id=eq.{}&date=eq.{}&order=start_time.asc",
            doctor_id, date
        );
        let date_rows = self.supabase
            .select("availability_slots", &date_query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        if !date_rows.is_empty() {
            return date_rows.iter().map(parse_slot).collect();
        }

        let recurring_query = format!(
            "doctor_id=eq.{}&day_of_week=eq.{}&date=is.null&order=start_time.asc",
            doctor_id,
            iso_weekday(date)
        );
        let recurring_rows = self.supabase
            .select("availability_slots", &recurring_query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        recurring_rows.iter().map(parse_slot).collect()
    }

    /// Whether the doctor is bookable at a date and time. `None` means the
    /// doctor has no availability rows at all (unscheduled; the caller
    /// decides how to treat legacy installs without schedules).
    pub async fn is_bookable(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        auth_token: &str,
    ) -> Result<Option<bool>, DoctorError> {
        let resolved = self.lookup_availability(doctor_id, date, auth_token).await?;
        if !resolved.is_empty() {
            return Ok(Some(resolved.iter().any(|slot| slot.contains(time))));
        }

        let any_query = format!("doctor_id=eq.{}&limit=1", doctor_id);
        let any_rows = self.supabase
            .select("availability_slots", &any_query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        if any_rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(false))
        }
    }

    /// Per-day resolution for one calendar month, for calendar rendering.
    pub async fn get_availability_for_month(
        &self,
        doctor_id: Uuid,
        year: i32,
        month: u32,
        auth_token: &str,
    ) -> Result<Vec<DayAvailability>, DoctorError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DoctorError::Validation(format!("Invalid month: {}-{}", year, month)))?;
        let last = last_day_of_month(first);

        let date_query = format!(
            "doctor_id=eq.{}&date=gte.{}&date=lte.{}&order=date.asc,start_time.asc",
            doctor_id, first, last
        );
        let date_rows = self.supabase
            .select("availability_slots", &date_query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let recurring_query = format!(
            "doctor_id=eq.{}&date=is.null&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let recurring_rows = self.supabase
            .select("availability_slots", &recurring_query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        let date_slots: Vec<AvailabilitySlot> =
            date_rows.iter().map(parse_slot).collect::<Result<_, _>>()?;
        let recurring_slots: Vec<AvailabilitySlot> =
            recurring_rows.iter().map(parse_slot).collect::<Result<_, _>>()?;

        let mut days = Vec::with_capacity(last.day() as usize);
        let mut cursor = first;
        while cursor <= last {
            let override_slot = date_slots.iter().find(|s| s.date == Some(cursor));
            let day = match override_slot {
                Some(slot) => DayAvailability {
                    date: cursor,
                    available: true,
                    time_label: Some(slot.time_label()),
                    from_override: true,
                },
                None => {
                    let fallback = recurring_slots
                        .iter()
                        .find(|s| s.day_of_week == iso_weekday(cursor));
                    DayAvailability {
                        date: cursor,
                        available: fallback.is_some(),
                        time_label: fallback.map(|s| s.time_label()),
                        from_override: false,
                    }
                }
            };
            days.push(day);
            cursor = match cursor.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(days)
    }

    /// Delete all slots for a date, or all recurring slots for a weekday.
    pub async fn clear_availability(
        &self,
        doctor_id: Uuid,
        scope: ClearScope,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        let query = match scope {
            ClearScope::Date(date) => {
                format!("doctor_id=eq.{}&date=eq.{}", doctor_id, date)
            }
            ClearScope::Weekday(day_of_week) => {
                validate_day_of_week(day_of_week)?;
                format!(
                    "doctor_id=eq.{}&day_of_week=eq.{}&date=is.null",
                    doctor_id, day_of_week
                )
            }
        };

        self.supabase
            .delete("availability_slots", &query, Some(auth_token))
            .await
            .map_err(DoctorError::gateway)?;

        Ok(())
    }

    fn slot_row(
        &self,
        doctor_id: Uuid,
        day_of_week: i16,
        start_time: NaiveTime,
        end_time: NaiveTime,
        date: Option<NaiveDate>,
    ) -> Value {
        json!({
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "start_time": start_time.format(TIME_FMT).to_string(),
            "end_time": end_time.format(TIME_FMT).to_string(),
            "date": date.map(|d| d.to_string()),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        })
    }
}

/// ISO weekday number: 1 = Monday .. 7 = Sunday.
pub fn iso_weekday(date: NaiveDate) -> i16 {
    date.weekday().number_from_monday() as i16
}

/// All dates matching `day_of_week` from `today` through the repeat horizon:
/// the remainder of the current week for 0 months, otherwise the last day of
/// the Nth future month.
pub fn expand_pattern(today: NaiveDate, day_of_week: i16, repeat_months: u32) -> Vec<NaiveDate> {
    let horizon = if repeat_months == 0 {
        // Through Sunday of the current ISO week.
        let remaining = 7 - iso_weekday(today) as u64;
        today.checked_add_days(Days::new(remaining)).unwrap_or(today)
    } else {
        match today.checked_add_months(Months::new(repeat_months)) {
            Some(shifted) => last_day_of_month(shifted),
            None => today,
        }
    };

    let mut dates = Vec::new();
    let mut cursor = today;
    while cursor <= horizon {
        if iso_weekday(cursor) == day_of_week {
            dates.push(cursor);
        }
        cursor = match cursor.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    dates
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

fn validate_day_of_week(day_of_week: i16) -> Result<(), DoctorError> {
    if !(1..=7).contains(&day_of_week) {
        return Err(DoctorError::Validation(
            "Day of week must be between 1 (Monday) and 7 (Sunday)".to_string(),
        ));
    }
    Ok(())
}

fn validate_time_range(start: NaiveTime, end: NaiveTime) -> Result<(), DoctorError> {
    if start >= end {
        return Err(DoctorError::Validation(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

fn parse_slot(row: &Value) -> Result<AvailabilitySlot, DoctorError> {
    serde_json::from_value(row.clone()).map_err(|e| DoctorError::Gateway(e.to_string()))
}
