// libs/appointment-cell/src/services/booking.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use profile_cell::services::ProfileService;

use crate::models::{
    Appointment, AppointmentStatus, AppointmentQuery, AppointmentError, BookAppointmentRequest,
    RescheduleAppointmentRequest, DaySchedule, CalendarMonth,
};
use crate::services::calendar::{build_month, month_bounds};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::SlotPolicy;

const DEFAULT_LIST_LIMIT: i32 = 100;
const MAX_LIST_LIMIT: i32 = 500;

fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
}

fn first_appointment(rows: Vec<Value>) -> Result<Appointment, AppointmentError> {
    parse_appointments(rows)?
        .into_iter()
        .next()
        .ok_or(AppointmentError::NotFound)
}

fn time_param(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    profiles: ProfileService,
    lifecycle_service: AppointmentLifecycleService,
    policy: SlotPolicy,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            profiles: ProfileService::new(config),
            lifecycle_service: AppointmentLifecycleService::new(),
            policy: SlotPolicy::from_config(config),
        }
    }

    pub fn policy(&self) -> &SlotPolicy {
        &self.policy
    }

    /// Current clinic wall-clock time.
    pub fn clinic_now(&self) -> NaiveDateTime {
        self.policy.local_time(Utc::now())
    }

    /// Whether an unfinished appointment is far enough past its start to be a no-show.
    pub fn is_no_show_due(&self, appointment: &Appointment) -> bool {
        self.lifecycle_service
            .should_mark_no_show(appointment.status, appointment.starts_at(), self.clinic_now())
    }

    /// Book a visit into a slot. Checks run cheapest first: the requested
    /// time, then the referenced rows, then the doctor's bookings for the day.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        created_by: Option<&str>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {} at {} {}",
              request.patient_id, request.doctor_id, request.appointment_date, request.appointment_time);

        self.validate_slot_time(request.appointment_date, request.appointment_time)?;
        self.verify_patient_exists(request.patient_id, auth_token).await?;
        self.verify_doctor(request.doctor_id, auth_token).await?;

        let day = self.doctor_day_appointments(request.doctor_id, request.appointment_date, auth_token).await?;
        self.check_patient_conflict(&day, request.patient_id, request.appointment_date, None)?;
        self.policy.check_capacity(request.appointment_date, request.appointment_time, &day, None)?;

        let now = Utc::now().to_rfc3339();
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": request.doctor_id,
            "appointment_date": request.appointment_date,
            "appointment_time": time_param(request.appointment_time),
            "duration_minutes": self.policy.slot_minutes(),
            "status": AppointmentStatus::Scheduled,
            "reason": non_blank(request.reason),
            "notes": non_blank(request.notes),
            "created_by": created_by,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = parse_appointments(result)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    /// Fetch one appointment. A doctor scope hides other doctors' rows.
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        doctor_scope: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = first_appointment(result)?;

        if let Some(doctor_id) = doctor_scope {
            if appointment.doctor_id != doctor_id {
                warn!("Doctor {} tried to access appointment {}", doctor_id, appointment_id);
                return Err(AppointmentError::Unauthorized);
            }
        }

        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        query: AppointmentQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(date) = query.date {
            query_parts.push(format!("appointment_date=eq.{}", date));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!("appointment_date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!("appointment_date=lte.{}", to_date));
        }
        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        query_parts.push("order=appointment_date.asc,appointment_time.asc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        parse_appointments(result)
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        doctor_scope: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if new_status == AppointmentStatus::Cancelled {
            return Err(AppointmentError::ValidationError(
                "Cancelling an appointment requires a reason".to_string(),
            ));
        }

        let appointment = self.get_appointment(appointment_id, doctor_scope, auth_token).await?;
        self.lifecycle_service.validate_status_transition(appointment.status, new_status)?;

        let updated = self.patch_appointment(appointment_id, json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await?;

        info!("Appointment {} moved from {} to {}", appointment_id, appointment.status, new_status);
        Ok(updated)
    }

    /// Move an appointment to another slot. The moved appointment does not
    /// count against its own new slot, and it goes back to `scheduled`.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        doctor_scope: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, doctor_scope, auth_token).await?;

        if !self.lifecycle_service.can_reschedule(appointment.status) {
            return Err(AppointmentError::NotReschedulable(appointment.status));
        }

        self.validate_slot_time(request.appointment_date, request.appointment_time)?;

        let day = self.doctor_day_appointments(appointment.doctor_id, request.appointment_date, auth_token).await?;
        self.check_patient_conflict(&day, appointment.patient_id, request.appointment_date, Some(appointment.id))?;
        self.policy.check_capacity(
            request.appointment_date,
            request.appointment_time,
            &day,
            Some(appointment.id),
        )?;

        let updated = self.patch_appointment(appointment_id, json!({
            "appointment_date": request.appointment_date,
            "appointment_time": time_param(request.appointment_time),
            "status": AppointmentStatus::Scheduled,
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await?;

        info!("Appointment {} rescheduled to {} {}", appointment_id, request.appointment_date, request.appointment_time);
        Ok(updated)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: &str,
        doctor_scope: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppointmentError::ValidationError("Cancellation reason is required".to_string()));
        }

        let appointment = self.get_appointment(appointment_id, doctor_scope, auth_token).await?;
        self.lifecycle_service.validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let updated = self.patch_appointment(appointment_id, json!({
            "status": AppointmentStatus::Cancelled,
            "cancellation_reason": reason,
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(updated)
    }

    pub async fn update_notes(
        &self,
        appointment_id: Uuid,
        notes: Option<String>,
        doctor_scope: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.get_appointment(appointment_id, doctor_scope, auth_token).await?;

        self.patch_appointment(appointment_id, json!({
            "notes": non_blank(notes),
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await
    }

    /// Slot-by-slot occupancy of one doctor's day.
    pub async fn day_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DaySchedule, AppointmentError> {
        let is_open = self.policy.is_open_on(date);

        let slots = if is_open {
            let day = self.doctor_day_appointments(doctor_id, date, auth_token).await?;
            self.policy.day_availability(date, &day)
        } else {
            Vec::new()
        };

        Ok(DaySchedule { date, doctor_id, is_open, slots })
    }

    /// Density calendar for a month, for one doctor or the whole clinic.
    pub async fn month_calendar(
        &self,
        year: i32,
        month: u32,
        doctor_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<CalendarMonth, AppointmentError> {
        let (first, last) = month_bounds(year, month)?;

        let mut path = format!(
            "/rest/v1/appointments?appointment_date=gte.{}&appointment_date=lte.{}",
            first, last
        );
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let appointments = parse_appointments(result)?;

        let doctor_count = match doctor_id {
            Some(_) => 1,
            None => {
                let doctors = self.profiles.list_approved_doctors(auth_token)
                    .await
                    .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
                u32::try_from(doctors.len()).unwrap_or(u32::MAX)
            }
        };

        build_month(year, month, &appointments, &self.policy, doctor_count)
    }

    fn validate_slot_time(&self, date: NaiveDate, time: NaiveTime) -> Result<(), AppointmentError> {
        if date.and_time(time) <= self.clinic_now() {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled in the future".to_string(),
            ));
        }
        if !self.policy.is_open_on(date) {
            return Err(AppointmentError::ClinicClosed(date));
        }
        if !self.policy.is_slot_start(time) {
            return Err(AppointmentError::InvalidTime(format!(
                "{} is not the start of a {}-minute slot",
                time.format("%H:%M"),
                self.policy.slot_minutes()
            )));
        }
        Ok(())
    }

    fn check_patient_conflict(
        &self,
        day: &[Appointment],
        patient_id: Uuid,
        date: NaiveDate,
        exclude_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let clash = day.iter().any(|a| {
            a.patient_id == patient_id
                && a.appointment_date == date
                && a.is_active()
                && Some(a.id) != exclude_id
        });

        if clash {
            warn!("Patient {} already booked with this doctor on {}", patient_id, date);
            return Err(AppointmentError::Conflict(format!(
                "Patient already has an appointment with this doctor on {}",
                date
            )));
        }
        Ok(())
    }

    async fn verify_patient_exists(&self, patient_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }

        Ok(())
    }

    async fn verify_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let profile = self.profiles.find_profile(&doctor_id.to_string(), auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .filter(|profile| profile.is_doctor())
            .ok_or(AppointmentError::DoctorNotFound)?;

        if !profile.is_approved() {
            warn!("Booking rejected: doctor {} is {}", doctor_id, profile.approval_status);
            return Err(AppointmentError::DoctorNotApproved);
        }

        Ok(())
    }

    /// One doctor's active appointments on a date, in slot order.
    async fn doctor_day_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&order=appointment_time.asc",
            doctor_id, date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        parse_appointments(result)
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        first_appointment(result)
    }
}
