// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Scheduled start in clinic wall-clock time.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.appointment_time)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

impl AppointmentStatus {
    /// Every status except `cancelled` holds a place in its slot.
    pub fn is_active(&self) -> bool {
        *self != AppointmentStatus::Cancelled
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

/// Tally of appointments per status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub scheduled: u32,
    pub confirmed: u32,
    pub completed: u32,
    pub cancelled: u32,
    pub no_show: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: AppointmentStatus) {
        match status {
            AppointmentStatus::Scheduled => self.scheduled += 1,
            AppointmentStatus::Confirmed => self.confirmed += 1,
            AppointmentStatus::Completed => self.completed += 1,
            AppointmentStatus::Cancelled => self.cancelled += 1,
            AppointmentStatus::NoShow => self.no_show += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.scheduled + self.confirmed + self.completed + self.cancelled + self.no_show
    }

    pub fn active(&self) -> u32 {
        self.total() - self.cancelled
    }
}

impl<'a> FromIterator<&'a Appointment> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = &'a Appointment>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for appointment in iter {
            counts.add(appointment.status);
        }
        counts
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentQuery {
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarQuery {
    pub year: i32,
    pub month: u32,
    pub doctor_id: Option<Uuid>,
}

// ==============================================================================
// SLOT & CALENDAR MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotPeriod {
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotAvailability {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub period: SlotPeriod,
    pub capacity: u32,
    pub booked: u32,
    pub remaining: u32,
    pub is_full: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub doctor_id: Uuid,
    pub is_open: bool,
    pub slots: Vec<SlotAvailability>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalendarDensity {
    Closed,
    Empty,
    Light,
    Moderate,
    Busy,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub total: u32,
    pub active: u32,
    pub by_status: StatusCounts,
    pub capacity: u32,
    pub utilization: f64,
    pub density: CalendarDensity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
    pub total_appointments: u32,
    pub busiest_day: Option<NaiveDate>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not approved for appointments")]
    DoctorNotApproved,

    #[error("Slot is full ({capacity} bookings allowed)")]
    SlotFull { capacity: u32 },

    #[error("Clinic is closed on {0}")]
    ClinicClosed(NaiveDate),

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Appointment conflicts with existing booking: {0}")]
    Conflict(String),

    #[error("Cannot change appointment from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointment cannot be rescheduled in status: {0}")]
    NotReschedulable(AppointmentStatus),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::NotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound => AppError::NotFound(message),
            AppointmentError::SlotFull { .. } | AppointmentError::Conflict(_) => {
                AppError::Conflict(message)
            }
            AppointmentError::DoctorNotApproved
            | AppointmentError::ClinicClosed(_)
            | AppointmentError::InvalidTime(_)
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::NotReschedulable(_) => AppError::BadRequest(message),
            AppointmentError::Unauthorized => AppError::Forbidden(message),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&AppointmentStatus::NoShow).unwrap(), "\"no_show\"");
        let status: AppointmentStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(status, AppointmentStatus::Confirmed);
        assert_eq!(AppointmentStatus::NoShow.to_string(), "no_show");
    }

    #[test]
    fn test_only_cancelled_is_inactive() {
        assert!(AppointmentStatus::Scheduled.is_active());
        assert!(AppointmentStatus::NoShow.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        counts.add(AppointmentStatus::Scheduled);
        counts.add(AppointmentStatus::Cancelled);
        counts.add(AppointmentStatus::Completed);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.active(), 2);
    }

    #[test]
    fn test_error_status_codes() {
        use axum::http::StatusCode;

        let full: AppError = AppointmentError::SlotFull { capacity: 4 }.into();
        assert_eq!(full.status_code(), StatusCode::CONFLICT);

        let closed: AppError = AppointmentError::ClinicClosed(NaiveDate::MIN).into();
        assert_eq!(closed.status_code(), StatusCode::BAD_REQUEST);

        let foreign: AppError = AppointmentError::Unauthorized.into();
        assert_eq!(foreign.status_code(), StatusCode::FORBIDDEN);
    }
}
