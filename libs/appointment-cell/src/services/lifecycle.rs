// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::models::{AppointmentStatus, AppointmentError};

/// Minutes past the start after which an active appointment counts as a no-show.
const NO_SHOW_GRACE_MINUTES: i64 = 30;

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn can_reschedule(&self, current_status: AppointmentStatus) -> bool {
        matches!(current_status, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    /// Check if an appointment should be marked as no-show
    pub fn should_mark_no_show(
        &self,
        current_status: AppointmentStatus,
        scheduled_start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> bool {
        if !matches!(current_status, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed) {
            return false;
        }

        now > scheduled_start + Duration::minutes(NO_SHOW_GRACE_MINUTES)
    }
}
