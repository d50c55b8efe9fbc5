use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Doctor,
    Receptionist,
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffRole::Doctor => write!(f, "doctor"),
            StaffRole::Receptionist => write!(f, "receptionist"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl ApprovalStatus {
    /// Review decisions only ever move a profile to approved or rejected.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
                | (ApprovalStatus::Rejected, ApprovalStatus::Approved)
                | (ApprovalStatus::Approved, ApprovalStatus::Rejected)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub approval_status: ApprovalStatus,
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }

    pub fn is_doctor(&self) -> bool {
        self.role == StaffRole::Doctor
    }

    pub fn is_receptionist(&self) -> bool {
        self.role == StaffRole::Receptionist
    }

    /// Whether this profile belongs to the given auth user id.
    pub fn is_user(&self, user_id: &str) -> bool {
        self.id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfileRequest {
    pub full_name: String,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileQuery {
    pub role: Option<StaffRole>,
    pub approval_status: Option<ApprovalStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectProfileRequest {
    pub reason: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile not found")]
    NotFound,

    #[error("A staff profile is required for this action")]
    ProfileMissing,

    #[error("Profile already exists for this user")]
    AlreadyExists,

    #[error("Profile is awaiting approval")]
    NotApproved,

    #[error("Only {0} staff can perform this action")]
    InsufficientRole(StaffRole),

    #[error("Cannot change approval status from {from} to {to}")]
    InvalidTransition { from: ApprovalStatus, to: ApprovalStatus },

    #[error("Staff cannot review their own profile")]
    SelfReview,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<ProfileError> for AppError {
    fn from(error: ProfileError) -> Self {
        let message = error.to_string();
        match error {
            ProfileError::NotFound => AppError::NotFound(message),
            ProfileError::ProfileMissing
            | ProfileError::NotApproved
            | ProfileError::InsufficientRole(_)
            | ProfileError::SelfReview => AppError::Forbidden(message),
            ProfileError::AlreadyExists => AppError::Conflict(message),
            ProfileError::InvalidTransition { .. } => AppError::BadRequest(message),
            ProfileError::ValidationError(msg) => AppError::ValidationError(msg),
            ProfileError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_transitions() {
        assert!(ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Approved));
        assert!(ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Rejected));
        assert!(ApprovalStatus::Rejected.can_transition_to(ApprovalStatus::Approved));
        assert!(ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Rejected));

        assert!(!ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Approved));
        assert!(!ApprovalStatus::Rejected.can_transition_to(ApprovalStatus::Pending));
        assert!(!ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Pending));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(AppError::from(ProfileError::NotApproved), AppError::Forbidden(_)));
        assert!(matches!(AppError::from(ProfileError::AlreadyExists), AppError::Conflict(_)));
        assert!(matches!(
            AppError::from(ProfileError::InsufficientRole(StaffRole::Receptionist)),
            AppError::Forbidden(msg) if msg == "Only receptionist staff can perform this action"
        ));
    }
}
