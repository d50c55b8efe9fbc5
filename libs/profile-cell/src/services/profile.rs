use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    ApprovalStatus, CreateProfileRequest, Profile, ProfileError, ProfileQuery, StaffRole,
    UpdateProfileRequest,
};

pub struct ProfileService {
    supabase: SupabaseClient,
}

fn validate_fields(full_name: Option<&str>, consultation_fee: Option<f64>) -> Result<(), ProfileError> {
    if let Some(name) = full_name {
        let length = name.trim().chars().count();
        if !(2..=100).contains(&length) {
            return Err(ProfileError::ValidationError(
                "Full name must be between 2 and 100 characters".to_string(),
            ));
        }
    }

    if let Some(fee) = consultation_fee {
        if !fee.is_finite() || fee < 0.0 {
            return Err(ProfileError::ValidationError(
                "Consultation fee must be a non-negative amount".to_string(),
            ));
        }
    }

    Ok(())
}

fn parse_profiles(rows: Vec<Value>) -> Result<Vec<Profile>, ProfileError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Profile>, _>>()
        .map_err(|e| ProfileError::DatabaseError(format!("Failed to parse profile: {}", e)))
}

fn first_profile(rows: Vec<Value>) -> Result<Option<Profile>, ProfileError> {
    Ok(parse_profiles(rows)?.into_iter().next())
}

impl ProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn find_profile(
        &self,
        profile_id: &str,
        auth_token: &str,
    ) -> Result<Option<Profile>, ProfileError> {
        debug!("Fetching profile: {}", profile_id);

        let path = format!("/rest/v1/profiles?id=eq.{}", profile_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        first_profile(result)
    }

    pub async fn get_profile(&self, profile_id: &str, auth_token: &str) -> Result<Profile, ProfileError> {
        self.find_profile(profile_id, auth_token)
            .await?
            .ok_or(ProfileError::NotFound)
    }

    /// Creates the caller's own profile. Every profile awaits approval except the
    /// first receptionist, who bootstraps the approval chain.
    pub async fn create_profile(
        &self,
        user: &User,
        request: CreateProfileRequest,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        debug!("Creating {} profile for user {}", request.role, user.id);

        validate_fields(Some(&request.full_name), request.consultation_fee)?;

        if self.find_profile(&user.id, auth_token).await?.is_some() {
            warn!("Profile already exists for user {}", user.id);
            return Err(ProfileError::AlreadyExists);
        }

        let bootstrap = request.role == StaffRole::Receptionist
            && !self.has_approved_receptionist(auth_token).await?;
        let approval_status = if bootstrap {
            info!("No approved receptionist yet, auto-approving {}", user.id);
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        };

        let now = Utc::now().to_rfc3339();
        let profile_data = json!({
            "id": user.id,
            "full_name": request.full_name.trim(),
            "email": user.email.clone().unwrap_or_default(),
            "phone": request.phone,
            "role": request.role,
            "approval_status": approval_status,
            "specialization": request.specialization,
            "consultation_fee": request.consultation_fee,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/profiles",
            Some(auth_token),
            Some(profile_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        let profile = first_profile(result)?
            .ok_or_else(|| ProfileError::DatabaseError("Failed to create profile".to_string()))?;

        info!("Profile {} created with status {}", profile.id, profile.approval_status);
        Ok(profile)
    }

    async fn has_approved_receptionist(&self, auth_token: &str) -> Result<bool, ProfileError> {
        let path = "/rest/v1/profiles?role=eq.receptionist&approval_status=eq.approved&select=id&limit=1";
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }

    pub async fn update_profile(
        &self,
        profile_id: &str,
        request: UpdateProfileRequest,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        debug!("Updating profile: {}", profile_id);

        validate_fields(request.full_name.as_deref(), request.consultation_fee)?;

        let mut update_data = serde_json::Map::new();

        if let Some(full_name) = request.full_name {
            update_data.insert("full_name".to_string(), json!(full_name.trim()));
        }
        if let Some(phone) = request.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(specialization) = request.specialization {
            update_data.insert("specialization".to_string(), json!(specialization));
        }
        if let Some(fee) = request.consultation_fee {
            update_data.insert("consultation_fee".to_string(), json!(fee));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.patch_profile(profile_id, Value::Object(update_data), auth_token).await
    }

    async fn patch_profile(
        &self,
        profile_id: &str,
        body: Value,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        let path = format!("/rest/v1/profiles?id=eq.{}", profile_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        first_profile(result)?.ok_or(ProfileError::NotFound)
    }

    pub async fn list_profiles(
        &self,
        query: ProfileQuery,
        auth_token: &str,
    ) -> Result<Vec<Profile>, ProfileError> {
        debug!("Listing profiles with filters: {:?}", query);

        let mut query_parts = Vec::new();
        if let Some(role) = query.role {
            query_parts.push(format!("role=eq.{}", role));
        }
        if let Some(status) = query.approval_status {
            query_parts.push(format!("approval_status=eq.{}", status));
        }
        query_parts.push("order=full_name.asc".to_string());

        let path = format!("/rest/v1/profiles?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        parse_profiles(result)
    }

    pub async fn list_pending_doctors(&self, auth_token: &str) -> Result<Vec<Profile>, ProfileError> {
        self.list_profiles(ProfileQuery {
            role: Some(StaffRole::Doctor),
            approval_status: Some(ApprovalStatus::Pending),
        }, auth_token).await
    }

    pub async fn list_approved_doctors(&self, auth_token: &str) -> Result<Vec<Profile>, ProfileError> {
        self.list_profiles(ProfileQuery {
            role: Some(StaffRole::Doctor),
            approval_status: Some(ApprovalStatus::Approved),
        }, auth_token).await
    }

    pub async fn approve_profile(
        &self,
        profile_id: &str,
        reviewer: &Profile,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        self.review_profile(profile_id, reviewer, ApprovalStatus::Approved, None, auth_token).await
    }

    pub async fn reject_profile(
        &self,
        profile_id: &str,
        reviewer: &Profile,
        reason: &str,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ProfileError::ValidationError("A rejection reason is required".to_string()));
        }

        self.review_profile(profile_id, reviewer, ApprovalStatus::Rejected, Some(reason), auth_token).await
    }

    async fn review_profile(
        &self,
        profile_id: &str,
        reviewer: &Profile,
        decision: ApprovalStatus,
        reason: Option<&str>,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        if reviewer.is_user(profile_id) {
            return Err(ProfileError::SelfReview);
        }

        let target = self.get_profile(profile_id, auth_token).await?;
        if !target.approval_status.can_transition_to(decision) {
            warn!("Rejected review of {}: {} -> {}", profile_id, target.approval_status, decision);
            return Err(ProfileError::InvalidTransition {
                from: target.approval_status,
                to: decision,
            });
        }

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "approval_status": decision,
            "rejection_reason": reason,
            "reviewed_by": reviewer.id,
            "reviewed_at": now,
            "updated_at": now
        });

        let profile = self.patch_profile(profile_id, body, auth_token).await?;
        info!("Profile {} {} by {}", profile.id, decision, reviewer.id);
        Ok(profile)
    }

    /// The caller's profile, provided it has been approved.
    pub async fn require_approved(&self, user_id: &str, auth_token: &str) -> Result<Profile, ProfileError> {
        let profile = self.find_profile(user_id, auth_token)
            .await?
            .ok_or(ProfileError::ProfileMissing)?;

        if !profile.is_approved() {
            return Err(ProfileError::NotApproved);
        }

        Ok(profile)
    }

    pub async fn require_role(
        &self,
        user_id: &str,
        role: StaffRole,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        let profile = self.require_approved(user_id, auth_token).await?;
        if profile.role != role {
            return Err(ProfileError::InsufficientRole(role));
        }
        Ok(profile)
    }

    pub async fn require_receptionist(&self, user_id: &str, auth_token: &str) -> Result<Profile, ProfileError> {
        self.require_role(user_id, StaffRole::Receptionist, auth_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fields() {
        assert!(validate_fields(Some("Dr. Rao"), Some(300.0)).is_ok());
        assert!(validate_fields(None, None).is_ok());
        assert!(validate_fields(Some(" A "), None).is_err());
        assert!(validate_fields(Some("Dr. Rao"), Some(-1.0)).is_err());
        assert!(validate_fields(Some("Dr. Rao"), Some(f64::NAN)).is_err());
    }
}
