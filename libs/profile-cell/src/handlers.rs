use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateProfileRequest, ProfileQuery, RejectProfileRequest, UpdateProfileRequest};
use crate::services::ProfileService;

#[axum::debug_handler]
pub async fn create_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&state);

    let profile = service.create_profile(&user, request, auth.token()).await?;

    let message = if profile.is_approved() {
        "Profile created and approved"
    } else {
        "Profile created and awaiting approval"
    };

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "message": message
    })))
}

#[axum::debug_handler]
pub async fn get_my_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&state);
    let profile = service.get_profile(&user.id, auth.token()).await?;
    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn update_my_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&state);
    let profile = service.update_profile(&user.id, request, auth.token()).await?;
    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn list_profiles(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProfileService::new(&state);
    service.require_receptionist(&user.id, token).await?;

    let profiles = service.list_profiles(query, token).await?;

    Ok(Json(json!({
        "profiles": profiles,
        "total": profiles.len()
    })))
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProfileService::new(&state);
    service.require_approved(&user.id, token).await?;

    let doctors = service.list_approved_doctors(token).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn list_pending(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProfileService::new(&state);
    service.require_receptionist(&user.id, token).await?;

    let pending = service.list_pending_doctors(token).await?;

    Ok(Json(json!({
        "profiles": pending,
        "total": pending.len()
    })))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<Arc<AppConfig>>,
    Path(profile_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProfileService::new(&state);
    service.require_approved(&user.id, token).await?;

    let profile = service.get_profile(&profile_id.to_string(), token).await?;
    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn approve_profile(
    State(state): State<Arc<AppConfig>>,
    Path(profile_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProfileService::new(&state);
    let reviewer = service.require_receptionist(&user.id, token).await?;

    let profile = service.approve_profile(&profile_id.to_string(), &reviewer, token).await?;

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "message": "Profile approved"
    })))
}

#[axum::debug_handler]
pub async fn reject_profile(
    State(state): State<Arc<AppConfig>>,
    Path(profile_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RejectProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProfileService::new(&state);
    let reviewer = service.require_receptionist(&user.id, token).await?;

    let profile = service.reject_profile(&profile_id.to_string(), &reviewer, &request.reason, token).await?;

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "message": "Profile rejected"
    })))
}
