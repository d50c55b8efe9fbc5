use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::bearer_token;
use shared_utils::jwt::validate_token as decode_token;
use profile_cell::services::ProfileService;

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = bearer_token(&headers)?;
    let user = decode_token(&token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id,
        email: user.email,
        role: user.role,
    }))
}

/// Answers `{"valid": false}` instead of failing.
pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Json<Value> {
    let valid = bearer_token(&headers)
        .ok()
        .map(|token| decode_token(&token, &config.supabase_jwt_secret).is_ok())
        .unwrap_or(false);

    debug!("Token verification result: {}", valid);
    Json(json!({ "valid": valid }))
}

#[axum::debug_handler]
pub async fn current_user(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Resolving current user: {}", user.id);

    let profile = ProfileService::new(&config)
        .find_profile(&user.id, auth.token())
        .await?;

    Ok(Json(json!({
        "user_id": user.id,
        "email": user.email,
        "profile": profile
    })))
}
