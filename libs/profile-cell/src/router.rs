use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn profile_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_profile).get(handlers::list_profiles))
        .route("/me", get(handlers::get_my_profile).put(handlers::update_my_profile))
        .route("/doctors", get(handlers::list_doctors))
        .route("/pending", get(handlers::list_pending))
        .route("/{profile_id}", get(handlers::get_profile))
        .route("/{profile_id}/approve", post(handlers::approve_profile))
        .route("/{profile_id}/reject", post(handlers::reject_profile))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
