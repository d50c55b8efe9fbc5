use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::record_payment).get(handlers::list_payments))
        .route("/{payment_id}", get(handlers::get_payment))
        .route("/appointment/{appointment_id}", get(handlers::get_appointment_payments))
        .route("/{payment_id}/refund", post(handlers::refund_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
