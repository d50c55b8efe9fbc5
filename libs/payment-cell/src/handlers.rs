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
use profile_cell::services::ProfileService;
use appointment_cell::services::AppointmentBookingService;

use crate::models::{round_money, PaymentError, PaymentQuery, RecordPaymentRequest, RefundPaymentRequest};
use crate::services::PaymentService;

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let profile = ProfileService::new(&state).require_approved(&user.id, token).await?;
    let doctor_scope = profile.is_doctor().then_some(profile.id);

    let service = PaymentService::new(&state);
    let payment = service.record_payment(request, Some(&user.id), doctor_scope, token).await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "message": "Payment recorded"
    })))
}

#[axum::debug_handler]
pub async fn list_payments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<PaymentQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let profile = ProfileService::new(&state).require_approved(&user.id, token).await?;
    if profile.is_doctor() {
        query.doctor_id = Some(profile.id);
    }

    let service = PaymentService::new(&state);
    let payments = service.list_payments(query, token).await?;
    let total_amount = round_money(payments.iter().filter(|p| p.is_paid()).map(|p| p.amount).sum());

    Ok(Json(json!({
        "payments": payments,
        "total": payments.len(),
        "total_amount": total_amount
    })))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let profile = ProfileService::new(&state).require_approved(&user.id, token).await?;

    let service = PaymentService::new(&state);
    let payment = service.get_payment(payment_id, token).await?;

    if profile.is_doctor() && payment.doctor_id != profile.id {
        return Err(PaymentError::Unauthorized.into());
    }

    Ok(Json(json!(payment)))
}

#[axum::debug_handler]
pub async fn get_appointment_payments(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let profile = ProfileService::new(&state).require_approved(&user.id, token).await?;
    let doctor_scope = profile.is_doctor().then_some(profile.id);

    AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, doctor_scope, token)
        .await?;

    let service = PaymentService::new(&state);
    let payments = service.payments_for_appointment(appointment_id, token).await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "payments": payments,
        "is_paid": payments.iter().any(|p| p.is_paid())
    })))
}

#[axum::debug_handler]
pub async fn refund_payment(
    State(state): State<Arc<AppConfig>>,
    Path(payment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ProfileService::new(&state).require_receptionist(&user.id, token).await?;

    let service = PaymentService::new(&state);
    let payment = service.refund_payment(payment_id, &request.reason, token).await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "message": "Payment refunded"
    })))
}
