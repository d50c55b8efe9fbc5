// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
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

use crate::models::{
    AppointmentError, AppointmentQuery, BookAppointmentRequest, CalendarQuery,
    CancelAppointmentRequest, RescheduleAppointmentRequest, SlotQuery, UpdateNotesRequest,
    UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

/// Approved staff only. Doctors are confined to their own appointments,
/// which the returned scope expresses.
async fn doctor_scope(config: &AppConfig, user: &User, token: &str) -> Result<Option<Uuid>, AppError> {
    let profile = ProfileService::new(config).require_approved(&user.id, token).await?;
    Ok(profile.is_doctor().then_some(profile.id))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if let Some(doctor_id) = doctor_scope(&state, &user, token).await? {
        if request.doctor_id != doctor_id {
            return Err(AppointmentError::Unauthorized.into());
        }
    }

    let service = AppointmentBookingService::new(&state);
    let appointment = service.book_appointment(request, Some(&user.id), token).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if let Some(doctor_id) = doctor_scope(&state, &user, token).await? {
        query.doctor_id = Some(doctor_id);
    }

    let service = AppointmentBookingService::new(&state);
    let appointments = service.list_appointments(query, token).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_day_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    doctor_scope(&state, &user, token).await?;

    let service = AppointmentBookingService::new(&state);
    let schedule = service.day_slots(query.doctor_id, query.date, token).await?;

    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn get_calendar(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let doctor_id = doctor_scope(&state, &user, token).await?.or(query.doctor_id);

    let service = AppointmentBookingService::new(&state);
    let calendar = service.month_calendar(query.year, query.month, doctor_id, token).await?;

    Ok(Json(json!(calendar)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = doctor_scope(&state, &user, token).await?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.get_appointment(appointment_id, scope, token).await?;
    let no_show_due = service.is_no_show_due(&appointment);

    Ok(Json(json!({
        "appointment": appointment,
        "no_show_due": no_show_due
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = doctor_scope(&state, &user, token).await?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.update_status(appointment_id, request.status, scope, token).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = doctor_scope(&state, &user, token).await?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.reschedule_appointment(appointment_id, request, scope, token).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = doctor_scope(&state, &user, token).await?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.cancel_appointment(appointment_id, &request.reason, scope, token).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn update_notes(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let scope = doctor_scope(&state, &user, token).await?;

    let service = AppointmentBookingService::new(&state);
    let appointment = service.update_notes(appointment_id, request.notes, scope, token).await?;

    Ok(Json(json!(appointment)))
}
