use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use profile_cell::services::ProfileService;

use crate::models::ReportFilter;
use crate::services::ReportService;

/// Doctors only ever see their own numbers; receptionists may pick a doctor.
async fn scoped_filter(
    config: &AppConfig,
    user: &User,
    token: &str,
    mut filter: ReportFilter,
) -> Result<ReportFilter, AppError> {
    let profile = ProfileService::new(config).require_approved(&user.id, token).await?;
    if profile.is_doctor() {
        filter.doctor_id = Some(profile.id);
    }
    Ok(filter)
}

fn clinic_today(config: &AppConfig) -> NaiveDate {
    config.schedule.local_date(Utc::now())
}

#[axum::debug_handler]
pub async fn get_dashboard(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let filter = scoped_filter(&state, &user, token, filter).await?;

    let service = ReportService::new(&state, token);
    let dashboard = service.dashboard(&filter, clinic_today(&state)).await?;

    Ok(Json(json!(dashboard)))
}

#[axum::debug_handler]
pub async fn get_revenue_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let filter = scoped_filter(&state, &user, token, filter).await?;

    let service = ReportService::new(&state, token);
    let report = service.revenue_report(&filter, clinic_today(&state)).await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn get_appointment_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let filter = scoped_filter(&state, &user, token, filter).await?;

    let service = ReportService::new(&state, token);
    let report = service.appointment_report(&filter, clinic_today(&state)).await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn get_patient_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let filter = scoped_filter(&state, &user, token, filter).await?;

    let service = ReportService::new(&state, token);
    let report = service.patient_report(&filter, clinic_today(&state)).await?;

    Ok(Json(json!({
        "range": report.range,
        "doctor_id": filter.doctor_id,
        "patients": report.patients
    })))
}
