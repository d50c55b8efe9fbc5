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

use crate::models::{CreatePatientRequest, UpdatePatientRequest, PatientSearchQuery};
use crate::services::PatientService;

#[axum::debug_handler]
pub async fn create_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ProfileService::new(&config).require_approved(&user.id, token).await?;

    let service = PatientService::new(&config);
    let patient = service.create_patient(request, Some(&user.id), token).await?;

    Ok(Json(json!({
        "success": true,
        "patient": patient,
        "message": "Patient registered"
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ProfileService::new(&config).require_approved(&user.id, token).await?;

    let service = PatientService::new(&config);
    let patient = service.get_patient(patient_id, token).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ProfileService::new(&config).require_approved(&user.id, token).await?;

    let service = PatientService::new(&config);
    let patient = service.update_patient(patient_id, request, token).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ProfileService::new(&config).require_approved(&user.id, token).await?;

    let service = PatientService::new(&config);
    let patients = service.search_patients(query, token).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    ProfileService::new(&config).require_receptionist(&user.id, token).await?;

    let service = PatientService::new(&config);
    let patient = service.delete_patient(patient_id, token).await?;

    Ok(Json(json!({
        "success": true,
        "patient_id": patient.id,
        "message": "Patient deleted"
    })))
}
