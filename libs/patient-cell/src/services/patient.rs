use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use shared_config::{AppConfig, ScheduleConfig};
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, CreatePatientRequest, UpdatePatientRequest, PatientSearchQuery, PatientError};
use crate::services::validation::PatientValidator;

const DEFAULT_SEARCH_LIMIT: i32 = 50;
const MAX_SEARCH_LIMIT: i32 = 200;

pub struct PatientService {
    supabase: SupabaseClient,
    schedule: ScheduleConfig,
}

fn parse_patients(rows: Vec<Value>) -> Result<Vec<Patient>, PatientError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Patient>, _>>()
        .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
}

/// Blank strings clear an optional column.
fn optional_text(value: String) -> Value {
    if value.trim().is_empty() {
        Value::Null
    } else {
        json!(value)
    }
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedule: config.schedule.clone(),
        }
    }

    /// Date-of-birth checks run against the clinic's calendar day.
    fn clinic_today(&self) -> NaiveDate {
        self.schedule.local_date(Utc::now())
    }

    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
        created_by: Option<&str>,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let request = PatientValidator::new()?
            .validate_create(request, self.clinic_today())?;

        debug!("Registering patient {}", request.full_name);

        self.ensure_phone_available(&request.phone, None, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "full_name": request.full_name,
            "phone": request.phone,
            "email": request.email,
            "date_of_birth": request.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            "gender": request.gender,
            "address": request.address,
            "blood_group": request.blood_group,
            "medical_history": request.medical_history,
            "emergency_contact": request.emergency_contact,
            "created_by": created_by,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            Some(patient_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let patient = parse_patients(result)?
            .into_iter()
            .next()
            .ok_or_else(|| PatientError::DatabaseError("Failed to create patient".to_string()))?;

        info!("Patient registered with ID: {}", patient.id);
        Ok(patient)
    }

    async fn ensure_phone_available(
        &self,
        phone: &str,
        exclude_patient_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        let mut path = format!(
            "/rest/v1/patients?phone=eq.{}&select=id",
            urlencoding::encode(phone)
        );
        if let Some(patient_id) = exclude_patient_id {
            path.push_str(&format!("&id=neq.{}", patient_id));
        }

        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            warn!("Phone {} is already registered", phone);
            return Err(PatientError::PhoneAlreadyRegistered { phone: phone.to_string() });
        }

        Ok(())
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        parse_patients(result)?
            .into_iter()
            .next()
            .ok_or(PatientError::NotFound)
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient: {}", patient_id);

        let request = PatientValidator::new()?
            .validate_update(request, self.clinic_today())?;

        if let Some(phone) = &request.phone {
            self.ensure_phone_available(phone, Some(patient_id), auth_token).await?;
        }

        let mut update_data = serde_json::Map::new();

        if let Some(full_name) = request.full_name {
            update_data.insert("full_name".to_string(), json!(full_name));
        }
        if let Some(phone) = request.phone {
            update_data.insert("phone".to_string(), json!(phone));
        }
        if let Some(email) = request.email {
            update_data.insert("email".to_string(), optional_text(email));
        }
        if let Some(dob) = request.date_of_birth {
            update_data.insert("date_of_birth".to_string(), json!(dob.format("%Y-%m-%d").to_string()));
        }
        if let Some(gender) = request.gender {
            update_data.insert("gender".to_string(), json!(gender));
        }
        if let Some(address) = request.address {
            update_data.insert("address".to_string(), optional_text(address));
        }
        if let Some(blood_group) = request.blood_group {
            update_data.insert("blood_group".to_string(), optional_text(blood_group));
        }
        if let Some(history) = request.medical_history {
            update_data.insert("medical_history".to_string(), optional_text(history));
        }
        if let Some(contact) = request.emergency_contact {
            update_data.insert("emergency_contact".to_string(), optional_text(contact));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        parse_patients(result)?
            .into_iter()
            .next()
            .ok_or(PatientError::NotFound)
    }

    pub async fn search_patients(
        &self,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        debug!("Searching patients with query: {:?}", query);

        let mut query_parts = vec![];

        if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            query_parts.push(format!("full_name=ilike.*{}*", urlencoding::encode(name)));
        }
        if let Some(phone) = query.phone.as_deref() {
            let digits = PatientValidator::normalize_phone(phone);
            if !digits.is_empty() {
                query_parts.push(format!("phone=like.*{}*", urlencoding::encode(&digits)));
            }
        }

        let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        query_parts.push("order=created_at.desc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        let path = format!("/rest/v1/patients?{}", query_parts.join("&"));

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        parse_patients(result)
    }

    /// Deletes a patient record that no appointment refers to.
    pub async fn delete_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Deleting patient: {}", patient_id);

        let appointments_path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&select=id&limit=1",
            patient_id
        );
        let appointments: Vec<Value> = self.supabase.request(
            Method::GET,
            &appointments_path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if !appointments.is_empty() {
            return Err(PatientError::HasAppointments);
        }

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let deleted = parse_patients(result)?
            .into_iter()
            .next()
            .ok_or(PatientError::NotFound)?;

        info!("Patient {} deleted", deleted.id);
        Ok(deleted)
    }
}
