use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use appointment_cell::models::Appointment;
use patient_cell::models::Patient;
use payment_cell::models::Payment;
use profile_cell::models::{ProfileQuery, StaffRole};
use profile_cell::services::ProfileService;
use shared_config::{AppConfig, ScheduleConfig};
use shared_database::supabase::SupabaseClient;

use crate::models::{ReportError, ReportRange};

/// Where report rows come from. `doctor_id` narrows payments and
/// appointments to one doctor.
#[async_trait]
pub trait ReportDataSource: Send + Sync {
    async fn payments_between(&self, range: &ReportRange, doctor_id: Option<Uuid>) -> Result<Vec<Payment>, ReportError>;

    async fn appointments_between(&self, range: &ReportRange, doctor_id: Option<Uuid>) -> Result<Vec<Appointment>, ReportError>;

    async fn patients(&self) -> Result<Vec<Patient>, ReportError>;

    async fn doctor_names(&self) -> Result<HashMap<Uuid, String>, ReportError>;
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>, ReportError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| ReportError::DatabaseError(format!("Failed to parse {}: {}", what, e)))
}

pub struct SupabaseReportSource {
    supabase: SupabaseClient,
    profiles: ProfileService,
    schedule: ScheduleConfig,
    auth_token: String,
}

impl SupabaseReportSource {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            profiles: ProfileService::new(config),
            schedule: config.schedule.clone(),
            auth_token: auth_token.to_string(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Value>, ReportError> {
        self.supabase
            .request(Method::GET, path, Some(&self.auth_token), None)
            .await
            .map_err(|e| ReportError::DatabaseError(e.to_string()))
    }
}

#[async_trait]
impl ReportDataSource for SupabaseReportSource {
    async fn payments_between(&self, range: &ReportRange, doctor_id: Option<Uuid>) -> Result<Vec<Payment>, ReportError> {
        let start = self.schedule.day_start_utc(range.from).to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = (self.schedule.day_start_utc(range.to) + Duration::days(1))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut path = format!(
            "/rest/v1/payments?paid_at=gte.{}&paid_at=lt.{}&order=paid_at.asc",
            urlencoding::encode(&start),
            urlencoding::encode(&end)
        );
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }

        debug!("Loading report payments {} to {}", range.from, range.to);
        parse_rows(self.fetch(&path).await?, "payments")
    }

    async fn appointments_between(&self, range: &ReportRange, doctor_id: Option<Uuid>) -> Result<Vec<Appointment>, ReportError> {
        let mut path = format!(
            "/rest/v1/appointments?appointment_date=gte.{}&appointment_date=lte.{}&order=appointment_date.asc,appointment_time.asc",
            range.from, range.to
        );
        if let Some(doctor_id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }

        debug!("Loading report appointments {} to {}", range.from, range.to);
        parse_rows(self.fetch(&path).await?, "appointments")
    }

    async fn patients(&self) -> Result<Vec<Patient>, ReportError> {
        parse_rows(self.fetch("/rest/v1/patients?order=created_at.asc").await?, "patients")
    }

    async fn doctor_names(&self) -> Result<HashMap<Uuid, String>, ReportError> {
        let doctors = self.profiles
            .list_profiles(ProfileQuery {
                role: Some(StaffRole::Doctor),
                approval_status: None,
            }, &self.auth_token)
            .await
            .map_err(|e| ReportError::DatabaseError(e.to_string()))?;

        Ok(doctors.into_iter().map(|d| (d.id, d.full_name)).collect())
    }
}

/// Process-local source backed by plain vectors.
#[derive(Debug, Clone)]
pub struct InMemoryReportSource {
    schedule: ScheduleConfig,
    payments: Arc<Mutex<Vec<Payment>>>,
    appointments: Arc<Mutex<Vec<Appointment>>>,
    patients: Arc<Mutex<Vec<Patient>>>,
    doctors: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl Default for InMemoryReportSource {
    fn default() -> Self {
        Self::new(ScheduleConfig::default())
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::DatabaseError(format!("Report store lock poisoned: {}", e))
}

impl InMemoryReportSource {
    pub fn new(schedule: ScheduleConfig) -> Self {
        Self {
            schedule,
            payments: Arc::new(Mutex::new(Vec::new())),
            appointments: Arc::new(Mutex::new(Vec::new())),
            patients: Arc::new(Mutex::new(Vec::new())),
            doctors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn add_payment(&self, payment: Payment) -> Result<(), ReportError> {
        self.payments.lock().map_err(lock_error)?.push(payment);
        Ok(())
    }

    pub fn add_appointment(&self, appointment: Appointment) -> Result<(), ReportError> {
        self.appointments.lock().map_err(lock_error)?.push(appointment);
        Ok(())
    }

    pub fn add_patient(&self, patient: Patient) -> Result<(), ReportError> {
        self.patients.lock().map_err(lock_error)?.push(patient);
        Ok(())
    }

    pub fn add_doctor(&self, doctor_id: Uuid, name: &str) -> Result<(), ReportError> {
        self.doctors.lock().map_err(lock_error)?.insert(doctor_id, name.to_string());
        Ok(())
    }
}

#[async_trait]
impl ReportDataSource for InMemoryReportSource {
    async fn payments_between(&self, range: &ReportRange, doctor_id: Option<Uuid>) -> Result<Vec<Payment>, ReportError> {
        let store = self.payments.lock().map_err(lock_error)?;
        Ok(store
            .iter()
            .filter(|p| range.contains(self.schedule.local_date(p.paid_at)))
            .filter(|p| doctor_id.map_or(true, |id| p.doctor_id == id))
            .cloned()
            .collect())
    }

    async fn appointments_between(&self, range: &ReportRange, doctor_id: Option<Uuid>) -> Result<Vec<Appointment>, ReportError> {
        let store = self.appointments.lock().map_err(lock_error)?;
        Ok(store
            .iter()
            .filter(|a| range.contains(a.appointment_date))
            .filter(|a| doctor_id.map_or(true, |id| a.doctor_id == id))
            .cloned()
            .collect())
    }

    async fn patients(&self) -> Result<Vec<Patient>, ReportError> {
        Ok(self.patients.lock().map_err(lock_error)?.clone())
    }

    async fn doctor_names(&self) -> Result<HashMap<Uuid, String>, ReportError> {
        Ok(self.doctors.lock().map_err(lock_error)?.clone())
    }
}
