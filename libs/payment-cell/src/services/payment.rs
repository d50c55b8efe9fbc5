use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::{AppConfig, ScheduleConfig};
use shared_database::supabase::SupabaseClient;
use appointment_cell::models::{AppointmentError, AppointmentStatus};
use appointment_cell::services::AppointmentBookingService;

use crate::models::{normalize_amount, Payment, PaymentError, PaymentQuery, PaymentStatus, RecordPaymentRequest};

const DEFAULT_LIST_LIMIT: i32 = 100;
const MAX_LIST_LIMIT: i32 = 500;

fn parse_payments(rows: Vec<Value>) -> Result<Vec<Payment>, PaymentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Payment>, _>>()
        .map_err(|e| PaymentError::DatabaseError(format!("Failed to parse payments: {}", e)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct PaymentService {
    supabase: SupabaseClient,
    appointments: AppointmentBookingService,
    schedule: ScheduleConfig,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            appointments: AppointmentBookingService::new(config),
            schedule: config.schedule.clone(),
        }
    }

    /// Record the payment for a completed visit. Patient and doctor are taken
    /// from the appointment, never from the caller. A doctor scope limits the
    /// caller to their own appointments.
    pub async fn record_payment(
        &self,
        request: RecordPaymentRequest,
        recorded_by: Option<&str>,
        doctor_scope: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let amount = normalize_amount(request.amount)?;
        debug!("Recording payment of {:.2} for appointment {}", amount, request.appointment_id);

        let appointment = self.appointments
            .get_appointment(request.appointment_id, doctor_scope, auth_token)
            .await
            .map_err(|e| match e {
                AppointmentError::NotFound => PaymentError::AppointmentNotFound,
                AppointmentError::Unauthorized => PaymentError::Unauthorized,
                other => PaymentError::DatabaseError(other.to_string()),
            })?;

        if appointment.status != AppointmentStatus::Completed {
            warn!("Payment rejected: appointment {} is {}", appointment.id, appointment.status);
            return Err(PaymentError::AppointmentNotCompleted(appointment.status));
        }

        let existing = self.payments_for_appointment(appointment.id, auth_token).await?;
        if existing.iter().any(Payment::is_paid) {
            warn!("Appointment {} already has a paid payment", appointment.id);
            return Err(PaymentError::AlreadyPaid);
        }

        let now = Utc::now();
        let payment_data = json!({
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "amount": amount,
            "payment_method": request.payment_method,
            "status": PaymentStatus::Paid,
            "reference": non_blank(request.reference),
            "notes": non_blank(request.notes),
            "recorded_by": recorded_by,
            "paid_at": request.paid_at.unwrap_or(now).to_rfc3339(),
            "created_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/payments",
            Some(auth_token),
            Some(payment_data),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let payment = parse_payments(result)?
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::DatabaseError("Failed to record payment".to_string()))?;

        info!("Payment {} of {:.2} recorded via {}", payment.id, payment.amount, payment.payment_method);
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: Uuid, auth_token: &str) -> Result<Payment, PaymentError> {
        debug!("Fetching payment: {}", payment_id);

        let path = format!("/rest/v1/payments?id=eq.{}", payment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        parse_payments(result)?
            .into_iter()
            .next()
            .ok_or(PaymentError::NotFound)
    }

    pub async fn payments_for_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Payment>, PaymentError> {
        let path = format!(
            "/rest/v1/payments?appointment_id=eq.{}&order=paid_at.desc",
            appointment_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        parse_payments(result)
    }

    /// Newest first. Date filters are clinic calendar days on `paid_at`.
    pub async fn list_payments(
        &self,
        query: PaymentQuery,
        auth_token: &str,
    ) -> Result<Vec<Payment>, PaymentError> {
        debug!("Listing payments with filters: {:?}", query);

        if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
            if from > to {
                return Err(PaymentError::ValidationError("from_date must not be after to_date".to_string()));
            }
        }

        let mut query_parts = Vec::new();

        if let Some(from_date) = query.from_date {
            let start = self.schedule.day_start_utc(from_date).to_rfc3339_opts(SecondsFormat::Secs, true);
            query_parts.push(format!("paid_at=gte.{}", urlencoding::encode(&start)));
        }
        if let Some(to_date) = query.to_date {
            let end = (self.schedule.day_start_utc(to_date) + Duration::days(1))
                .to_rfc3339_opts(SecondsFormat::Secs, true);
            query_parts.push(format!("paid_at=lt.{}", urlencoding::encode(&end)));
        }
        if let Some(method) = query.payment_method {
            query_parts.push(format!("payment_method=eq.{}", method));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        query_parts.push("order=paid_at.desc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        let path = format!("/rest/v1/payments?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        parse_payments(result)
    }

    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PaymentError::ValidationError("Refund reason is required".to_string()));
        }

        let payment = self.get_payment(payment_id, auth_token).await?;
        if !payment.is_paid() {
            return Err(PaymentError::NotRefundable);
        }

        let path = format!("/rest/v1/payments?id=eq.{}", payment_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({
                "status": PaymentStatus::Refunded,
                "refund_reason": reason,
                "refunded_at": Utc::now().to_rfc3339()
            })),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let refunded = parse_payments(result)?
            .into_iter()
            .next()
            .ok_or(PaymentError::NotFound)?;

        info!("Payment {} refunded", refunded.id);
        Ok(refunded)
    }
}
