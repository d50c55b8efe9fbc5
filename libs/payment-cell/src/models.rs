use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::AppointmentStatus;
use shared_models::error::AppError;

pub const MAX_PAYMENT_AMOUNT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Insurance,
    BankTransfer,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Upi => write!(f, "upi"),
            PaymentMethod::Insurance => write!(f, "insurance"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub paid_at: DateTime<Utc>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub appointment_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentQuery {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundPaymentRequest {
    pub reason: String,
}

pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Rounds to cents and enforces the accepted range.
pub fn normalize_amount(amount: f64) -> Result<f64, PaymentError> {
    if !amount.is_finite() {
        return Err(PaymentError::InvalidAmount("Amount must be a number".to_string()));
    }

    let rounded = round_money(amount);
    if rounded <= 0.0 {
        return Err(PaymentError::InvalidAmount("Amount must be greater than zero".to_string()));
    }
    if rounded > MAX_PAYMENT_AMOUNT {
        return Err(PaymentError::InvalidAmount(format!(
            "Amount cannot exceed {:.2}",
            MAX_PAYMENT_AMOUNT
        )));
    }

    Ok(rounded)
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Payments can only be recorded for completed appointments (status: {0})")]
    AppointmentNotCompleted(AppointmentStatus),

    #[error("Appointment has already been paid")]
    AlreadyPaid,

    #[error("Only paid payments can be refunded")]
    NotRefundable,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unauthorized access to payment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        let message = error.to_string();
        match error {
            PaymentError::NotFound | PaymentError::AppointmentNotFound => AppError::NotFound(message),
            PaymentError::AlreadyPaid | PaymentError::NotRefundable => AppError::Conflict(message),
            PaymentError::AppointmentNotCompleted(_) => AppError::BadRequest(message),
            PaymentError::Unauthorized => AppError::Forbidden(message),
            PaymentError::InvalidAmount(_) => AppError::ValidationError(message),
            PaymentError::ValidationError(msg) => AppError::ValidationError(msg),
            PaymentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_summed_amounts_rounded_to_cents() {
        assert_ne!(0.1 + 0.2, 0.3);
        assert_eq!(round_money(0.1 + 0.2), 0.3);
        let total: f64 = [0.1, 0.2, 19.99].iter().sum();
        assert_eq!(round_money(total), 20.29);
    }

    #[test]
    fn test_amount_rounded_to_cents() {
        assert_eq!(normalize_amount(499.999).unwrap(), 500.0);
        assert_eq!(normalize_amount(120.456).unwrap(), 120.46);
        assert_eq!(normalize_amount(MAX_PAYMENT_AMOUNT).unwrap(), MAX_PAYMENT_AMOUNT);
    }

    #[test]
    fn test_amount_bounds() {
        assert_matches!(normalize_amount(0.0), Err(PaymentError::InvalidAmount(_)));
        assert_matches!(normalize_amount(-10.0), Err(PaymentError::InvalidAmount(_)));
        assert_matches!(normalize_amount(0.004), Err(PaymentError::InvalidAmount(_)));
        assert_matches!(normalize_amount(1_000_000.01), Err(PaymentError::InvalidAmount(_)));
        assert_matches!(normalize_amount(f64::NAN), Err(PaymentError::InvalidAmount(_)));
        assert_matches!(normalize_amount(f64::INFINITY), Err(PaymentError::InvalidAmount(_)));
    }

    #[test]
    fn test_method_wire_names() {
        assert_eq!(serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(), "\"bank_transfer\"");
        assert_eq!(PaymentMethod::Upi.to_string(), "upi");
    }
}
