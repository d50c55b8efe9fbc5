use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::StatusCounts;
use patient_cell::models::Gender;
use payment_cell::models::PaymentMethod;
use shared_models::error::AppError;

pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportPreset {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
    #[serde(rename = "this_month")]
    ThisMonth,
    #[serde(rename = "this_year")]
    ThisYear,
    #[serde(rename = "custom")]
    Custom,
}

/// Inclusive range of clinic calendar days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ReportRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ReportError> {
        if from > to {
            return Err(ReportError::InvalidRange(format!("{} is after {}", from, to)));
        }
        if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
            return Err(ReportError::InvalidRange(format!(
                "Reports cover at most {} days",
                MAX_RANGE_DAYS
            )));
        }
        Ok(Self { from, to })
    }

    pub fn from_preset(preset: ReportPreset, today: NaiveDate) -> Result<Self, ReportError> {
        let from = match preset {
            ReportPreset::Today => today,
            ReportPreset::Last7Days => today - Duration::days(6),
            ReportPreset::Last30Days => today - Duration::days(29),
            ReportPreset::ThisMonth => today.with_day(1).unwrap_or(today),
            ReportPreset::ThisYear => today.with_ordinal(1).unwrap_or(today),
            ReportPreset::Custom => {
                return Err(ReportError::InvalidRange(
                    "A custom range needs both from and to".to_string(),
                ))
            }
        };
        Self::new(from, today)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    /// First day of the bucket holding `date`. Weeks start on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn next_bucket(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Granularity::Day => start.succ_opt(),
            Granularity::Week => start.checked_add_signed(Duration::days(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
        }
    }

    /// Every bucket start covering the range, in order.
    pub fn buckets(&self, range: &ReportRange) -> Vec<NaiveDate> {
        let mut buckets = Vec::new();
        let mut cursor = Some(self.bucket_start(range.from));
        while let Some(start) = cursor.filter(|start| *start <= range.to) {
            buckets.push(start);
            cursor = self.next_bucket(start);
        }
        buckets
    }
}

/// Query parameters shared by every report endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    pub preset: Option<ReportPreset>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub granularity: Option<Granularity>,
    pub doctor_id: Option<Uuid>,
}

impl ReportFilter {
    /// Explicit bounds win over the preset; with neither, the last 30 days.
    pub fn resolve_range(&self, today: NaiveDate) -> Result<ReportRange, ReportError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => ReportRange::new(from, to),
            (None, None) => ReportRange::from_preset(self.preset.unwrap_or(ReportPreset::Last30Days), today),
            _ => Err(ReportError::InvalidRange("from and to must be given together".to_string())),
        }
    }
}

// ==============================================================================
// REPORT OUTPUTS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevenueSummary {
    pub total_revenue: f64,
    pub payment_count: u32,
    pub average_payment: f64,
    pub refunded_amount: f64,
    pub refunded_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodBreakdown {
    pub payment_method: PaymentMethod,
    pub count: u32,
    pub amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenuePoint {
    pub period_start: NaiveDate,
    pub amount: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorRevenue {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub amount: f64,
    pub payments: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSummary {
    pub total: u32,
    pub by_status: StatusCounts,
    pub completion_rate: f64,
    pub cancellation_rate: f64,
    pub no_show_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourCount {
    pub hour: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgeGroup {
    #[serde(rename = "0-17")]
    Child,
    #[serde(rename = "18-30")]
    YoungAdult,
    #[serde(rename = "31-45")]
    Adult,
    #[serde(rename = "46-60")]
    MiddleAged,
    #[serde(rename = "61+")]
    Senior,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 6] = [
        AgeGroup::Child,
        AgeGroup::YoungAdult,
        AgeGroup::Adult,
        AgeGroup::MiddleAged,
        AgeGroup::Senior,
        AgeGroup::Unknown,
    ];

    pub fn of(age: Option<u32>) -> Self {
        match age {
            None => AgeGroup::Unknown,
            Some(0..=17) => AgeGroup::Child,
            Some(18..=30) => AgeGroup::YoungAdult,
            Some(31..=45) => AgeGroup::Adult,
            Some(46..=60) => AgeGroup::MiddleAged,
            Some(_) => AgeGroup::Senior,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenderCount {
    pub gender: Gender,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgeGroupCount {
    pub age_group: AgeGroup,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientAnalytics {
    pub patients_seen: u32,
    pub new_patients: u32,
    pub returning_patients: u32,
    pub genders: Vec<GenderCount>,
    pub age_groups: Vec<AgeGroupCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueReport {
    pub range: ReportRange,
    pub granularity: Granularity,
    pub summary: RevenueSummary,
    pub payment_methods: Vec<MethodBreakdown>,
    pub series: Vec<RevenuePoint>,
    pub by_doctor: Vec<DoctorRevenue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentReport {
    pub range: ReportRange,
    pub summary: AppointmentSummary,
    pub peak_hours: Vec<HourCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientReport {
    pub range: ReportRange,
    pub patients: PatientAnalytics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub range: ReportRange,
    pub doctor_id: Option<Uuid>,
    pub revenue: RevenueReport,
    pub appointments: AppointmentReport,
    pub patients: PatientAnalytics,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid report range: {0}")]
    InvalidRange(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<ReportError> for AppError {
    fn from(error: ReportError) -> Self {
        let message = error.to_string();
        match error {
            ReportError::InvalidRange(_) => AppError::BadRequest(message),
            ReportError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
