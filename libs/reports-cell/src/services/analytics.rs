use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, Timelike};
use uuid::Uuid;

use appointment_cell::models::{Appointment, StatusCounts};
use patient_cell::models::{Gender, Patient};
use payment_cell::models::{Payment, PaymentMethod, PaymentStatus};
use shared_config::ScheduleConfig;

use crate::models::{
    AgeGroup, AgeGroupCount, AppointmentSummary, DoctorRevenue, GenderCount, Granularity,
    HourCount, MethodBreakdown, PatientAnalytics, ReportRange, RevenuePoint, RevenueSummary,
};

pub const UNKNOWN_DOCTOR: &str = "Unknown doctor";

fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn rate(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(part) / f64::from(total) * 10_000.0).round() / 10_000.0
}

/// Pure aggregations over one report range. Payment and patient timestamps
/// are bucketed by the clinic's local calendar day.
pub struct Analytics<'a> {
    range: ReportRange,
    schedule: &'a ScheduleConfig,
}

impl<'a> Analytics<'a> {
    pub fn new(range: ReportRange, schedule: &'a ScheduleConfig) -> Self {
        Self { range, schedule }
    }

    pub fn range(&self) -> ReportRange {
        self.range
    }

    fn paid_on(&self, payment: &Payment) -> NaiveDate {
        self.schedule.local_date(payment.paid_at)
    }

    fn in_range<'p>(&'p self, payments: &'p [Payment]) -> impl Iterator<Item = &'p Payment> + 'p {
        payments.iter().filter(move |p| self.range.contains(self.paid_on(p)))
    }

    fn paid_in_range<'p>(&'p self, payments: &'p [Payment]) -> impl Iterator<Item = &'p Payment> + 'p {
        self.in_range(payments).filter(|p| p.is_paid())
    }

    fn appointments_in_range<'p>(
        &'p self,
        appointments: &'p [Appointment],
    ) -> impl Iterator<Item = &'p Appointment> + 'p {
        appointments
            .iter()
            .filter(move |a| self.range.contains(a.appointment_date))
    }

    pub fn revenue_summary(&self, payments: &[Payment]) -> RevenueSummary {
        let mut summary = RevenueSummary::default();
        let mut total = 0.0;
        let mut refunded = 0.0;

        for payment in self.in_range(payments) {
            match payment.status {
                PaymentStatus::Paid => {
                    total += payment.amount;
                    summary.payment_count += 1;
                }
                PaymentStatus::Refunded => {
                    refunded += payment.amount;
                    summary.refunded_count += 1;
                }
            }
        }

        summary.total_revenue = round_money(total);
        summary.refunded_amount = round_money(refunded);
        if summary.payment_count > 0 {
            summary.average_payment = round_money(total / f64::from(summary.payment_count));
        }
        summary
    }

    pub fn payment_method_breakdown(&self, payments: &[Payment]) -> Vec<MethodBreakdown> {
        let mut by_method: HashMap<PaymentMethod, (u32, f64)> = HashMap::new();
        for payment in self.paid_in_range(payments) {
            let entry = by_method.entry(payment.payment_method).or_default();
            entry.0 += 1;
            entry.1 += payment.amount;
        }

        let total: f64 = by_method.values().map(|(_, amount)| amount).sum();
        let mut rows: Vec<MethodBreakdown> = by_method
            .into_iter()
            .map(|(method, (count, amount))| MethodBreakdown {
                payment_method: method,
                count,
                amount: round_money(amount),
                percentage: if total > 0.0 { round_money(amount / total * 100.0) } else { 0.0 },
            })
            .collect();

        rows.sort_by(|a, b| {
            b.amount
                .total_cmp(&a.amount)
                .then_with(|| a.payment_method.cmp(&b.payment_method))
        });
        rows
    }

    pub fn revenue_series(&self, payments: &[Payment], granularity: Granularity) -> Vec<RevenuePoint> {
        let mut buckets: BTreeMap<NaiveDate, (f64, u32)> = granularity
            .buckets(&self.range)
            .into_iter()
            .map(|start| (start, (0.0, 0)))
            .collect();

        for payment in self.paid_in_range(payments) {
            let start = granularity.bucket_start(self.paid_on(payment));
            if let Some(bucket) = buckets.get_mut(&start) {
                bucket.0 += payment.amount;
                bucket.1 += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(period_start, (amount, count))| RevenuePoint {
                period_start,
                amount: round_money(amount),
                count,
            })
            .collect()
    }

    pub fn revenue_by_doctor(
        &self,
        payments: &[Payment],
        doctor_names: &HashMap<Uuid, String>,
    ) -> Vec<DoctorRevenue> {
        let mut by_doctor: HashMap<Uuid, (f64, u32)> = HashMap::new();
        for payment in self.paid_in_range(payments) {
            let entry = by_doctor.entry(payment.doctor_id).or_default();
            entry.0 += payment.amount;
            entry.1 += 1;
        }

        let mut rows: Vec<DoctorRevenue> = by_doctor
            .into_iter()
            .map(|(doctor_id, (amount, payments))| DoctorRevenue {
                doctor_id,
                doctor_name: doctor_names
                    .get(&doctor_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string()),
                amount: round_money(amount),
                payments,
            })
            .collect();

        rows.sort_by(|a, b| {
            b.amount
                .total_cmp(&a.amount)
                .then_with(|| a.doctor_name.cmp(&b.doctor_name))
        });
        rows
    }

    pub fn appointment_summary(&self, appointments: &[Appointment]) -> AppointmentSummary {
        let by_status: StatusCounts = self.appointments_in_range(appointments).collect();
        let total = by_status.total();

        AppointmentSummary {
            total,
            by_status,
            completion_rate: rate(by_status.completed, total),
            cancellation_rate: rate(by_status.cancelled, total),
            no_show_rate: rate(by_status.no_show, total),
        }
    }

    pub fn peak_hours(&self, appointments: &[Appointment]) -> Vec<HourCount> {
        let mut hours: BTreeMap<u32, u32> = BTreeMap::new();
        for appointment in self.appointments_in_range(appointments).filter(|a| a.is_active()) {
            *hours.entry(appointment.appointment_time.hour()).or_default() += 1;
        }

        hours
            .into_iter()
            .map(|(hour, count)| HourCount { hour, count })
            .collect()
    }

    pub fn patient_analytics(&self, patients: &[Patient], appointments: &[Appointment]) -> PatientAnalytics {
        let seen_ids: HashSet<Uuid> = self
            .appointments_in_range(appointments)
            .filter(|a| a.is_active())
            .map(|a| a.patient_id)
            .collect();

        let new_patients = patients
            .iter()
            .filter(|p| self.range.contains(self.schedule.local_date(p.created_at)))
            .count();

        // Appointments whose patient row is gone are left out so the
        // breakdowns always add up to patients_seen.
        let seen: Vec<&Patient> = patients.iter().filter(|p| seen_ids.contains(&p.id)).collect();
        let returning = seen
            .iter()
            .filter(|p| self.schedule.local_date(p.created_at) < self.range.from)
            .count();

        let mut genders: BTreeMap<Gender, u32> = BTreeMap::new();
        let mut age_groups: HashMap<AgeGroup, u32> = HashMap::new();
        for patient in &seen {
            *genders.entry(patient.gender).or_default() += 1;
            *age_groups.entry(AgeGroup::of(patient.age_on(self.range.to))).or_default() += 1;
        }

        PatientAnalytics {
            patients_seen: seen.len() as u32,
            new_patients: new_patients as u32,
            returning_patients: returning as u32,
            genders: genders
                .into_iter()
                .map(|(gender, count)| GenderCount { gender, count })
                .collect(),
            age_groups: AgeGroup::ALL
                .iter()
                .map(|group| AgeGroupCount {
                    age_group: *group,
                    count: age_groups.get(group).copied().unwrap_or(0),
                })
                .collect(),
        }
    }
}
