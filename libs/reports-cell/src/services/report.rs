use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

use appointment_cell::models::Appointment;
use patient_cell::models::Patient;
use payment_cell::models::Payment;
use shared_config::{AppConfig, ScheduleConfig};

use crate::models::{
    AppointmentReport, Dashboard, Granularity, PatientAnalytics, PatientReport, ReportError, ReportFilter,
    ReportRange, RevenueReport,
};
use crate::services::analytics::Analytics;
use crate::services::source::{ReportDataSource, SupabaseReportSource};

/// When scoped to a doctor, only that doctor's patients are counted.
fn scope_patients(patients: Vec<Patient>, appointments: &[Appointment], doctor_id: Option<Uuid>) -> Vec<Patient> {
    match doctor_id {
        None => patients,
        Some(_) => {
            let own: HashSet<Uuid> = appointments.iter().map(|a| a.patient_id).collect();
            patients.into_iter().filter(|p| own.contains(&p.id)).collect()
        }
    }
}

pub struct ReportService<S> {
    source: S,
    schedule: ScheduleConfig,
}

impl ReportService<SupabaseReportSource> {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self::with_source(SupabaseReportSource::new(config, auth_token), config.schedule.clone())
    }
}

impl<S: ReportDataSource> ReportService<S> {
    pub fn with_source(source: S, schedule: ScheduleConfig) -> Self {
        Self { source, schedule }
    }

    pub async fn revenue_report(&self, filter: &ReportFilter, today: NaiveDate) -> Result<RevenueReport, ReportError> {
        let range = filter.resolve_range(today)?;
        debug!("Revenue report {} to {} (doctor {:?})", range.from, range.to, filter.doctor_id);

        let (payments, doctor_names) = futures::try_join!(
            self.source.payments_between(&range, filter.doctor_id),
            self.source.doctor_names()
        )?;

        Ok(self.revenue_for(range, filter.granularity.unwrap_or_default(), &payments, &doctor_names))
    }

    pub async fn appointment_report(&self, filter: &ReportFilter, today: NaiveDate) -> Result<AppointmentReport, ReportError> {
        let range = filter.resolve_range(today)?;
        let appointments = self.source.appointments_between(&range, filter.doctor_id).await?;
        Ok(Self::appointments_for(range, &self.schedule, &appointments))
    }

    pub async fn patient_report(&self, filter: &ReportFilter, today: NaiveDate) -> Result<PatientReport, ReportError> {
        let range = filter.resolve_range(today)?;

        let (appointments, patients) = futures::try_join!(
            self.source.appointments_between(&range, filter.doctor_id),
            self.source.patients()
        )?;

        Ok(PatientReport {
            range,
            patients: self.patients_for(range, patients, &appointments, filter.doctor_id),
        })
    }

    pub async fn dashboard(&self, filter: &ReportFilter, today: NaiveDate) -> Result<Dashboard, ReportError> {
        let range = filter.resolve_range(today)?;

        let (payments, appointments, patients, doctor_names) = futures::try_join!(
            self.source.payments_between(&range, filter.doctor_id),
            self.source.appointments_between(&range, filter.doctor_id),
            self.source.patients(),
            self.source.doctor_names()
        )?;

        let revenue = self.revenue_for(range, filter.granularity.unwrap_or_default(), &payments, &doctor_names);

        info!(
            "Dashboard {} to {}: {} payments, {} appointments",
            range.from, range.to, payments.len(), appointments.len()
        );

        Ok(Dashboard {
            range,
            doctor_id: filter.doctor_id,
            revenue,
            appointments: Self::appointments_for(range, &self.schedule, &appointments),
            patients: self.patients_for(range, patients, &appointments, filter.doctor_id),
        })
    }

    fn revenue_for(
        &self,
        range: ReportRange,
        granularity: Granularity,
        payments: &[Payment],
        doctor_names: &HashMap<Uuid, String>,
    ) -> RevenueReport {
        let analytics = Analytics::new(range, &self.schedule);
        RevenueReport {
            range,
            granularity,
            summary: analytics.revenue_summary(payments),
            payment_methods: analytics.payment_method_breakdown(payments),
            series: analytics.revenue_series(payments, granularity),
            by_doctor: analytics.revenue_by_doctor(payments, doctor_names),
        }
    }

    fn appointments_for(range: ReportRange, schedule: &ScheduleConfig, appointments: &[Appointment]) -> AppointmentReport {
        let analytics = Analytics::new(range, schedule);
        AppointmentReport {
            range,
            summary: analytics.appointment_summary(appointments),
            peak_hours: analytics.peak_hours(appointments),
        }
    }

    fn patients_for(
        &self,
        range: ReportRange,
        patients: Vec<Patient>,
        appointments: &[Appointment],
        doctor_id: Option<Uuid>,
    ) -> PatientAnalytics {
        let patients = scope_patients(patients, appointments, doctor_id);
        Analytics::new(range, &self.schedule).patient_analytics(&patients, appointments)
    }
}
