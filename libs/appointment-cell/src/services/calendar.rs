use std::collections::HashMap;

use chrono::{Months, NaiveDate};

use crate::models::{Appointment, AppointmentError, CalendarDay, CalendarDensity, CalendarMonth, StatusCounts};
use crate::services::slots::SlotPolicy;

const LIGHT_BELOW: f64 = 0.40;
const MODERATE_BELOW: f64 = 0.75;

impl CalendarDensity {
    pub fn classify(is_open: bool, active: u32, capacity: u32, utilization: f64) -> Self {
        if !is_open {
            CalendarDensity::Closed
        } else if active == 0 {
            CalendarDensity::Empty
        } else if capacity == 0 || utilization >= 1.0 {
            CalendarDensity::Full
        } else if utilization < LIGHT_BELOW {
            CalendarDensity::Light
        } else if utilization < MODERATE_BELOW {
            CalendarDensity::Moderate
        } else {
            CalendarDensity::Busy
        }
    }
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AppointmentError> {
    let invalid = || AppointmentError::ValidationError(format!("Invalid month: {}-{:02}", year, month));

    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid)?;

    Ok((first, last))
}

/// Per-day booking density for one month. Capacity scales with the number of
/// doctors whose rows are included.
pub fn build_month(
    year: i32,
    month: u32,
    appointments: &[Appointment],
    policy: &SlotPolicy,
    doctor_count: u32,
) -> Result<CalendarMonth, AppointmentError> {
    let (first, last) = month_bounds(year, month)?;

    let mut per_day: HashMap<NaiveDate, StatusCounts> = HashMap::new();
    for appointment in appointments {
        if (first..=last).contains(&appointment.appointment_date) {
            per_day.entry(appointment.appointment_date).or_default().add(appointment.status);
        }
    }

    let days: Vec<CalendarDay> = first
        .iter_days()
        .take_while(|date| *date <= last)
        .map(|date| {
            let by_status = per_day.get(&date).copied().unwrap_or_default();
            let active = by_status.active();
            let capacity = policy.daily_capacity(date) * doctor_count;
            let utilization = if capacity == 0 {
                0.0
            } else {
                f64::from(active) / f64::from(capacity)
            };

            CalendarDay {
                date,
                total: by_status.total(),
                active,
                by_status,
                capacity,
                utilization,
                density: CalendarDensity::classify(policy.is_open_on(date), active, capacity, utilization),
            }
        })
        .collect();

    let busiest_day = days
        .iter()
        .filter(|day| day.active > 0)
        .fold(None::<&CalendarDay>, |best, day| match best {
            Some(current) if current.active >= day.active => Some(current),
            _ => Some(day),
        })
        .map(|day| day.date);

    Ok(CalendarMonth {
        year,
        month,
        total_appointments: days.iter().map(|day| day.total).sum(),
        days,
        busiest_day,
    })
}
