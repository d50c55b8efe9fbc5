pub mod booking;
pub mod calendar;
pub mod lifecycle;
pub mod slots;

pub use booking::AppointmentBookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use slots::SlotPolicy;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use crate::models::{Appointment, AppointmentStatus};

    pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    pub fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    pub fn appointment_at(date: NaiveDate, time: NaiveTime, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            appointment_date: date,
            appointment_time: time,
            duration_minutes: 15,
            status,
            reason: None,
            notes: None,
            cancellation_reason: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
