use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use tracing::warn;
use uuid::Uuid;

use shared_config::{AppConfig, ScheduleConfig};

use crate::models::{Appointment, AppointmentError, SlotAvailability, SlotPeriod};

fn minute_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn time_at(minute: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(minute * 60, 0).unwrap_or(NaiveTime::MIN)
}

/// The clinic's slot grid and the booking limit of each slot.
///
/// A working day runs from `open_time` up to `close_time` and is cut into
/// `slot_minutes` slots starting at opening time. How many active bookings a
/// doctor may hold in one slot depends on the part of the day the slot
/// starts in.
#[derive(Debug, Clone)]
pub struct SlotPolicy {
    schedule: ScheduleConfig,
}

impl SlotPolicy {
    pub fn new(schedule: ScheduleConfig) -> Self {
        Self { schedule }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.schedule.clone())
    }

    pub fn slot_minutes(&self) -> u32 {
        self.schedule.slot_minutes.max(1)
    }

    /// Converts an instant to clinic wall-clock time.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        self.schedule.local_time(instant)
    }

    pub fn period_of(&self, time: NaiveTime) -> SlotPeriod {
        if time < self.schedule.afternoon_starts {
            SlotPeriod::Morning
        } else if time < self.schedule.evening_starts {
            SlotPeriod::Afternoon
        } else {
            SlotPeriod::Evening
        }
    }

    pub fn capacity_at(&self, time: NaiveTime) -> u32 {
        match self.period_of(time) {
            SlotPeriod::Morning => self.schedule.morning_slot_limit,
            SlotPeriod::Afternoon => self.schedule.afternoon_slot_limit,
            SlotPeriod::Evening => self.schedule.evening_slot_limit,
        }
    }

    pub fn is_open_on(&self, date: NaiveDate) -> bool {
        !self.schedule.closed_days.contains(&date.weekday())
    }

    pub fn slot_starts(&self) -> Vec<NaiveTime> {
        let step = self.slot_minutes();
        let close = minute_of_day(self.schedule.close_time);

        (minute_of_day(self.schedule.open_time)..)
            .step_by(step as usize)
            .take_while(|start| start + step <= close)
            .map(time_at)
            .collect()
    }

    /// Start of the slot containing `time`, or `None` outside opening hours.
    pub fn slot_containing(&self, time: NaiveTime) -> Option<NaiveTime> {
        let step = self.slot_minutes();
        let open = minute_of_day(self.schedule.open_time);
        let close = minute_of_day(self.schedule.close_time);
        let minute = minute_of_day(time);

        if minute < open {
            return None;
        }
        let start = open + (minute - open) / step * step;
        (start + step <= close).then(|| time_at(start))
    }

    pub fn is_slot_start(&self, time: NaiveTime) -> bool {
        time.second() == 0 && time.nanosecond() == 0 && self.slot_containing(time) == Some(time)
    }

    fn slot_at(&self, start: NaiveTime, booked: u32) -> SlotAvailability {
        let capacity = self.capacity_at(start);
        SlotAvailability {
            start,
            end: time_at(minute_of_day(start) + self.slot_minutes()),
            period: self.period_of(start),
            capacity,
            booked,
            remaining: capacity.saturating_sub(booked),
            is_full: booked >= capacity,
        }
    }

    fn booked_per_slot<'a, I>(&self, date: NaiveDate, appointments: I) -> HashMap<NaiveTime, u32>
    where
        I: IntoIterator<Item = &'a Appointment>,
    {
        let mut booked = HashMap::new();
        for appointment in appointments {
            if appointment.appointment_date != date || !appointment.is_active() {
                continue;
            }
            if let Some(start) = self.slot_containing(appointment.appointment_time) {
                *booked.entry(start).or_insert(0) += 1;
            }
        }
        booked
    }

    /// Occupancy of every slot on `date`. `appointments` are one doctor's rows;
    /// off-grid times count toward the slot that contains them.
    pub fn day_availability(&self, date: NaiveDate, appointments: &[Appointment]) -> Vec<SlotAvailability> {
        if !self.is_open_on(date) {
            return Vec::new();
        }

        let booked = self.booked_per_slot(date, appointments);
        self.slot_starts()
            .into_iter()
            .map(|start| self.slot_at(start, booked.get(&start).copied().unwrap_or(0)))
            .collect()
    }

    /// Checks that one more booking fits in the slot starting at `time`.
    pub fn check_capacity(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        appointments: &[Appointment],
        exclude_id: Option<Uuid>,
    ) -> Result<SlotAvailability, AppointmentError> {
        if !self.is_open_on(date) {
            return Err(AppointmentError::ClinicClosed(date));
        }
        if !self.is_slot_start(time) {
            return Err(AppointmentError::InvalidTime(format!(
                "{} is not a slot start between {} and {}",
                time.format("%H:%M"),
                self.schedule.open_time.format("%H:%M"),
                self.schedule.close_time.format("%H:%M"),
            )));
        }

        let booked = self
            .booked_per_slot(date, appointments.iter().filter(|a| Some(a.id) != exclude_id))
            .get(&time)
            .copied()
            .unwrap_or(0);

        let slot = self.slot_at(time, booked);
        if slot.is_full {
            warn!("Slot {} on {} is full ({} of {})", time, date, booked, slot.capacity);
            return Err(AppointmentError::SlotFull { capacity: slot.capacity });
        }

        Ok(slot)
    }

    pub fn daily_capacity(&self, date: NaiveDate) -> u32 {
        if !self.is_open_on(date) {
            return 0;
        }
        self.slot_starts().into_iter().map(|start| self.capacity_at(start)).sum()
    }
}
