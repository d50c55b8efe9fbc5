use std::env;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    pub schedule: ScheduleConfig,
}

/// Clinic opening hours and per-slot booking limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub slot_minutes: u32,
    pub afternoon_starts: NaiveTime,
    pub evening_starts: NaiveTime,
    pub morning_slot_limit: u32,
    pub afternoon_slot_limit: u32,
    pub evening_slot_limit: u32,
    pub closed_days: Vec<Weekday>,
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            open_time: hm(9, 0),
            close_time: hm(21, 0),
            slot_minutes: 15,
            afternoon_starts: hm(12, 0),
            evening_starts: hm(17, 0),
            morning_slot_limit: 4,
            afternoon_slot_limit: 3,
            evening_slot_limit: 2,
            closed_days: vec![Weekday::Sun],
            utc_offset_minutes: 0,
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn parse_days(value: &str) -> Option<Vec<Weekday>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .map(|day| Weekday::from_str(day).ok())
        .collect()
}

/// Reads `key`, falling back to `default` (with a warning) when it is unset or unparsable.
fn env_or<T, F>(key: &str, default: T, parse: F) -> T
where
    F: Fn(&str) -> Option<T>,
{
    match env::var(key) {
        Ok(raw) => parse(raw.trim()).unwrap_or_else(|| {
            warn!("{} has invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl ScheduleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            open_time: env_or("CLINIC_OPEN_TIME", defaults.open_time, parse_time),
            close_time: env_or("CLINIC_CLOSE_TIME", defaults.close_time, parse_time),
            slot_minutes: env_or("CLINIC_SLOT_MINUTES", defaults.slot_minutes, |v| {
                v.parse::<u32>().ok().filter(|m| *m > 0)
            }),
            afternoon_starts: env_or("CLINIC_AFTERNOON_STARTS", defaults.afternoon_starts, parse_time),
            evening_starts: env_or("CLINIC_EVENING_STARTS", defaults.evening_starts, parse_time),
            morning_slot_limit: env_or("CLINIC_MORNING_SLOT_LIMIT", defaults.morning_slot_limit, |v| v.parse().ok()),
            afternoon_slot_limit: env_or("CLINIC_AFTERNOON_SLOT_LIMIT", defaults.afternoon_slot_limit, |v| v.parse().ok()),
            evening_slot_limit: env_or("CLINIC_EVENING_SLOT_LIMIT", defaults.evening_slot_limit, |v| v.parse().ok()),
            closed_days: env_or("CLINIC_CLOSED_DAYS", defaults.closed_days.clone(), parse_days),
            utc_offset_minutes: env_or("CLINIC_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes, |v| {
                v.parse::<i32>().ok().filter(|m| m.abs() < 24 * 60)
            }),
        };

        if config.open_time >= config.close_time {
            warn!("CLINIC_OPEN_TIME is not before CLINIC_CLOSE_TIME, using default opening hours");
            return Self {
                open_time: defaults.open_time,
                close_time: defaults.close_time,
                ..config
            };
        }

        config
    }

    fn utc_offset(&self) -> Duration {
        Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    /// Clinic wall-clock time of an instant.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        (instant + self.utc_offset()).naive_utc()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_time(instant).date()
    }

    /// The instant a clinic calendar day begins.
    pub fn day_start_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(NaiveTime::MIN).and_utc() - self.utc_offset()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: env_or("PORT", 3000, |v| v.parse().ok()),
            schedule: ScheduleConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}
