use chrono::{Months, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::models::{CreatePatientRequest, PatientError, UpdatePatientRequest};

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
const PHONE_PATTERN: &str = r"^\+?[0-9]{10,15}$";
const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
const MAX_AGE_YEARS: u32 = 130;

/// Intake checks for patient records. Every problem found is reported at once.
pub struct PatientValidator {
    email_pattern: Regex,
    phone_pattern: Regex,
}

impl PatientValidator {
    pub fn new() -> Result<Self, PatientError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PatientError::ValidationError(e.to_string()))
        };

        Ok(Self {
            email_pattern: compile(EMAIL_PATTERN)?,
            phone_pattern: compile(PHONE_PATTERN)?,
        })
    }

    /// Strips the separators people type into phone numbers.
    pub fn normalize_phone(phone: &str) -> String {
        phone
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect()
    }

    fn check_name(&self, name: &str, issues: &mut Vec<String>) -> String {
        let trimmed = name.trim();
        if !(2..=100).contains(&trimmed.chars().count()) {
            issues.push("Full name must be between 2 and 100 characters".to_string());
        }
        trimmed.to_string()
    }

    fn check_phone(&self, phone: &str, issues: &mut Vec<String>) -> String {
        let normalized = Self::normalize_phone(phone);
        if !self.phone_pattern.is_match(&normalized) {
            issues.push("Phone number must contain 10 to 15 digits".to_string());
        }
        normalized
    }

    fn check_email(&self, email: &str, issues: &mut Vec<String>) -> Option<String> {
        let trimmed = email.trim();
        if trimmed.is_empty() {
            return None;
        }
        if !self.email_pattern.is_match(trimmed) {
            issues.push("Email address is not valid".to_string());
        }
        Some(trimmed.to_lowercase())
    }

    fn check_date_of_birth(&self, dob: NaiveDate, today: NaiveDate, issues: &mut Vec<String>) {
        if dob > today {
            issues.push("Date of birth cannot be in the future".to_string());
        } else if let Some(oldest) = today.checked_sub_months(Months::new(MAX_AGE_YEARS * 12)) {
            if dob < oldest {
                issues.push(format!("Date of birth cannot be more than {} years ago", MAX_AGE_YEARS));
            }
        }
    }

    fn check_blood_group(&self, blood_group: &str, issues: &mut Vec<String>) -> Option<String> {
        let upper = blood_group.trim().to_uppercase();
        if upper.is_empty() {
            return None;
        }
        if !BLOOD_GROUPS.contains(&upper.as_str()) {
            issues.push(format!("Blood group must be one of {}", BLOOD_GROUPS.join(", ")));
        }
        Some(upper)
    }

    fn finish<T>(issues: Vec<String>, value: T) -> Result<T, PatientError> {
        if issues.is_empty() {
            Ok(value)
        } else {
            debug!("Patient validation failed: {:?}", issues);
            Err(PatientError::ValidationError(issues.join("; ")))
        }
    }

    /// Validates a new intake and returns it in stored form.
    pub fn validate_create(
        &self,
        request: CreatePatientRequest,
        today: NaiveDate,
    ) -> Result<CreatePatientRequest, PatientError> {
        let mut issues = Vec::new();

        let full_name = self.check_name(&request.full_name, &mut issues);
        let phone = self.check_phone(&request.phone, &mut issues);
        let email = request.email.as_deref().and_then(|e| self.check_email(e, &mut issues));
        if let Some(dob) = request.date_of_birth {
            self.check_date_of_birth(dob, today, &mut issues);
        }
        let blood_group = request
            .blood_group
            .as_deref()
            .and_then(|b| self.check_blood_group(b, &mut issues));

        Self::finish(issues, CreatePatientRequest {
            full_name,
            phone,
            email,
            blood_group,
            ..request
        })
    }

    /// Validates only the fields present in a partial update.
    pub fn validate_update(
        &self,
        request: UpdatePatientRequest,
        today: NaiveDate,
    ) -> Result<UpdatePatientRequest, PatientError> {
        let mut issues = Vec::new();

        let full_name = request.full_name.as_deref().map(|n| self.check_name(n, &mut issues));
        let phone = request.phone.as_deref().map(|p| self.check_phone(p, &mut issues));
        let email = request.email.as_deref().map(|e| {
            self.check_email(e, &mut issues).unwrap_or_default()
        });
        if let Some(dob) = request.date_of_birth {
            self.check_date_of_birth(dob, today, &mut issues);
        }
        let blood_group = request.blood_group.as_deref().map(|b| {
            self.check_blood_group(b, &mut issues).unwrap_or_default()
        });

        Self::finish(issues, UpdatePatientRequest {
            full_name,
            phone,
            email,
            blood_group,
            ..request
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn intake() -> CreatePatientRequest {
        CreatePatientRequest {
            full_name: "  Meera Iyer ".to_string(),
            phone: "+91 98123-45678".to_string(),
            email: Some("Meera@Example.COM".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 14),
            gender: Gender::Female,
            address: None,
            blood_group: Some("ab+".to_string()),
            medical_history: None,
            emergency_contact: None,
        }
    }

    #[test]
    fn test_valid_intake_is_normalized() {
        let validator = PatientValidator::new().unwrap();
        let normalized = validator.validate_create(intake(), today()).unwrap();

        assert_eq!(normalized.full_name, "Meera Iyer");
        assert_eq!(normalized.phone, "+919812345678");
        assert_eq!(normalized.email.as_deref(), Some("meera@example.com"));
        assert_eq!(normalized.blood_group.as_deref(), Some("AB+"));
    }

    #[test]
    fn test_blank_optional_fields_become_none() {
        let validator = PatientValidator::new().unwrap();
        let request = CreatePatientRequest {
            email: Some("   ".to_string()),
            blood_group: Some("".to_string()),
            ..intake()
        };
        let normalized = validator.validate_create(request, today()).unwrap();
        assert_eq!(normalized.email, None);
        assert_eq!(normalized.blood_group, None);
    }

    #[test]
    fn test_all_issues_reported_together() {
        let validator = PatientValidator::new().unwrap();
        let request = CreatePatientRequest {
            full_name: "M".to_string(),
            phone: "12345".to_string(),
            email: Some("not-an-email".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(2030, 1, 1),
            blood_group: Some("C+".to_string()),
            ..intake()
        };

        let message = match validator.validate_create(request, today()) {
            Err(PatientError::ValidationError(message)) => message,
            other => panic!("expected validation error, got {:?}", other),
        };

        assert_eq!(message.split("; ").count(), 5);
        assert!(message.contains("Full name"));
        assert!(message.contains("Phone number"));
        assert!(message.contains("Email"));
        assert!(message.contains("future"));
        assert!(message.contains("Blood group"));
    }

    #[test]
    fn test_implausibly_old_date_of_birth() {
        let validator = PatientValidator::new().unwrap();
        let request = CreatePatientRequest {
            date_of_birth: NaiveDate::from_ymd_opt(1850, 1, 1),
            ..intake()
        };
        assert!(validator.validate_create(request, today()).is_err());
    }

    #[test]
    fn test_update_checks_only_present_fields() {
        let validator = PatientValidator::new().unwrap();

        let untouched = validator.validate_update(UpdatePatientRequest::default(), today()).unwrap();
        assert!(untouched.phone.is_none());

        let request = UpdatePatientRequest {
            phone: Some("(981) 234-5678".to_string()),
            ..Default::default()
        };
        let normalized = validator.validate_update(request, today()).unwrap();
        assert_eq!(normalized.phone.as_deref(), Some("9812345678"));

        let bad = UpdatePatientRequest {
            full_name: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(validator.validate_update(bad, today()).is_err());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(PatientValidator::normalize_phone("+1 (555) 010-2030"), "+15550102030");
        assert_eq!(PatientValidator::normalize_phone("98.12.34.56.78"), "9812345678");
    }
}
