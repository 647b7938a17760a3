//! Input validation for issuance and activation requests.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::LicenseError;

/// Longest address accepted (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

/// Validation error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for LicenseError {
    fn from(err: ValidationError) -> Self {
        LicenseError::InvalidInput(err.to_string())
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
            .expect("email pattern is a valid regex")
    })
}

/// Trim and lower-case an email address for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an email address and return its normalized form.
///
/// # Example
/// ```
/// use apex_license::validation::validate_email;
///
/// assert_eq!(validate_email(" A@B.com ", "email").unwrap(), "a@b.com");
/// assert!(validate_email("not-an-email", "email").is_err());
/// ```
pub fn validate_email(value: &str, field_name: &str) -> ValidationResult<String> {
    let normalized = normalize_email(value);

    if normalized.is_empty() {
        return Err(ValidationError {
            field: field_name.to_string(),
            message: "cannot be empty".to_string(),
        });
    }
    if normalized.len() > MAX_EMAIL_LEN {
        return Err(ValidationError {
            field: field_name.to_string(),
            message: format!("exceeds maximum length of {MAX_EMAIL_LEN} characters"),
        });
    }
    if !email_regex().is_match(&normalized) {
        return Err(ValidationError {
            field: field_name.to_string(),
            message: "invalid email address".to_string(),
        });
    }

    Ok(normalized)
}

/// Validate a license duration in days: `1..=max_days`.
pub fn validate_days(value: i64, max_days: i64, field_name: &str) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError {
            field: field_name.to_string(),
            message: "must be a positive number of days".to_string(),
        });
    }
    if value > max_days {
        return Err(ValidationError {
            field: field_name.to_string(),
            message: format!("cannot exceed {max_days} days"),
        });
    }
    Ok(())
}
