//! Error types shared by every layer of the license service.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a license key was refused.
///
/// The first four come from the validator; `EmailMismatch` is only produced
/// at the activation boundary, where ownership is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Key does not match the key grammar (checked before any lookup)
    Malformed,
    /// Key is well-formed but was never issued
    NotFound,
    /// Key is past its expiry date
    Expired,
    /// Key was revoked by an administrator
    Revoked,
    /// Key exists but belongs to a different email address
    EmailMismatch,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::Malformed => "malformed",
            InvalidReason::NotFound => "not_found",
            InvalidReason::Expired => "expired",
            InvalidReason::Revoked => "revoked",
            InvalidReason::EmailMismatch => "email_mismatch",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the license service.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Caller supplied a malformed email, an out-of-range day count, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// License key was refused; the reason says why.
    #[error("invalid license: {0}")]
    InvalidLicense(InvalidReason),

    /// Deactivation was requested but nothing is active.
    #[error("no active license")]
    NoActiveLicense,

    /// Administrative lookup of a key that does not exist.
    #[error("license not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("server error: {0}")]
    ServerError(String),
}

impl LicenseError {
    /// Returns the rejection reason when this is an `InvalidLicense` error.
    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            LicenseError::InvalidLicense(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_license_message_includes_reason() {
        let err = LicenseError::InvalidLicense(InvalidReason::Expired);
        assert_eq!(err.to_string(), "invalid license: expired");
        assert_eq!(err.invalid_reason(), Some(InvalidReason::Expired));
    }

    #[test]
    fn reason_serializes_as_snake_case() {
        let json = serde_json::to_string(&InvalidReason::EmailMismatch).unwrap();
        assert_eq!(json, "\"email_mismatch\"");
    }

    #[test]
    fn non_license_errors_have_no_reason() {
        assert!(LicenseError::NoActiveLicense.invalid_reason().is_none());
    }
}
