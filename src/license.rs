//! License records and their status model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LicenseError, LicenseResult};

/// Commercial kind of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseKind {
    Trial,
    Paid,
}

impl LicenseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseKind::Trial => "trial",
            LicenseKind::Paid => "paid",
        }
    }
}

impl fmt::Display for LicenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseKind {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(LicenseKind::Trial),
            "paid" => Ok(LicenseKind::Paid),
            other => Err(LicenseError::StorageError(format!(
                "unknown license kind '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of a license record.
///
/// `Issued -> Active <-> Inactive`, with `Expired` and `Revoked` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Issued,
    Active,
    Inactive,
    Expired,
    Revoked,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Issued => "issued",
            LicenseStatus::Active => "active",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Revoked => "revoked",
        }
    }

    /// Expired and revoked records never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LicenseStatus::Expired | LicenseStatus::Revoked)
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseStatus {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(LicenseStatus::Issued),
            "active" => Ok(LicenseStatus::Active),
            "inactive" => Ok(LicenseStatus::Inactive),
            "expired" => Ok(LicenseStatus::Expired),
            "revoked" => Ok(LicenseStatus::Revoked),
            other => Err(LicenseError::StorageError(format!(
                "unknown license status '{other}'"
            ))),
        }
    }
}

/// A persisted license.
///
/// Records are never deleted; only their status (and audit timestamps) change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license_key: String,
    pub email: String,
    pub kind: LicenseKind,
    pub status: LicenseStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
}

impl LicenseRecord {
    /// Build a freshly issued record valid for `days` days from `issued_at`.
    pub fn issue(
        license_key: String,
        email: String,
        kind: LicenseKind,
        issued_at: DateTime<Utc>,
        days: i64,
    ) -> LicenseResult<Self> {
        if days <= 0 {
            return Err(LicenseError::InvalidInput(
                "days: must be a positive number of days".to_string(),
            ));
        }
        let expires_at = Duration::try_days(days)
            .and_then(|span| issued_at.checked_add_signed(span))
            .ok_or_else(|| LicenseError::InvalidInput("days: out of range".to_string()))?;

        Ok(Self {
            license_key,
            email,
            kind,
            status: LicenseStatus::Issued,
            issued_at,
            expires_at,
            activated_at: None,
            deactivated_at: None,
            revoked_at: None,
            revoke_reason: None,
        })
    }

    /// True once `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole days left before expiry, zero once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days().max(0)
    }
}

/// Status of a record as observed at `now`.
///
/// Revocation wins over expiry; any other status lapses to `Expired` once
/// `now > expires_at`.
pub fn effective_status(record: &LicenseRecord, now: DateTime<Utc>) -> LicenseStatus {
    match record.status {
        LicenseStatus::Revoked => LicenseStatus::Revoked,
        _ if record.is_expired_at(now) => LicenseStatus::Expired,
        status => status,
    }
}
