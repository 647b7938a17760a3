//! License key validation.
//!
//! Checks run cheapest first: the key grammar (no store access), then the
//! store lookup, then revocation and expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::LicenseConfig;
use crate::errors::{InvalidReason, LicenseResult};
use crate::license::{effective_status, LicenseRecord, LicenseStatus};
use crate::license_key::{validate_license_key_format, LicenseKeyConfig};
use crate::store::LicenseStore;

/// Outcome of validating a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    /// The stored record, when the key was found.
    #[serde(skip)]
    pub record: Option<LicenseRecord>,
}

impl ValidationResult {
    fn accepted(record: LicenseRecord) -> Self {
        Self {
            valid: true,
            reason: None,
            record: Some(record),
        }
    }

    fn rejected(reason: InvalidReason, record: Option<LicenseRecord>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            record,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LicenseValidator {
    store: Arc<LicenseStore>,
    key_config: LicenseKeyConfig,
}

impl LicenseValidator {
    pub fn new(store: Arc<LicenseStore>, config: &LicenseConfig) -> Self {
        Self {
            store,
            key_config: LicenseKeyConfig::from(config),
        }
    }

    /// Grammar check only.
    pub fn is_well_formed(&self, key: &str) -> bool {
        validate_license_key_format(key, &self.key_config)
    }

    /// Validate `key` as of `now`.
    ///
    /// Only storage failures are returned as errors; every rejection is a
    /// `valid: false` result carrying its reason.
    pub async fn validate(&self, key: &str, now: DateTime<Utc>) -> LicenseResult<ValidationResult> {
        if !self.is_well_formed(key) {
            return Ok(ValidationResult::rejected(InvalidReason::Malformed, None));
        }

        let Some(record) = self.store.get_license(key).await? else {
            return Ok(ValidationResult::rejected(InvalidReason::NotFound, None));
        };

        let result = match effective_status(&record, now) {
            LicenseStatus::Revoked => ValidationResult::rejected(InvalidReason::Revoked, Some(record)),
            LicenseStatus::Expired => ValidationResult::rejected(InvalidReason::Expired, Some(record)),
            _ => ValidationResult::accepted(record),
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseKind;
    use crate::license_key::generate_license_key;
    use chrono::Duration;

    async fn setup() -> (LicenseValidator, Arc<LicenseStore>, LicenseRecord) {
        let store = Arc::new(LicenseStore::memory());
        let config = LicenseConfig::default();
        let record = LicenseRecord::issue(
            generate_license_key(&LicenseKeyConfig::from(&config)),
            "a@b.com".to_string(),
            LicenseKind::Trial,
            Utc::now(),
            7,
        )
        .unwrap();
        store.insert_license(&record).await.unwrap();
        (LicenseValidator::new(store.clone(), &config), store, record)
    }

    #[tokio::test]
    async fn fresh_trial_is_valid() {
        let (validator, _, record) = setup().await;
        let result = validator
            .validate(&record.license_key, record.issued_at)
            .await
            .unwrap();
        assert!(result.valid);
        assert!(result.reason.is_none());
    }

    #[tokio::test]
    async fn demo_key_is_malformed() {
        let (validator, _, _) = setup().await;
        let result = validator
            .validate("WARP-FAKE-INVALID-LICENSE-KEY-DEMO", Utc::now())
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.reason, Some(InvalidReason::Malformed));
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let (validator, _, _) = setup().await;
        let key = generate_license_key(&LicenseKeyConfig::default());
        let result = validator.validate(&key, Utc::now()).await.unwrap();
        assert_eq!(result.reason, Some(InvalidReason::NotFound));
    }

    #[tokio::test]
    async fn seven_day_trial_boundaries() {
        let (validator, _, record) = setup().await;
        let key = &record.license_key;

        let day6 = validator
            .validate(key, record.issued_at + Duration::days(6))
            .await
            .unwrap();
        assert!(day6.valid);

        let day8 = validator
            .validate(key, record.issued_at + Duration::days(8))
            .await
            .unwrap();
        assert!(!day8.valid);
        assert_eq!(day8.reason, Some(InvalidReason::Expired));
    }

    #[tokio::test]
    async fn revoked_key_is_rejected() {
        let (validator, store, mut record) = setup().await;
        record.status = LicenseStatus::Revoked;
        store.insert_license(&record).await.unwrap();

        let result = validator
            .validate(&record.license_key, record.issued_at)
            .await
            .unwrap();
        assert_eq!(result.reason, Some(InvalidReason::Revoked));
    }

    #[test]
    fn result_serializes_without_record() {
        let json = serde_json::to_value(ValidationResult::rejected(InvalidReason::NotFound, None))
            .unwrap();
        assert_eq!(json, serde_json::json!({ "valid": false, "reason": "not_found" }));
    }
}
