//! License issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::LicenseConfig;
use crate::errors::LicenseResult;
use crate::license::{LicenseKind, LicenseRecord};
use crate::license_key::{generate_unique_license_key, LicenseKeyConfig};
use crate::store::LicenseStore;
use crate::validation::{validate_days, validate_email};

/// Creates new license records with fresh, unique keys.
#[derive(Debug, Clone)]
pub struct LicenseIssuer {
    store: Arc<LicenseStore>,
    key_config: LicenseKeyConfig,
    max_days: i64,
    max_retries: u32,
}

impl LicenseIssuer {
    pub fn new(store: Arc<LicenseStore>, config: &LicenseConfig) -> Self {
        Self {
            store,
            key_config: LicenseKeyConfig::from(config),
            max_days: config.max_trial_days,
            max_retries: config.key_generation_retries,
        }
    }

    /// Issue a trial license for `email` lasting `days` days from `now`.
    ///
    /// Every call creates a new key, even for an email that already holds one.
    pub async fn generate_trial(
        &self,
        email: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> LicenseResult<LicenseRecord> {
        self.issue(email, LicenseKind::Trial, days, now).await
    }

    /// Issue a license of any kind.
    ///
    /// Fails with `InvalidInput` for a malformed email or a day count outside
    /// `1..=max_trial_days`.
    pub async fn issue(
        &self,
        email: &str,
        kind: LicenseKind,
        days: i64,
        now: DateTime<Utc>,
    ) -> LicenseResult<LicenseRecord> {
        let email = validate_email(email, "email")?;
        validate_days(days, self.max_days, "days")?;

        let store = &self.store;
        let owner = &email;
        let key = generate_unique_license_key(
            &self.key_config,
            |candidate| async move {
                let record = LicenseRecord::issue(candidate, owner.clone(), kind, now, days)?;
                store.insert_new_license(&record).await
            },
            self.max_retries,
        )
        .await?;

        let record = LicenseRecord::issue(key, email, kind, now, days)?;

        info!(
            license_key = %record.license_key,
            kind = %record.kind,
            expires_at = %record.expires_at,
            "Issued license"
        );

        Ok(record)
    }
}
