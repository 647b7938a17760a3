//! Activation lifecycle for this installation.
//!
//! [`ActivationManager`] owns the state machine
//!
//! ```text
//! no_license -> active <-> inactive
//!                 \          /
//!                  expired | revoked   (terminal)
//! ```
//!
//! Every operation that reads status and may write it back runs under a
//! single async mutex, so concurrent requests observe and produce a
//! consistent state: at most one record is ever `active`.
//!
//! Expiry is applied lazily: whenever the current license is read, a record
//! past its expiry date is persisted as `expired` before it is reported.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::ApexConfig;
use crate::errors::{InvalidReason, LicenseError, LicenseResult};
use crate::events::{log_license_event, LicenseEvent};
use crate::features::{FeatureGate, FeatureState};
use crate::issuer::LicenseIssuer;
use crate::license::{effective_status, LicenseKind, LicenseRecord, LicenseStatus};
use crate::store::{InstallationState, LicenseStore};
use crate::validation::normalize_email;
use crate::validator::{LicenseValidator, ValidationResult};

/// Status of the installation as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    NoLicense,
    Issued,
    Active,
    Inactive,
    Expired,
    Revoked,
}

impl From<Option<LicenseStatus>> for InstallationStatus {
    fn from(status: Option<LicenseStatus>) -> Self {
        match status {
            None => InstallationStatus::NoLicense,
            Some(LicenseStatus::Issued) => InstallationStatus::Issued,
            Some(LicenseStatus::Active) => InstallationStatus::Active,
            Some(LicenseStatus::Inactive) => InstallationStatus::Inactive,
            Some(LicenseStatus::Expired) => InstallationStatus::Expired,
            Some(LicenseStatus::Revoked) => InstallationStatus::Revoked,
        }
    }
}

/// Snapshot of the installation's license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: InstallationStatus,
    pub license_key: Option<String>,
    pub email: Option<String>,
    pub kind: Option<LicenseKind>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    /// Premium features currently unlocked
    pub features: Vec<String>,
}

pub struct ActivationManager {
    store: Arc<LicenseStore>,
    issuer: LicenseIssuer,
    validator: LicenseValidator,
    gate: FeatureGate,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for ActivationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationManager")
            .field("store", &self.store.backend_name())
            .field("gate", &self.gate)
            .field("clock", &self.clock)
            .finish()
    }
}

impl ActivationManager {
    pub fn new(store: Arc<LicenseStore>, config: &ApexConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: LicenseIssuer::new(Arc::clone(&store), &config.license),
            validator: LicenseValidator::new(Arc::clone(&store), &config.license),
            gate: FeatureGate::from(&config.features),
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<LicenseStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Issue a trial license. Does not change the installation state.
    pub async fn generate_trial(&self, email: &str, days: i64) -> LicenseResult<LicenseRecord> {
        self.issue(email, LicenseKind::Trial, days).await
    }

    pub async fn issue(
        &self,
        email: &str,
        kind: LicenseKind,
        days: i64,
    ) -> LicenseResult<LicenseRecord> {
        let record = self.issuer.issue(email, kind, days, self.now()).await?;
        log_license_event(LicenseEvent::Issued, &record.license_key, Some(record.kind.as_str()));
        Ok(record)
    }

    /// Validate a key without touching the installation.
    pub async fn validate(&self, key: &str) -> LicenseResult<ValidationResult> {
        self.validator.validate(key, self.now()).await
    }

    /// Bind `key` to this installation.
    ///
    /// The key must validate and belong to `email`. If a different license is
    /// active it is deactivated in the same write. Activating the license
    /// that is already active is a no-op.
    pub async fn activate(&self, key: &str, email: &str) -> LicenseResult<StatusReport> {
        let _guard = self.lock.lock().await;
        let now = self.now();
        let key = key.trim();

        let validation = self.validator.validate(key, now).await?;
        if let Some(reason) = validation.reason {
            if let Some(mut record) = validation.record {
                self.persist_expiry(&mut record, now).await?;
            }
            log_license_event(LicenseEvent::ValidationFailed, key, Some(reason.as_str()));
            return Err(LicenseError::InvalidLicense(reason));
        }

        let mut record = validation.record.ok_or_else(|| {
            LicenseError::ServerError("validated license has no record".to_string())
        })?;

        if record.email != normalize_email(email) {
            log_license_event(
                LicenseEvent::ValidationFailed,
                key,
                Some(InvalidReason::EmailMismatch.as_str()),
            );
            return Err(LicenseError::InvalidLicense(InvalidReason::EmailMismatch));
        }

        let bound_key = self
            .store
            .installation()
            .await?
            .and_then(|install| install.license_key);

        if record.status == LicenseStatus::Active && bound_key.as_deref() == Some(key) {
            info!(license_key = %key, "License already active");
            return Ok(self.report(Some(&record), now));
        }

        let mut changes = Vec::with_capacity(2);
        if let Some(previous_key) = bound_key.filter(|k| k != key) {
            if let Some(mut previous) = self.store.get_license(&previous_key).await? {
                if previous.status == LicenseStatus::Active {
                    previous.status = match effective_status(&previous, now) {
                        LicenseStatus::Expired => LicenseStatus::Expired,
                        _ => LicenseStatus::Inactive,
                    };
                    previous.deactivated_at = Some(now);
                    log_license_event(
                        LicenseEvent::Deactivated,
                        &previous.license_key,
                        Some("superseded by another license"),
                    );
                    changes.push(previous);
                }
            }
        }

        record.status = LicenseStatus::Active;
        record.activated_at = Some(now);
        changes.push(record.clone());

        self.store
            .commit(
                &changes,
                &InstallationState {
                    license_key: Some(record.license_key.clone()),
                    updated_at: now,
                },
            )
            .await?;

        log_license_event(LicenseEvent::Activated, &record.license_key, None);
        Ok(self.report(Some(&record), now))
    }

    /// Release the active license from this installation.
    ///
    /// Fails with `NoActiveLicense`, leaving state untouched, when nothing is active.
    pub async fn deactivate(&self) -> LicenseResult<StatusReport> {
        let _guard = self.lock.lock().await;
        let now = self.now();

        let mut record = match self.current(now).await? {
            Some(record) if record.status == LicenseStatus::Active => record,
            _ => {
                warn!("Deactivation requested with no active license");
                return Err(LicenseError::NoActiveLicense);
            }
        };

        record.status = LicenseStatus::Inactive;
        record.deactivated_at = Some(now);
        self.store
            .commit(
                std::slice::from_ref(&record),
                &InstallationState {
                    license_key: Some(record.license_key.clone()),
                    updated_at: now,
                },
            )
            .await?;

        log_license_event(LicenseEvent::Deactivated, &record.license_key, None);
        Ok(self.report(Some(&record), now))
    }

    /// Current installation status, with expiry applied.
    pub async fn status(&self) -> LicenseResult<StatusReport> {
        let _guard = self.lock.lock().await;
        let now = self.now();
        let current = self.current(now).await?;
        Ok(self.report(current.as_ref(), now))
    }

    /// Permanently revoke a license.
    ///
    /// If it is the installation's license, the installation reports `revoked`
    /// and every premium feature locks.
    pub async fn revoke(&self, key: &str, reason: Option<&str>) -> LicenseResult<LicenseRecord> {
        let _guard = self.lock.lock().await;
        let now = self.now();

        let mut record = self
            .store
            .get_license(key)
            .await?
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))?;

        if record.status == LicenseStatus::Revoked {
            return Ok(record);
        }

        record.status = LicenseStatus::Revoked;
        record.revoked_at = Some(now);
        record.revoke_reason = reason.map(str::to_string);
        self.store.insert_license(&record).await?;

        log_license_event(LicenseEvent::Revoked, &record.license_key, reason);
        Ok(record)
    }

    /// Whether `feature` is unlocked right now.
    pub async fn is_unlocked(&self, feature: &str) -> LicenseResult<bool> {
        Ok(self.gate.is_unlocked(feature, self.current_status().await?))
    }

    pub fn list_premium_features(&self) -> &BTreeSet<String> {
        self.gate.list_premium_features()
    }

    /// Status together with the lock state of every premium feature.
    pub async fn feature_states(&self) -> LicenseResult<(InstallationStatus, Vec<FeatureState>)> {
        let status = self.current_status().await?;
        Ok((status.into(), self.gate.feature_states(status)))
    }

    async fn current_status(&self) -> LicenseResult<Option<LicenseStatus>> {
        let _guard = self.lock.lock().await;
        let now = self.now();
        Ok(self
            .current(now)
            .await?
            .map(|record| effective_status(&record, now)))
    }

    /// The installation's license with lazy expiry applied. Caller holds the lock.
    async fn current(&self, now: DateTime<Utc>) -> LicenseResult<Option<LicenseRecord>> {
        let Some(key) = self
            .store
            .installation()
            .await?
            .and_then(|install| install.license_key)
        else {
            return Ok(None);
        };

        let Some(mut record) = self.store.get_license(&key).await? else {
            warn!(license_key = %key, "Installation points at a missing license");
            return Ok(None);
        };

        self.persist_expiry(&mut record, now).await?;
        Ok(Some(record))
    }

    async fn persist_expiry(
        &self,
        record: &mut LicenseRecord,
        now: DateTime<Utc>,
    ) -> LicenseResult<()> {
        if effective_status(record, now) == LicenseStatus::Expired
            && record.status != LicenseStatus::Expired
        {
            record.status = LicenseStatus::Expired;
            self.store.insert_license(record).await?;
            log_license_event(LicenseEvent::Expired, &record.license_key, None);
        }
        Ok(())
    }

    fn report(&self, record: Option<&LicenseRecord>, now: DateTime<Utc>) -> StatusReport {
        let status = record.map(|r| effective_status(r, now));
        StatusReport {
            status: status.into(),
            license_key: record.map(|r| r.license_key.clone()),
            email: record.map(|r| r.email.clone()),
            kind: record.map(|r| r.kind),
            expires_at: record.map(|r| r.expires_at),
            days_remaining: record.map(|r| r.days_remaining(now)),
            features: self.gate.unlocked_features(status),
        }
    }
}
