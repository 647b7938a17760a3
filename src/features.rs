//! Premium feature gating.
//!
//! The gate holds no state of its own: whether a feature is unlocked is a pure
//! function of the catalogue and the current license status.
//!
//! # Configuration
//!
//! ```toml
//! [features]
//! premium = ["premium-feature", "aws-commands", "gcp-commands"]
//! ```

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::FeaturesConfig;
use crate::license::LicenseStatus;

/// One entry of the feature listing served to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureState {
    pub id: String,
    pub unlocked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureGate {
    premium: BTreeSet<String>,
}

impl FeatureGate {
    pub fn new<I, S>(premium: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            premium: premium.into_iter().map(Into::into).collect(),
        }
    }

    /// Premium feature ids, sorted.
    pub fn list_premium_features(&self) -> &BTreeSet<String> {
        &self.premium
    }

    pub fn is_premium(&self, feature: &str) -> bool {
        self.premium.contains(feature)
    }

    /// A premium feature is unlocked iff the license is active.
    ///
    /// Ids outside the catalogue are never unlocked by a license.
    pub fn is_unlocked(&self, feature: &str, status: Option<LicenseStatus>) -> bool {
        status == Some(LicenseStatus::Active) && self.is_premium(feature)
    }

    /// Features unlocked under `status`.
    pub fn unlocked_features(&self, status: Option<LicenseStatus>) -> Vec<String> {
        if status == Some(LicenseStatus::Active) {
            self.premium.iter().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// Every premium feature with its lock state under `status`.
    pub fn feature_states(&self, status: Option<LicenseStatus>) -> Vec<FeatureState> {
        self.premium
            .iter()
            .map(|id| FeatureState {
                id: id.clone(),
                unlocked: self.is_unlocked(id, status),
            })
            .collect()
    }
}

impl From<&FeaturesConfig> for FeatureGate {
    fn from(config: &FeaturesConfig) -> Self {
        FeatureGate::new(config.premium.iter().map(|f| f.trim().to_string()))
    }
}
