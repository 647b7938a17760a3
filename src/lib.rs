//! APEX License - license activation and entitlements for the APEX Command Center
//!
//! The crate issues trial licenses, validates keys, tracks which license is
//! bound to this installation, and tells the UI which premium features are
//! unlocked.
//!
//! # Features
//!
//! - `server` - HTTP surface (axum handlers, router). Enabled by default.
//! - `sqlite` - Durable SQLite store. Enabled by default.
//! - `admin-api` - License revocation endpoint.
//! - `rate-limiting` - Per-IP limits on trial issuance and activation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use apex_license::activation::ActivationManager;
//! use apex_license::clock::SystemClock;
//! use apex_license::config::ApexConfig;
//! use apex_license::store::LicenseStore;
//!
//! # async fn demo() -> apex_license::errors::LicenseResult<()> {
//! let config = ApexConfig::default();
//! let manager = ActivationManager::new(
//!     Arc::new(LicenseStore::memory()),
//!     &config,
//!     Arc::new(SystemClock),
//! );
//!
//! let trial = manager.generate_trial("ops@example.com", 7).await?;
//! manager.activate(&trial.license_key, "ops@example.com").await?;
//! assert!(manager.is_unlocked("premium-feature").await?);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod features;
pub mod issuer;
pub mod license;
pub mod license_key;
pub mod store;
pub mod validation;
pub mod validator;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
