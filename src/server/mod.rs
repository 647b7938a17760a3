// src/server/mod.rs

//! HTTP surface for the license service.
//!
//! This module contains:
//! - `handlers`    → Axum HTTP handlers for the license endpoints
//! - `routes`      → Router builder
//! - `api_error`   → JSON error envelope and extractor
//! - `logging`     → Request logging middleware
//! - `rate_limit`  → Rate limiting middleware (requires `rate-limiting` feature)

pub mod api_error;
pub mod handlers;
pub mod logging;
pub mod routes;

#[cfg(feature = "rate-limiting")]
pub mod rate_limit;

pub use api_error::{ApiError, ApiJson, ErrorCode};
pub use handlers::{
    activate_license_handler, deactivate_license_handler, features_handler,
    generate_trial_handler, health_handler, license_status_handler, method_not_allowed_envelope,
    route_not_found_handler, validate_license_handler, ActivateRequest, ActivationResponse,
    AppState, FeaturesResponse, GenerateTrialRequest, GenerateTrialResponse, HealthResponse,
    ValidateRequest,
};
pub use routes::build_router;

#[cfg(feature = "admin-api")]
pub use handlers::{revoke_license_handler, RevokeRequest, RevokeResponse};

#[cfg(feature = "rate-limiting")]
pub use rate_limit::{
    create_rate_limiter, rate_limit_error_response, RateLimitType, SmartIpKeyExtractor,
};
