//! Per-IP rate limiting for trial issuance and activation.
//!
//! # Configuration
//!
//! ```toml
//! [rate_limit]
//! enabled = true
//! trial_rpm = 10      # /api/license/generate-trial
//! activate_rpm = 30   # /api/license/activate
//! burst_size = 5
//! ```
//!
//! # Important
//!
//! The server must be started with
//! `.into_make_service_with_connect_info::<SocketAddr>()` for the peer IP
//! to be available to the key extractor.

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use governor::middleware::NoOpMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorError;
use tracing::warn;

pub use tower_governor::key_extractor::SmartIpKeyExtractor;
pub use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;
use crate::server::api_error::{ApiError, ErrorCode};

/// Endpoint categories with separate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitType {
    /// `/api/license/generate-trial`
    Trial,
    /// `/api/license/activate`
    Activate,
}

/// Build the limiter layer for `limit_type`.
///
/// Returns `None` when rate limiting is disabled or the limits cannot form a
/// valid quota.
pub fn create_rate_limiter(
    config: &RateLimitConfig,
    limit_type: RateLimitType,
) -> Option<GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware>> {
    if !config.enabled {
        return None;
    }

    let rpm = match limit_type {
        RateLimitType::Trial => config.trial_rpm,
        RateLimitType::Activate => config.activate_rpm,
    };

    // requests_per_minute -> one request every (60000/rpm) milliseconds
    let interval_ms = if rpm > 0 { (60_000 / rpm).max(1) } else { 60_000 };

    let Some(governor_config) = GovernorConfigBuilder::default()
        .per_millisecond(interval_ms.into())
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .error_handler(rate_limit_error_response)
        .finish()
    else {
        warn!(?limit_type, "Invalid rate limit configuration; limiter disabled");
        return None;
    };

    Some(GovernorLayer {
        config: Arc::new(governor_config),
    })
}

/// Render a limiter rejection as an [`ApiError`] envelope.
///
/// Throttled requests get `429 RATE_LIMITED` with a `Retry-After` header of at
/// least one second.
pub fn rate_limit_error_response(error: GovernorError) -> Response {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let retry_after = wait_time.max(1);
            let mut response = ApiError::with_message(
                ErrorCode::RateLimited,
                format!("Rate limit exceeded. Retry after {retry_after} seconds."),
            )
            .details(serde_json::json!({ "retry_after_seconds": retry_after }))
            .into_response();

            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
        GovernorError::UnableToExtractKey => {
            warn!("Rate limiter could not determine the client address");
            ApiError::with_message(
                ErrorCode::InternalError,
                "Unable to determine client address",
            )
            .into_response()
        }
        GovernorError::Other { msg, .. } => {
            let message =
                msg.unwrap_or_else(|| ErrorCode::InternalError.default_message().to_string());
            ApiError::with_message(ErrorCode::InternalError, message).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn throttled_response_uses_envelope() {
        let response = rate_limit_error_response(GovernorError::TooManyRequests {
            wait_time: 30,
            headers: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let response = rate_limit_error_response(GovernorError::TooManyRequests {
            wait_time: 0,
            headers: None,
        });
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn disabled_config_builds_no_layer() {
        let config = RateLimitConfig::default();
        assert!(create_rate_limiter(&config, RateLimitType::Trial).is_none());
    }

    #[test]
    fn enabled_config_builds_layers() {
        let config = RateLimitConfig {
            enabled: true,
            ..RateLimitConfig::default()
        };
        assert!(create_rate_limiter(&config, RateLimitType::Trial).is_some());
        assert!(create_rate_limiter(&config, RateLimitType::Activate).is_some());
    }

    #[test]
    fn zero_burst_is_rejected() {
        let config = RateLimitConfig {
            enabled: true,
            burst_size: 0,
            ..RateLimitConfig::default()
        };
        assert!(create_rate_limiter(&config, RateLimitType::Trial).is_none());
    }
}
