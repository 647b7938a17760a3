use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::config::RateLimitConfig;
use crate::server::handlers::{
    activate_license_handler, deactivate_license_handler, features_handler,
    generate_trial_handler, health_handler, license_status_handler, method_not_allowed_envelope,
    route_not_found_handler, validate_license_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

#[cfg(feature = "admin-api")]
use crate::server::handlers::revoke_license_handler;

#[cfg(feature = "rate-limiting")]
use crate::server::rate_limit::{create_rate_limiter, RateLimitType};

/// Build the application router.
///
/// # Routes
///
/// - `POST /api/license/generate-trial` - Issue a trial license
/// - `POST /api/license/activate` - Bind a license to this installation
/// - `POST /api/license/deactivate` - Release the active license
/// - `GET /api/license/status` - Current installation status
/// - `POST /api/license/validate` - Check a key without binding it
/// - `GET /api/license/features` - Premium features and their lock state
/// - `GET /api/status` - Health check
/// - `POST /api/license/revoke` - Revoke a license (requires `admin-api` feature)
///
/// Unknown paths and unsupported methods answer with the JSON error envelope.
///
/// `rate_limit` only takes effect with the `rate-limiting` feature.
#[cfg_attr(not(feature = "rate-limiting"), allow(unused_variables))]
pub fn build_router(state: AppState, rate_limit: &RateLimitConfig) -> Router {
    let trial: Router<AppState> =
        Router::new().route("/api/license/generate-trial", post(generate_trial_handler));
    let activate: Router<AppState> =
        Router::new().route("/api/license/activate", post(activate_license_handler));

    #[cfg(feature = "rate-limiting")]
    let trial = match create_rate_limiter(rate_limit, RateLimitType::Trial) {
        Some(layer) => trial.layer(layer),
        None => trial,
    };
    #[cfg(feature = "rate-limiting")]
    let activate = match create_rate_limiter(rate_limit, RateLimitType::Activate) {
        Some(layer) => activate.layer(layer),
        None => activate,
    };

    let router = Router::new()
        .merge(trial)
        .merge(activate)
        .route("/api/license/deactivate", post(deactivate_license_handler))
        .route("/api/license/status", get(license_status_handler))
        .route("/api/license/validate", post(validate_license_handler))
        .route("/api/license/features", get(features_handler))
        .route("/api/status", get(health_handler));

    #[cfg(feature = "admin-api")]
    let router = router.route("/api/license/revoke", post(revoke_license_handler));

    router
        .fallback(route_not_found_handler)
        .layer(middleware::map_response(method_not_allowed_envelope))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
