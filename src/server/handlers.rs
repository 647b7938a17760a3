//! Axum handlers for the license endpoints.
//!
//! Field names in requests and responses (`license_key`, `email`, `days`,
//! `status`) are relied on by the UI and must not change.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activation::{ActivationManager, InstallationStatus, StatusReport};
use crate::features::FeatureState;
use crate::license::{LicenseKind, LicenseStatus};
use crate::server::api_error::{ApiError, ApiJson, ErrorCode};
use crate::validator::ValidationResult;

#[cfg(feature = "admin-api")]
use crate::license::LicenseRecord;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ActivationManager>,
}

impl AppState {
    pub fn new(manager: Arc<ActivationManager>) -> Self {
        Self { manager }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateTrialRequest {
    pub email: String,
    pub days: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateTrialResponse {
    pub success: bool,
    pub license_key: String,
    pub email: String,
    pub kind: LicenseKind,
    pub status: LicenseStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ActivateRequest {
    pub license_key: String,
    pub email: String,
}

/// Response for activate/deactivate: the new status plus a success flag.
#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: StatusReport,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ValidateRequest {
    pub license_key: String,
}

#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub status: InstallationStatus,
    pub features: Vec<FeatureState>,
}

/// Health check response structure.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: DatabaseHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub db_type: String,
}

impl HealthResponse {
    pub fn new(db_connected: bool, db_type: &str) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
        }
    }
}

/// `POST /api/license/generate-trial`
pub async fn generate_trial_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<GenerateTrialRequest>,
) -> ApiResult<GenerateTrialResponse> {
    info!(days = payload.days, "Trial license requested");

    let record = state
        .manager
        .generate_trial(&payload.email, payload.days)
        .await?;

    Ok(Json(GenerateTrialResponse {
        success: true,
        license_key: record.license_key,
        email: record.email,
        kind: record.kind,
        status: record.status,
        issued_at: record.issued_at,
        expires_at: record.expires_at,
    }))
}

/// `POST /api/license/activate`
pub async fn activate_license_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ActivateRequest>,
) -> ApiResult<ActivationResponse> {
    info!(license_key = %payload.license_key, "Activating license");

    let report = state
        .manager
        .activate(&payload.license_key, &payload.email)
        .await?;

    Ok(Json(ActivationResponse {
        success: true,
        report,
    }))
}

/// `POST /api/license/deactivate`
pub async fn deactivate_license_handler(
    State(state): State<AppState>,
) -> ApiResult<ActivationResponse> {
    info!("Deactivating license");

    let report = state.manager.deactivate().await?;

    Ok(Json(ActivationResponse {
        success: true,
        report,
    }))
}

/// `GET /api/license/status`
pub async fn license_status_handler(State(state): State<AppState>) -> ApiResult<StatusReport> {
    Ok(Json(state.manager.status().await?))
}

/// `POST /api/license/validate`
///
/// Checks a key without binding it; refusals are a `200` with `valid: false`.
pub async fn validate_license_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ValidateRequest>,
) -> ApiResult<ValidationResult> {
    Ok(Json(state.manager.validate(payload.license_key.trim()).await?))
}

/// `GET /api/license/features`
pub async fn features_handler(State(state): State<AppState>) -> ApiResult<FeaturesResponse> {
    let (status, features) = state.manager.feature_states().await?;
    Ok(Json(FeaturesResponse { status, features }))
}

/// `GET /api/status`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.manager.store();
    Json(HealthResponse::new(store.ping().await, store.backend_name()))
}

/// Fallback for paths with no route.
pub async fn route_not_found_handler(uri: Uri) -> ApiError {
    ApiError::with_message(
        ErrorCode::RouteNotFound,
        format!("No endpoint at {}", uri.path()),
    )
}

/// Re-render axum's bare `405` in the error envelope, keeping its `Allow` header.
pub async fn method_not_allowed_envelope(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut enveloped = ApiError::new(ErrorCode::MethodNotAllowed).into_response();
    if let Some(allow) = allow {
        enveloped.headers_mut().insert(header::ALLOW, allow);
    }
    enveloped
}

#[cfg(feature = "admin-api")]
#[derive(Debug, Deserialize, Serialize)]
pub struct RevokeRequest {
    pub license_key: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(feature = "admin-api")]
#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub license: LicenseRecord,
}

/// `POST /api/license/revoke` (requires `admin-api` feature)
#[cfg(feature = "admin-api")]
pub async fn revoke_license_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RevokeRequest>,
) -> ApiResult<RevokeResponse> {
    info!(license_key = %payload.license_key, "Revoking license");

    let license = state
        .manager
        .revoke(payload.license_key.trim(), payload.reason.as_deref())
        .await?;

    Ok(Json(RevokeResponse {
        success: true,
        license,
    }))
}
