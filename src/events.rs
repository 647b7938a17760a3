//! Structured logging of license state changes.

use tracing::{info, info_span, warn};

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License was issued
    Issued,
    /// License was bound to this installation
    Activated,
    /// License was released from this installation
    Deactivated,
    /// License passed its expiry date
    Expired,
    /// License was revoked by an administrator
    Revoked,
    /// A key was presented and refused
    ValidationFailed,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Issued => "issued",
            LicenseEvent::Activated => "activated",
            LicenseEvent::Deactivated => "deactivated",
            LicenseEvent::Expired => "expired",
            LicenseEvent::Revoked => "revoked",
            LicenseEvent::ValidationFailed => "validation_failed",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// Failed validations are logged at `warn`, everything else at `info`.
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match (event, details) {
        (LicenseEvent::ValidationFailed, Some(d)) => warn!(reason = %d, "License event occurred"),
        (LicenseEvent::ValidationFailed, None) => warn!("License event occurred"),
        (_, Some(d)) => info!(details = %d, "License event occurred"),
        (_, None) => info!("License event occurred"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(LicenseEvent::Activated.to_string(), "activated");
    }

    #[test]
    fn logging_without_subscriber_is_harmless() {
        log_license_event(LicenseEvent::Revoked, "WARP-TEST", Some("chargeback"));
        log_license_event(LicenseEvent::ValidationFailed, "WARP-TEST", None);
    }
}
