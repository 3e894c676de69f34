//! Failure taxonomy
//!
//! None of these reach the embedding application. Controllers log them and
//! degrade to "no further fixes until the next trigger".

use crate::domain::types::TrackingMode;
use thiserror::Error;

/// Failures inside the tracking core
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Neither precise nor approximate location access is granted
    #[error("location capability denied ({0})")]
    CapabilityDenied(&'static str),

    /// A fix or region request failed at the provider
    #[error("location provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Remove or add failed while replacing the watched region
    #[error("region replacement failed during {stage}: {reason}")]
    RegionReplacement { stage: &'static str, reason: String },

    /// The requested mode is not in the configured mode set
    #[error("tracking mode {0} is disabled")]
    ModeDisabled(TrackingMode),

    #[error("interval must be positive, got {0}ms")]
    InvalidInterval(u64),

    /// The service loop is gone
    #[error("location service stopped")]
    ServiceStopped,
}

/// Failure reported by one registered callback
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Foreground runtime is no longer reachable; the slot is cleared
    #[error("embedding runtime unavailable")]
    RuntimeUnavailable,

    #[error("callback failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TrackingError::RegionReplacement { stage: "add", reason: "timeout".into() };
        assert_eq!(err.to_string(), "region replacement failed during add: timeout");
        assert_eq!(
            TrackingError::ModeDisabled(TrackingMode::GeofenceExit).to_string(),
            "tracking mode geofence_exit is disabled"
        );
    }
}
