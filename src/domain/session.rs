//! Live state of an active controller

use crate::domain::types::{Fix, GeofenceRegion, SessionId, TrackingMode};

/// Polling-mode state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousState {
    Stopped,
    Running,
}

/// Geofence-mode state machine
///
/// `Disarmed` is the resting state after a fix could not be obtained: the
/// controller is alive but watches no region until the next restart signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceState {
    Stopped,
    AwaitingInitialFix,
    RegionArmed,
    AwaitingReacquisitionFix,
    Disarmed,
}

impl GeofenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeofenceState::Stopped => "stopped",
            GeofenceState::AwaitingInitialFix => "awaiting_initial_fix",
            GeofenceState::RegionArmed => "region_armed",
            GeofenceState::AwaitingReacquisitionFix => "awaiting_reacquisition_fix",
            GeofenceState::Disarmed => "disarmed",
        }
    }
}

/// Session owned exclusively by its controller
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub id: SessionId,
    pub mode: TrackingMode,
    /// Continuous only
    pub interval_ms: Option<u64>,
    /// GeofenceExit only
    pub active_region: Option<GeofenceRegion>,
    pub running: bool,
    pub last_fix: Option<Fix>,
}

impl TrackingSession {
    pub fn continuous(interval_ms: u64) -> Self {
        Self {
            id: SessionId::new(),
            mode: TrackingMode::Continuous,
            interval_ms: Some(interval_ms),
            active_region: None,
            running: true,
            last_fix: None,
        }
    }

    pub fn geofence() -> Self {
        Self {
            id: SessionId::new(),
            mode: TrackingMode::GeofenceExit,
            interval_ms: None,
            active_region: None,
            running: true,
            last_fix: None,
        }
    }

    /// Replace the last known fix
    #[inline]
    pub fn record_fix(&mut self, fix: Fix) {
        self.last_fix = Some(fix);
    }
}
