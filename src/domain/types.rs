//! Shared value types for location tracking

use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Get current epoch time in milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One reported location sample
///
/// Immutable once created; sessions replace their last known fix wholesale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f32,
    /// Monotonic timestamp taken when the fix entered the process
    pub timestamp: Instant,
}

impl Fix {
    #[inline]
    pub fn new(latitude: f64, longitude: f64, accuracy: f32) -> Self {
        Self { latitude, longitude, accuracy, timestamp: Instant::now() }
    }

    /// Payload handed to the callback channels
    pub fn to_update(&self) -> LocationUpdate {
        LocationUpdate {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy as f64,
        }
    }
}

/// `{latitude, longitude, accuracy}` record delivered to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// Tracking mode of the service. Exactly one may be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    Continuous,
    GeofenceExit,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Continuous => "continuous",
            TrackingMode::GeofenceExit => "geofence_exit",
        }
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode selector plus its mode-specific options, as passed to a start command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSpec {
    Continuous { interval_ms: u64 },
    GeofenceExit,
}

impl ModeSpec {
    pub fn mode(&self) -> TrackingMode {
        match self {
            ModeSpec::Continuous { .. } => TrackingMode::Continuous,
            ModeSpec::GeofenceExit => TrackingMode::GeofenceExit,
        }
    }
}

/// Stable identifier of the watched region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RegionId(pub String);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geofence transition kinds reported by the watching subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceTransition {
    Enter,
    Exit,
    Dwell,
}

/// Circular region watched for exit transitions. Never expires.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceRegion {
    pub id: RegionId,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f32,
    /// Transition that fires for this region (always `Exit` here)
    pub transition: GeofenceTransition,
    /// Fire immediately if the device is already outside when registered
    pub initial_trigger_exit: bool,
}

impl GeofenceRegion {
    /// Exit-only region centered on `fix`
    pub fn around(fix: &Fix, id: RegionId, radius_m: f32, initial_trigger_exit: bool) -> Self {
        Self {
            id,
            latitude: fix.latitude,
            longitude: fix.longitude,
            radius_m,
            transition: GeofenceTransition::Exit,
            initial_trigger_exit,
        }
    }
}

/// Transition delivered by the geofence-monitoring subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceEvent {
    pub region_id: RegionId,
    pub transition: GeofenceTransition,
}

/// Identifies one controller activation; deliveries tagged with another id are stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
