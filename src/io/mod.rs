//! IO modules - host platform interfaces
//!
//! - `capability` - Location permission gate
//! - `provider` - Fix and geofence providers, delivery sinks
//! - `notification` - Persistent notification contract
//! - `mock` - Recording platform used by the tests
//! - `simulated` - Walking device used by the simulator binary

pub mod capability;
pub mod mock;
pub mod notification;
pub mod provider;
pub mod simulated;

use std::sync::Arc;

pub use capability::{has_location_capability, Capability, CapabilityGate, StaticCapabilities};
pub use notification::{NotificationChannel, NotificationHost, NotificationPayload};
pub use provider::{
    FetchOutcome, FetchPurpose, FixSink, GeofenceEventSink, GeofenceProvider, LocationProvider,
    LocationRequest, ProviderError, TrackingEvent,
};

/// Host services the tracking core calls into
#[derive(Clone)]
pub struct Platform {
    pub capabilities: Arc<dyn CapabilityGate>,
    pub location: Arc<dyn LocationProvider>,
    pub geofence: Arc<dyn GeofenceProvider>,
    pub notifications: Arc<dyn NotificationHost>,
}
