//! Domain models - location values, sessions and failures
//!
//! - `types` - `Fix`, `LocationUpdate`, modes and geofence regions
//! - `session` - `TrackingSession` and the controller state machines
//! - `error` - failure taxonomy shared by the controllers

pub mod error;
pub mod session;
pub mod types;

pub use error::{CallbackError, TrackingError};
pub use session::{ContinuousState, GeofenceState, TrackingSession};
pub use types::{
    Fix, GeofenceEvent, GeofenceRegion, GeofenceTransition, LocationUpdate, ModeSpec, RegionId,
    SessionId, TrackingMode,
};
