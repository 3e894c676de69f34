//! Services - tracking state machines and callback delivery
//!
//! This module contains the tracking core:
//! - `callback_registry` - Foreground/background callback slots
//! - `dispatch_worker` - Async worker invoking the registered callbacks
//! - `notification` - Persistent notification payloads
//! - `continuous` - Polling-mode controller
//! - `geofence` - Geofence-exit controller
//! - `lifecycle` - Service actor owning both controllers
//! - `module` - Command surface for the embedding application

pub mod callback_registry;
pub mod continuous;
pub mod dispatch_worker;
pub mod geofence;
pub mod lifecycle;
pub mod module;
pub mod notification;

// Re-export commonly used types
pub use callback_registry::{
    create_callback_registry, into_callback, CallbackPair, CallbackRegistry, LocationCallback,
};
pub use continuous::ContinuousController;
pub use dispatch_worker::{DispatchJob, DispatchWorker};
pub use geofence::GeofenceController;
pub use lifecycle::{Command, LocationService, ServiceHandle, ServiceStatus};
pub use module::LocationModule;
pub use notification::NotificationPresenter;
