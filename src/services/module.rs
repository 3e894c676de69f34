//! Command surface for the embedding application
//!
//! Thin wrapper over `ServiceHandle`: picks the mode, wires the foreground
//! broadcast channel as the foreground callback and never returns an error.
//! Failures are logged by the service and show up only as "not tracking".
//!
//! The module stands for the embedding runtime. Updates are emitted whether
//! or not anyone listens; once the module is dropped the foreground callback
//! reports the runtime as gone and is unregistered.

use crate::domain::error::CallbackError;
use crate::domain::types::{LocationUpdate, ModeSpec};
use crate::infra::config::Config;
use crate::services::callback_registry::{into_callback, CallbackPair, LocationCallback};
use crate::services::lifecycle::ServiceHandle;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

pub struct LocationModule {
    handle: ServiceHandle,
    default_interval_ms: u64,
    /// Foreground "LocationUpdate" emitter; callbacks only hold a `Weak`
    updates_tx: Arc<broadcast::Sender<LocationUpdate>>,
}

impl LocationModule {
    pub fn new(handle: ServiceHandle, config: &Config) -> Self {
        let (updates_tx, _) = broadcast::channel(config.foreground_buffer());
        Self {
            handle,
            default_interval_ms: config.default_interval_ms(),
            updates_tx: Arc::new(updates_tx),
        }
    }

    /// Subscribe to foreground updates; dropping the receiver unsubscribes
    pub fn on_location_update(&self) -> broadcast::Receiver<LocationUpdate> {
        self.updates_tx.subscribe()
    }

    /// Handler invoked for every fix, also when no foreground receiver exists
    pub fn register_background_handler<F>(&self, handler: F)
    where
        F: Fn(&LocationUpdate) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.handle.registry().set_background(into_callback(handler));
    }

    /// Start continuous tracking; returns whether tracking is active afterwards
    pub async fn start(&self, interval_ms: u64) -> bool {
        self.start_mode(ModeSpec::Continuous { interval_ms }).await
    }

    pub async fn start_default(&self) -> bool {
        self.start(self.default_interval_ms).await
    }

    pub async fn start_with_geofence(&self) -> bool {
        self.start_mode(ModeSpec::GeofenceExit).await
    }

    pub async fn stop(&self) {
        if let Err(e) = self.handle.on_stop().await {
            debug!(error = %e, "module_stop_failed");
        }
    }

    pub fn is_tracking_active(&self) -> bool {
        self.handle.is_tracking_active()
    }

    pub fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    async fn start_mode(&self, spec: ModeSpec) -> bool {
        let callbacks = CallbackPair::foreground(self.foreground_callback());
        if let Err(e) = self.handle.on_start(spec, callbacks).await {
            debug!(error = %e, "module_start_failed");
        }
        self.handle.is_tracking_active()
    }

    fn foreground_callback(&self) -> LocationCallback {
        let updates_tx = Arc::downgrade(&self.updates_tx);
        into_callback(move |update| {
            let Some(updates_tx) = updates_tx.upgrade() else {
                return Err(CallbackError::RuntimeUnavailable);
            };
            if updates_tx.send(*update).is_err() {
                trace!("foreground_update_no_listener");
            }
            Ok(())
        })
    }
}
