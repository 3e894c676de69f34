//! Command and delivery handlers for the LocationService

use super::{Command, LocationService};
use crate::domain::error::TrackingError;
use crate::domain::types::{ModeSpec, TrackingMode};
use crate::io::provider::TrackingEvent;
use crate::services::callback_registry::CallbackPair;
use crate::services::notification::NotificationPresenter;
use tracing::{debug, info, warn};

impl LocationService {
    /// Apply a command, settle state, then answer the caller
    pub(crate) async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { spec, callbacks, reply } => {
                let result = self.on_start(spec, callbacks).await;
                self.settle();
                let _ = reply.send(result);
            }
            Command::OsRestart { reply } => {
                let result = self.on_os_restart_signal().await;
                self.settle();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.on_stop().await;
                self.settle();
                let _ = reply.send(());
            }
        }
    }

    pub(crate) async fn on_start(
        &mut self,
        spec: ModeSpec,
        callbacks: CallbackPair,
    ) -> Result<(), TrackingError> {
        let mode = spec.mode();
        if !self.config.is_mode_enabled(mode) {
            warn!(mode = %mode, "tracking_mode_disabled");
            return Err(TrackingError::ModeDisabled(mode));
        }
        if let ModeSpec::Continuous { interval_ms: 0 } = spec {
            warn!("tracking_interval_invalid");
            return Err(TrackingError::InvalidInterval(0));
        }

        info!(mode = %mode, callbacks = ?callbacks, "tracking_start");
        self.registry.register(callbacks);
        self.present(&spec);

        match mode {
            TrackingMode::Continuous => self.geofence.stop().await,
            TrackingMode::GeofenceExit => self.continuous.stop().await,
        }

        let result = match spec {
            ModeSpec::Continuous { interval_ms } => self.continuous.start(interval_ms).await,
            ModeSpec::GeofenceExit => self.geofence.start().await,
        };
        if let Err(e) = &result {
            warn!(mode = %mode, error = %e, "tracking_start_failed");
            // A rejected resubscribe keeps the previous interval running
            if let Some(interval_ms) = self.continuous.interval_ms() {
                self.present(&ModeSpec::Continuous { interval_ms });
            }
        }
        result
    }

    /// Resume whichever controller is running; ignored when stopped
    pub(crate) async fn on_os_restart_signal(&mut self) -> Result<(), TrackingError> {
        if self.geofence.is_active() {
            return self.geofence.on_restart_signal().await;
        }
        if self.continuous.is_active() {
            if self.config.resume_on_os_restart() {
                return self.continuous.restart().await;
            }
            debug!("continuous_restart_resume_disabled");
            return Ok(());
        }
        debug!("os_restart_ignored_not_tracking");
        Ok(())
    }

    pub(crate) async fn on_stop(&mut self) {
        info!(active_mode = ?self.status().active_mode(), "tracking_stop");
        self.continuous.stop().await;
        self.geofence.stop().await;
        self.registry.clear();
    }

    pub(crate) async fn handle_event(&mut self, event: TrackingEvent) {
        match event {
            TrackingEvent::Fixes { session, fixes } => {
                self.continuous.on_fixes(session, fixes).await;
            }
            TrackingEvent::FixResolved { session, purpose, outcome } => {
                if let Err(e) = self.geofence.on_fix_resolved(session, purpose, outcome).await {
                    debug!(error = %e, "geofence_cycle_incomplete");
                }
            }
            TrackingEvent::Geofence { session, event } => {
                if let Err(e) = self.geofence.on_geofence_event(session, event).await {
                    debug!(error = %e, "geofence_event_unhandled");
                }
            }
        }
    }

    /// Show (or update) the notification for `spec`
    pub(crate) fn present(&mut self, spec: &ModeSpec) {
        let mode = spec.mode();
        let channel = self.presenter.channel(mode);
        if self.declared_channels.insert(channel.id.clone()) {
            self.notifications.declare_channel(&channel);
            debug!(channel_id = %channel.id, "notification_channel_declared");
        }

        let payload = self.presenter.build(mode, &NotificationPresenter::describe(spec));
        self.notifications.present(self.presenter.notification_id(), &payload);
        if self.presented.replace(mode).is_none() {
            info!(mode = %mode, body = %payload.body, "notification_presented");
        } else {
            debug!(mode = %mode, body = %payload.body, "notification_updated");
        }
    }

    /// Release the notification and publish the current status
    pub(crate) fn settle(&mut self) {
        self.reconcile_notification();
        self.publish_status();
    }

    /// Drop the notification once neither controller runs
    fn reconcile_notification(&mut self) {
        if self.presented.is_none() || self.continuous.is_active() || self.geofence.is_active() {
            return;
        }
        self.notifications.release(self.presenter.notification_id());
        self.presented = None;
        info!("notification_released");
    }

    fn publish_status(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Every handle is gone: stop tracking and release host resources
    pub(crate) async fn shutdown(&mut self) {
        self.on_stop().await;
        self.settle();
    }
}
