//! Continuous polling controller
//!
//! Subscribes to recurring fixes at a single interval and forwards every fix
//! of the current session to the callback registry, in arrival order.

use crate::domain::error::TrackingError;
use crate::domain::session::{ContinuousState, TrackingSession};
use crate::domain::types::{Fix, SessionId};
use crate::infra::metrics::Metrics;
use crate::io::capability::{has_location_capability, CapabilityGate};
use crate::io::provider::{FixSink, LocationProvider, LocationRequest, TrackingEvent};
use crate::services::callback_registry::CallbackRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct ContinuousController {
    state: ContinuousState,
    session: Option<TrackingSession>,
    capabilities: Arc<dyn CapabilityGate>,
    provider: Arc<dyn LocationProvider>,
    registry: Arc<CallbackRegistry>,
    metrics: Arc<Metrics>,
    /// Cloned into every `FixSink`
    events_tx: mpsc::Sender<TrackingEvent>,
}

impl ContinuousController {
    pub fn new(
        capabilities: Arc<dyn CapabilityGate>,
        provider: Arc<dyn LocationProvider>,
        registry: Arc<CallbackRegistry>,
        metrics: Arc<Metrics>,
        events_tx: mpsc::Sender<TrackingEvent>,
    ) -> Self {
        Self {
            state: ContinuousState::Stopped,
            session: None,
            capabilities,
            provider,
            registry,
            metrics,
            events_tx,
        }
    }

    pub fn state(&self) -> ContinuousState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ContinuousState::Running
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// Subscribe at `interval_ms`, replacing any running subscription
    ///
    /// If the new request is rejected while a subscription was running, the
    /// previous interval is requested again and the controller stays Running.
    pub async fn start(&mut self, interval_ms: u64) -> Result<(), TrackingError> {
        if interval_ms == 0 {
            return Err(TrackingError::InvalidInterval(interval_ms));
        }
        if !has_location_capability(self.capabilities.as_ref()) {
            self.metrics.record_capability_denied();
            error!("continuous_start_capability_denied");
            self.stop().await;
            return Err(TrackingError::CapabilityDenied("continuous start"));
        }

        let previous = if self.is_active() {
            info!(interval_ms = %interval_ms, "continuous_resubscribe");
            self.release_updates().await;
            self.session.take()
        } else {
            None
        };

        let mut session = TrackingSession::continuous(interval_ms);
        session.last_fix = previous.as_ref().and_then(|s| s.last_fix);
        match self.subscribe(&session).await {
            Ok(()) => {
                info!(session = %session.id, interval_ms = %interval_ms, "continuous_started");
                self.session = Some(session);
                self.state = ContinuousState::Running;
                Ok(())
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.keep_previous(previous).await;
                }
                Err(e)
            }
        }
    }

    /// Re-subscribe after the host restarted the service, keeping the interval
    pub async fn restart(&mut self) -> Result<(), TrackingError> {
        let Some(interval_ms) = self.interval_ms() else {
            debug!("continuous_restart_ignored_not_running");
            return Ok(());
        };
        info!(interval_ms = %interval_ms, "continuous_restart");
        self.start(interval_ms).await
    }

    /// Interval of the running session
    pub fn interval_ms(&self) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.interval_ms)
    }

    async fn subscribe(&self, session: &TrackingSession) -> Result<(), TrackingError> {
        let interval_ms = session.interval_ms.unwrap_or_default();
        let sink = FixSink::new(session.id, self.events_tx.clone(), self.metrics.clone());
        let request = LocationRequest::high_accuracy(interval_ms);

        self.provider.request_location_updates(request, sink).await.map_err(|e| {
            self.metrics.record_provider_failure();
            warn!(interval_ms = %interval_ms, error = %e, "continuous_subscribe_failed");
            TrackingError::ProviderUnavailable(e.to_string())
        })
    }

    /// Fall back to the session that was running before a failed resubscribe
    async fn keep_previous(&mut self, previous: TrackingSession) {
        if self.subscribe(&previous).await.is_ok() {
            info!(
                session = %previous.id,
                interval_ms = ?previous.interval_ms,
                "continuous_previous_interval_restored"
            );
        } else {
            warn!(session = %previous.id, "continuous_running_without_subscription");
        }
        self.session = Some(previous);
    }

    async fn release_updates(&self) {
        if let Err(e) = self.provider.remove_location_updates().await {
            self.metrics.record_provider_failure();
            warn!(error = %e, "continuous_remove_updates_failed");
        }
    }

    /// Release the subscription; no-op when already stopped
    pub async fn stop(&mut self) {
        if self.state == ContinuousState::Stopped {
            return;
        }
        self.release_updates().await;
        if let Some(session) = self.session.take() {
            info!(session = %session.id, "continuous_stopped");
        }
        self.state = ContinuousState::Stopped;
    }

    /// Forward a delivered batch, dropping it if the session is gone
    pub async fn on_fixes(&mut self, session_id: SessionId, fixes: Vec<Fix>) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id) else {
            self.metrics.record_stale_delivery();
            debug!(session = %session_id, count = %fixes.len(), "continuous_stale_fixes");
            return;
        };

        for fix in fixes {
            self.metrics.record_fix_received();
            session.record_fix(fix);
            self.registry.dispatch(&fix).await;
        }
    }
}
