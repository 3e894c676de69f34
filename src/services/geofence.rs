//! Geofence-exit controller
//!
//! Watches one circular region around the last fix. An exit fetches a new
//! fix, reports it and moves the region there (remove, then add).
//!
//! Fix requests run on spawned tasks and come back as
//! `TrackingEvent::FixResolved`; results for an older session are dropped.

use crate::domain::error::TrackingError;
use crate::domain::session::{GeofenceState, TrackingSession};
use crate::domain::types::{Fix, GeofenceEvent, GeofenceRegion, GeofenceTransition, RegionId, SessionId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::capability::{has_location_capability, Capability, CapabilityGate};
use crate::io::provider::{
    FetchOutcome, FetchPurpose, GeofenceEventSink, GeofenceProvider, LocationProvider, TrackingEvent,
};
use crate::io::Platform;
use crate::services::callback_registry::CallbackRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct GeofenceController {
    state: GeofenceState,
    session: Option<TrackingSession>,
    region_id: RegionId,
    radius_m: f32,
    initial_trigger_exit: bool,
    require_precise_for_region: bool,
    capabilities: Arc<dyn CapabilityGate>,
    location: Arc<dyn LocationProvider>,
    geofence: Arc<dyn GeofenceProvider>,
    registry: Arc<CallbackRegistry>,
    metrics: Arc<Metrics>,
    events_tx: mpsc::Sender<TrackingEvent>,
}

impl GeofenceController {
    pub fn new(
        config: &Config,
        platform: &Platform,
        registry: Arc<CallbackRegistry>,
        metrics: Arc<Metrics>,
        events_tx: mpsc::Sender<TrackingEvent>,
    ) -> Self {
        Self {
            state: GeofenceState::Stopped,
            session: None,
            region_id: config.geofence_region_id(),
            radius_m: config.geofence_radius_m(),
            initial_trigger_exit: config.geofence_initial_trigger_exit(),
            require_precise_for_region: config.require_precise_for_region(),
            capabilities: platform.capabilities.clone(),
            location: platform.location.clone(),
            geofence: platform.geofence.clone(),
            registry,
            metrics,
            events_tx,
        }
    }

    pub fn state(&self) -> GeofenceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != GeofenceState::Stopped
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// Fetch the first fix; arming follows when it resolves
    ///
    /// A second start while active leaves the running cycle alone.
    pub async fn start(&mut self) -> Result<(), TrackingError> {
        if self.is_active() {
            debug!(state = %self.state.as_str(), "geofence_already_active");
            return Ok(());
        }
        self.require_location("geofence start").await?;

        let session = TrackingSession::geofence();
        info!(session = %session.id, "geofence_started");
        self.session = Some(session);
        self.state = GeofenceState::AwaitingInitialFix;
        self.fetch_fix(FetchPurpose::Initial).await
    }

    /// Host asked for the region to be recreated
    pub async fn on_restart_signal(&mut self) -> Result<(), TrackingError> {
        if !self.is_active() {
            debug!("geofence_restart_ignored_not_running");
            return Ok(());
        }
        info!(state = %self.state.as_str(), "geofence_restart_signal");
        self.fetch_fix(FetchPurpose::Restart).await
    }

    /// Remove the region and forget the session; no-op when already stopped
    pub async fn stop(&mut self) {
        if self.state == GeofenceState::Stopped {
            return;
        }
        if let Err(e) = self.geofence.remove_geofence(&self.region_id).await {
            self.metrics.record_region_failure();
            warn!(region_id = %self.region_id, error = %e, "geofence_remove_on_stop_failed");
        }
        if let Some(session) = self.session.take() {
            info!(session = %session.id, "geofence_stopped");
        }
        self.state = GeofenceState::Stopped;
    }

    /// Completion of a spawned fix request
    pub async fn on_fix_resolved(
        &mut self,
        session_id: SessionId,
        purpose: FetchPurpose,
        outcome: FetchOutcome,
    ) -> Result<(), TrackingError> {
        if self.session.as_ref().map(|s| s.id) != Some(session_id) {
            self.metrics.record_stale_delivery();
            debug!(session = %session_id, purpose = %purpose.as_str(), "geofence_stale_fix");
            return Ok(());
        }

        let fix = match outcome {
            FetchOutcome::Fix(fix) => fix,
            FetchOutcome::Unavailable => {
                warn!(purpose = %purpose.as_str(), "geofence_fix_unavailable");
                self.settle_without_fix();
                return Err(TrackingError::ProviderUnavailable("no last known location".to_string()));
            }
            FetchOutcome::Failed(e) => {
                self.metrics.record_provider_failure();
                warn!(purpose = %purpose.as_str(), error = %e, "geofence_fix_failed");
                self.settle_without_fix();
                return Err(TrackingError::ProviderUnavailable(e.to_string()));
            }
        };

        self.metrics.record_fix_received();
        if let Some(session) = self.session.as_mut() {
            session.record_fix(fix);
        }
        if purpose.dispatches() {
            self.registry.dispatch(&fix).await;
        }
        self.rearm(&fix).await
    }

    /// Transition reported for a region registered by `session_id`
    pub async fn on_geofence_event(
        &mut self,
        session_id: SessionId,
        event: GeofenceEvent,
    ) -> Result<(), TrackingError> {
        if self.session.as_ref().map(|s| s.id) != Some(session_id) {
            self.metrics.record_stale_delivery();
            debug!(session = %session_id, transition = ?event.transition, "geofence_stale_event");
            return Ok(());
        }
        if event.region_id != self.region_id {
            debug!(region_id = %event.region_id, "geofence_event_foreign_region");
            return Ok(());
        }
        if event.transition != GeofenceTransition::Exit {
            debug!(transition = ?event.transition, "geofence_event_ignored");
            return Ok(());
        }
        if self.state != GeofenceState::RegionArmed {
            debug!(state = %self.state.as_str(), "geofence_exit_ignored_not_armed");
            return Ok(());
        }

        self.metrics.record_geofence_exit();
        info!(region_id = %event.region_id, "geofence_exit");
        self.state = GeofenceState::AwaitingReacquisitionFix;
        self.fetch_fix(FetchPurpose::ExitReacquisition).await
    }

    /// Move the watched region to `fix`
    ///
    /// Remove failures are logged and the add still runs. If the add fails the
    /// previous region stays recorded until the next successful cycle.
    async fn rearm(&mut self, fix: &Fix) -> Result<(), TrackingError> {
        let Some(session_id) = self.session.as_ref().map(|s| s.id) else {
            return Ok(());
        };
        self.require_location("region add").await?;
        if self.require_precise_for_region
            && !self.capabilities.is_granted(Capability::PreciseLocation)
        {
            self.metrics.record_capability_denied();
            error!("geofence_precise_capability_missing");
            self.stop().await;
            return Err(TrackingError::CapabilityDenied("region add requires precise location"));
        }

        let region =
            GeofenceRegion::around(fix, self.region_id.clone(), self.radius_m, self.initial_trigger_exit);

        if let Err(e) = self.geofence.remove_geofence(&region.id).await {
            self.metrics.record_region_failure();
            let err = TrackingError::RegionReplacement { stage: "remove", reason: e.to_string() };
            warn!(error = %err, "geofence_replace_partial");
        }

        let sink = GeofenceEventSink::new(session_id, self.events_tx.clone());
        let result = self.geofence.add_geofence(&region, sink).await;
        self.state = GeofenceState::RegionArmed;

        match result {
            Ok(()) => {
                self.metrics.record_region_registered();
                info!(
                    region_id = %region.id,
                    lat = %region.latitude,
                    lng = %region.longitude,
                    radius_m = %region.radius_m,
                    "geofence_armed"
                );
                if let Some(session) = self.session.as_mut() {
                    session.active_region = Some(region);
                }
                Ok(())
            }
            Err(e) => {
                self.metrics.record_region_failure();
                let err = TrackingError::RegionReplacement { stage: "add", reason: e.to_string() };
                warn!(error = %err, "geofence_replace_failed");
                Err(err)
            }
        }
    }

    /// Spawn a single-fix request for the current session
    async fn fetch_fix(&mut self, purpose: FetchPurpose) -> Result<(), TrackingError> {
        self.require_location("fix request").await?;
        let Some(session) = self.session.as_ref().map(|s| s.id) else {
            return Ok(());
        };

        let location = self.location.clone();
        let tx = self.events_tx.clone();
        debug!(session = %session, purpose = %purpose.as_str(), "geofence_fetch_fix");
        tokio::spawn(async move {
            let outcome = FetchOutcome::from(location.last_location().await);
            if tx.send(TrackingEvent::FixResolved { session, purpose, outcome }).await.is_err() {
                debug!("geofence_fix_service_gone");
            }
        });
        Ok(())
    }

    /// A pending fetch came back empty; an armed region stays armed
    fn settle_without_fix(&mut self) {
        if matches!(
            self.state,
            GeofenceState::AwaitingInitialFix | GeofenceState::AwaitingReacquisitionFix
        ) {
            self.state = GeofenceState::Disarmed;
        }
    }

    /// Check access, dropping to Stopped when neither level is granted
    async fn require_location(&mut self, operation: &'static str) -> Result<(), TrackingError> {
        if has_location_capability(self.capabilities.as_ref()) {
            return Ok(());
        }
        self.metrics.record_capability_denied();
        error!(operation = %operation, "geofence_capability_denied");
        self.stop().await;
        Err(TrackingError::CapabilityDenied(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::{MockPlatform, PlatformCall};
    use crate::io::provider::ProviderError;
    use crate::services::callback_registry::create_callback_registry;
    use crate::services::dispatch_worker::DispatchWorker;
    use tokio::time::{timeout, Duration};

    struct Harness {
        controller: GeofenceController,
        mock: Arc<MockPlatform>,
        metrics: Arc<Metrics>,
        events_rx: mpsc::Receiver<TrackingEvent>,
        /// Held so the dispatch queue stays open
        _worker: DispatchWorker,
    }

    impl Harness {
        /// Feed the next queued event back into the controller
        async fn pump(&mut self) -> Result<(), TrackingError> {
            let event = timeout(Duration::from_secs(1), self.events_rx.recv())
                .await
                .expect("event timeout")
                .expect("channel closed");
            match event {
                TrackingEvent::FixResolved { session, purpose, outcome } => {
                    self.controller.on_fix_resolved(session, purpose, outcome).await
                }
                TrackingEvent::Geofence { session, event } => {
                    self.controller.on_geofence_event(session, event).await
                }
                TrackingEvent::Fixes { .. } => panic!("unexpected recurring fixes"),
            }
        }
    }

    fn harness() -> Harness {
        let mock = Arc::new(MockPlatform::new());
        let metrics = Arc::new(Metrics::new());
        let (registry, worker) = create_callback_registry(metrics.clone(), 64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let controller = GeofenceController::new(
            &Config::default(),
            &mock.platform(),
            registry,
            metrics.clone(),
            events_tx,
        );
        Harness { controller, mock, metrics, events_rx, _worker: worker }
    }

    fn adds(mock: &MockPlatform) -> Vec<(f64, f64)> {
        mock.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::AddGeofence { latitude, longitude, .. } => Some((latitude, longitude)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_initial_fix_arms_region() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));

        h.controller.start().await.unwrap();
        assert_eq!(h.controller.state(), GeofenceState::AwaitingInitialFix);
        h.pump().await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
        assert_eq!(h.metrics.fixes_dispatched(), 1);
        let region = h.mock.active_region().unwrap();
        assert_eq!(region.radius_m, 100.0);
        assert_eq!(region.id, RegionId("dynamic_geofence_v2".to_string()));
    }

    #[tokio::test]
    async fn test_exit_reacquires_and_rearms() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.mock.push_last_location(Ok(Some(Fix::new(10.001, 20.001, 5.0))));
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();

        h.mock.trigger_exit();
        h.pump().await.unwrap();
        assert_eq!(h.controller.state(), GeofenceState::AwaitingReacquisitionFix);
        h.pump().await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
        assert_eq!(adds(&h.mock), vec![(10.0, 20.0), (10.001, 20.001)]);
        assert_eq!(h.metrics.fixes_dispatched(), 2);

        // Remove always precedes the add
        let calls = h.mock.provider_calls();
        let last_two = &calls[calls.len() - 2..];
        assert!(matches!(last_two[0], PlatformCall::RemoveGeofence { .. }));
        assert!(matches!(last_two[1], PlatformCall::AddGeofence { .. }));
    }

    fn exit_event() -> GeofenceEvent {
        GeofenceEvent {
            region_id: RegionId("dynamic_geofence_v2".to_string()),
            transition: GeofenceTransition::Exit,
        }
    }

    #[tokio::test]
    async fn test_exit_ignored_unless_armed() {
        let mut h = harness();
        h.controller.start().await.unwrap();
        let _ = h.pump().await;
        assert_eq!(h.controller.state(), GeofenceState::Disarmed);
        let session = h.controller.session().unwrap().id;

        h.controller.on_geofence_event(session, exit_event()).await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::Disarmed);
        assert_eq!(h.mock.count(|c| *c == PlatformCall::LastLocation), 1);
    }

    #[tokio::test]
    async fn test_exit_from_previous_session_is_stale() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.mock.push_last_location(Ok(Some(Fix::new(30.0, 40.0, 5.0))));
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();
        let previous = h.controller.session().unwrap().id;
        h.controller.stop().await;
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();
        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);

        h.controller.on_geofence_event(previous, exit_event()).await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
        assert_eq!(h.mock.count(|c| *c == PlatformCall::LastLocation), 2);
        assert_eq!(h.metrics.stale_deliveries(), 1);
        assert_eq!(h.metrics.fixes_dispatched(), 2);
    }

    #[tokio::test]
    async fn test_non_exit_transition_ignored() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();

        h.mock.trigger_transition(GeofenceTransition::Dwell);
        h.pump().await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
        assert_eq!(h.mock.count(|c| *c == PlatformCall::LastLocation), 1);
    }

    #[tokio::test]
    async fn test_missing_fix_disarms() {
        let mut h = harness();
        h.controller.start().await.unwrap();

        let result = h.pump().await;

        assert!(matches!(result, Err(TrackingError::ProviderUnavailable(_))));
        assert_eq!(h.controller.state(), GeofenceState::Disarmed);
        assert!(h.controller.is_active());
        assert_eq!(h.mock.count(|c| matches!(c, PlatformCall::AddGeofence { .. })), 0);
    }

    #[tokio::test]
    async fn test_restart_rearms_without_dispatch() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.mock.push_last_location(Ok(Some(Fix::new(11.0, 21.0, 5.0))));
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();

        h.controller.on_restart_signal().await.unwrap();
        h.pump().await.unwrap();

        assert_eq!(h.metrics.fixes_dispatched(), 1);
        assert_eq!(adds(&h.mock), vec![(10.0, 20.0), (11.0, 21.0)]);
        assert_eq!(h.controller.session().and_then(|s| s.last_fix).map(|f| f.latitude), Some(11.0));
    }

    #[tokio::test]
    async fn test_restart_recovers_disarmed() {
        let mut h = harness();
        h.controller.start().await.unwrap();
        let _ = h.pump().await;
        assert_eq!(h.controller.state(), GeofenceState::Disarmed);

        h.mock.push_last_location(Ok(Some(Fix::new(3.0, 4.0, 5.0))));
        h.controller.on_restart_signal().await.unwrap();
        h.pump().await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
    }

    #[tokio::test]
    async fn test_add_failure_keeps_previous_region() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.mock.push_last_location(Ok(Some(Fix::new(12.0, 22.0, 5.0))));
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();

        h.mock.fail_add_geofence(true);
        h.mock.trigger_exit();
        h.pump().await.unwrap();
        let result = h.pump().await;

        assert!(matches!(result, Err(TrackingError::RegionReplacement { stage: "add", .. })));
        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
        let recorded = h.controller.session().and_then(|s| s.active_region.clone()).unwrap();
        assert_eq!(recorded.latitude, 10.0);
    }

    #[tokio::test]
    async fn test_remove_failure_still_adds() {
        let mut h = harness();
        h.mock.fail_remove_geofence(true);
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.controller.start().await.unwrap();

        h.pump().await.unwrap();

        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
        assert_eq!(adds(&h.mock).len(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_counts_failure() {
        let mut h = harness();
        h.mock.push_last_location(Err(ProviderError::Unavailable("gps off".into())));
        h.controller.start().await.unwrap();

        assert!(h.pump().await.is_err());
        assert_eq!(h.metrics.report().provider_failures, 1);
    }

    #[tokio::test]
    async fn test_denied_start_makes_no_provider_call() {
        let mut h = harness();
        h.mock.revoke_all();

        let result = h.controller.start().await;

        assert!(matches!(result, Err(TrackingError::CapabilityDenied(_))));
        assert_eq!(h.controller.state(), GeofenceState::Stopped);
        assert!(h.mock.provider_calls().is_empty());
    }

    #[tokio::test]
    async fn test_revocation_before_rearm_stops() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.controller.start().await.unwrap();
        h.mock.revoke_all();

        let result = h.pump().await;

        assert!(matches!(result, Err(TrackingError::CapabilityDenied(_))));
        assert_eq!(h.controller.state(), GeofenceState::Stopped);
        assert_eq!(adds(&h.mock).len(), 0);
    }

    #[tokio::test]
    async fn test_region_requires_precise() {
        let mut h = harness();
        h.mock.set_capability(Capability::PreciseLocation, false);
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.controller.start().await.unwrap();

        let result = h.pump().await;

        assert!(matches!(result, Err(TrackingError::CapabilityDenied(_))));
        assert_eq!(adds(&h.mock).len(), 0);
        assert!(!h.controller.is_active());
    }

    #[tokio::test]
    async fn test_fix_after_stop_is_stale() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.controller.start().await.unwrap();
        h.controller.stop().await;

        h.pump().await.unwrap();

        assert_eq!(h.metrics.fixes_dispatched(), 0);
        assert_eq!(h.metrics.stale_deliveries(), 1);
        assert_eq!(adds(&h.mock).len(), 0);
    }

    #[tokio::test]
    async fn test_second_start_is_idempotent() {
        let mut h = harness();
        h.mock.push_last_location(Ok(Some(Fix::new(10.0, 20.0, 5.0))));
        h.controller.start().await.unwrap();
        h.pump().await.unwrap();

        h.controller.start().await.unwrap();

        assert_eq!(h.mock.count(|c| *c == PlatformCall::LastLocation), 1);
        assert_eq!(h.controller.state(), GeofenceState::RegionArmed);
    }
}
