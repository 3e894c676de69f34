//! Location and geofence provider interfaces
//!
//! Providers answer asynchronously. Recurring fixes and geofence transitions
//! are pushed back into the service through the sinks handed over at
//! registration time; the sinks never block the provider's delivery context.

use crate::domain::types::{Fix, GeofenceEvent, GeofenceRegion, RegionId, SessionId};
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Provider-side failures
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Access was revoked between the capability check and the call
    #[error("permission revoked: {0}")]
    PermissionRevoked(String),
}

/// Request priority passed to the fix provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    HighAccuracy,
    Balanced,
}

/// Recurring update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    pub interval_ms: u64,
    pub min_update_interval_ms: u64,
    pub priority: Priority,
}

impl LocationRequest {
    /// One interval for both the requested and the minimum update interval
    pub fn high_accuracy(interval_ms: u64) -> Self {
        Self { interval_ms, min_update_interval_ms: interval_ms, priority: Priority::HighAccuracy }
    }
}

/// Why a single fix was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// First fix after a start command
    Initial,
    /// Fix after leaving the watched region
    ExitReacquisition,
    /// Host asked for the region to be recreated
    Restart,
}

impl FetchPurpose {
    /// Restart fetches rearm without reporting the fix
    pub fn dispatches(&self) -> bool {
        !matches!(self, FetchPurpose::Restart)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPurpose::Initial => "initial",
            FetchPurpose::ExitReacquisition => "exit_reacquisition",
            FetchPurpose::Restart => "restart",
        }
    }
}

/// Result of a single fix request
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fix(Fix),
    /// Provider answered but had no fix
    Unavailable,
    Failed(ProviderError),
}

impl From<Result<Option<Fix>, ProviderError>> for FetchOutcome {
    fn from(result: Result<Option<Fix>, ProviderError>) -> Self {
        match result {
            Ok(Some(fix)) => FetchOutcome::Fix(fix),
            Ok(None) => FetchOutcome::Unavailable,
            Err(e) => FetchOutcome::Failed(e),
        }
    }
}

/// Asynchronous deliveries consumed by the service loop
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    /// Recurring fixes, in arrival order
    Fixes { session: SessionId, fixes: Vec<Fix> },
    /// Completion of a single fix request
    FixResolved { session: SessionId, purpose: FetchPurpose, outcome: FetchOutcome },
    /// Transition reported for a region registered by `session`
    Geofence { session: SessionId, event: GeofenceEvent },
}

/// Delivery handle for recurring fixes, bound to one session
#[derive(Clone)]
pub struct FixSink {
    session: SessionId,
    tx: mpsc::Sender<TrackingEvent>,
    metrics: Arc<Metrics>,
}

impl FixSink {
    pub fn new(session: SessionId, tx: mpsc::Sender<TrackingEvent>, metrics: Arc<Metrics>) -> Self {
        Self { session, tx, metrics }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn deliver(&self, fix: Fix) {
        self.deliver_batch(vec![fix]);
    }

    /// Hand a batch to the service without waiting
    ///
    /// The service queue is bounded by `dispatch.queue_size` events; a batch
    /// arriving while it is full is dropped and counted.
    pub fn deliver_batch(&self, fixes: Vec<Fix>) {
        if fixes.is_empty() {
            return;
        }
        let count = fixes.len();
        match self.tx.try_send(TrackingEvent::Fixes { session: self.session, fixes }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dispatch_dropped();
                warn!(session = %self.session, count = %count, "fix_delivery_dropped_queue_full");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session = %self.session, "fix_delivery_service_gone");
            }
        }
    }
}

/// Delivery handle for geofence transitions, bound to one session
#[derive(Clone)]
pub struct GeofenceEventSink {
    session: SessionId,
    tx: mpsc::Sender<TrackingEvent>,
}

impl GeofenceEventSink {
    pub fn new(session: SessionId, tx: mpsc::Sender<TrackingEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn deliver(&self, event: GeofenceEvent) {
        if let Err(e) = self.tx.try_send(TrackingEvent::Geofence { session: self.session, event }) {
            warn!(session = %self.session, error = %e, "geofence_event_dropped");
        }
    }
}

/// Fused location provider
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Start recurring updates delivered to `sink` until removed
    async fn request_location_updates(
        &self,
        request: LocationRequest,
        sink: FixSink,
    ) -> Result<(), ProviderError>;

    async fn remove_location_updates(&self) -> Result<(), ProviderError>;

    /// Most recent fix known to the provider, if any
    async fn last_location(&self) -> Result<Option<Fix>, ProviderError>;
}

/// Geofence-monitoring subsystem
#[async_trait]
pub trait GeofenceProvider: Send + Sync {
    /// Watch `region`; transitions are reported through `sink`
    async fn add_geofence(
        &self,
        region: &GeofenceRegion,
        sink: GeofenceEventSink,
    ) -> Result<(), ProviderError>;

    /// Removing an unknown id is not an error
    async fn remove_geofence(&self, id: &RegionId) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::GeofenceTransition;

    #[test]
    fn test_high_accuracy_request_uses_single_interval() {
        let request = LocationRequest::high_accuracy(5000);
        assert_eq!(request.interval_ms, 5000);
        assert_eq!(request.min_update_interval_ms, 5000);
        assert_eq!(request.priority, Priority::HighAccuracy);
    }

    #[test]
    fn test_fetch_outcome_from_result() {
        let fix = Fix::new(1.0, 2.0, 3.0);
        assert!(matches!(FetchOutcome::from(Ok(Some(fix))), FetchOutcome::Fix(_)));
        assert!(matches!(FetchOutcome::from(Ok(None)), FetchOutcome::Unavailable));
        assert!(matches!(
            FetchOutcome::from(Err(ProviderError::Unavailable("gps".into()))),
            FetchOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_restart_fetch_does_not_dispatch() {
        assert!(FetchPurpose::Initial.dispatches());
        assert!(FetchPurpose::ExitReacquisition.dispatches());
        assert!(!FetchPurpose::Restart.dispatches());
    }

    #[tokio::test]
    async fn test_fix_sink_tags_session() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = SessionId::new();
        let sink = FixSink::new(session, tx, Arc::new(Metrics::new()));

        sink.deliver_batch(vec![Fix::new(1.0, 2.0, 3.0), Fix::new(4.0, 5.0, 6.0)]);

        match rx.recv().await {
            Some(TrackingEvent::Fixes { session: s, fixes }) => {
                assert_eq!(s, session);
                assert_eq!(fixes.len(), 2);
                assert_eq!(fixes[1].latitude, 4.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fix_sink_drops_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let metrics = Arc::new(Metrics::new());
        let sink = FixSink::new(SessionId::new(), tx, metrics.clone());

        sink.deliver(Fix::new(1.0, 1.0, 1.0));
        sink.deliver(Fix::new(2.0, 2.0, 1.0));

        assert_eq!(metrics.report().dispatch_dropped, 1);
    }

    #[tokio::test]
    async fn test_geofence_sink_tags_session() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = SessionId::new();
        let sink = GeofenceEventSink::new(session, tx);
        sink.deliver(GeofenceEvent {
            region_id: RegionId("r".into()),
            transition: GeofenceTransition::Exit,
        });
        match rx.recv().await {
            Some(TrackingEvent::Geofence { session: s, event }) => {
                assert_eq!(s, session);
                assert_eq!(event.transition, GeofenceTransition::Exit);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
