//! Recording platform for tests
//!
//! Implements every host seam, records each call in order and lets tests
//! push fixes and geofence transitions as the real platform would.

use crate::domain::types::{Fix, GeofenceEvent, GeofenceRegion, GeofenceTransition, RegionId};
use crate::io::capability::{Capability, CapabilityGate, StaticCapabilities};
use crate::io::notification::{NotificationChannel, NotificationHost, NotificationPayload};
use crate::io::provider::{
    FixSink, GeofenceEventSink, GeofenceProvider, LocationProvider, LocationRequest, ProviderError,
};
use crate::io::Platform;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

/// One recorded platform call
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    RequestUpdates { interval_ms: u64, min_update_interval_ms: u64 },
    RemoveUpdates,
    LastLocation,
    AddGeofence { region_id: RegionId, latitude: f64, longitude: f64, radius_m: f32 },
    RemoveGeofence { region_id: RegionId },
    DeclareChannel { id: String },
    Present { notification_id: u32, title: String, body: String },
    Release { notification_id: u32 },
}

impl PlatformCall {
    /// Calls that reach the location or geofence provider
    pub fn is_provider_call(&self) -> bool {
        matches!(
            self,
            PlatformCall::RequestUpdates { .. }
                | PlatformCall::RemoveUpdates
                | PlatformCall::LastLocation
                | PlatformCall::AddGeofence { .. }
                | PlatformCall::RemoveGeofence { .. }
        )
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<PlatformCall>,
    /// Scripted answers for `last_location`, consumed front first
    last_locations: VecDeque<Result<Option<Fix>, ProviderError>>,
    fix_sink: Option<FixSink>,
    geofence_sink: Option<GeofenceEventSink>,
    active_region: Option<GeofenceRegion>,
    fail_request_updates: bool,
    fail_add_geofence: bool,
    fail_remove_geofence: bool,
}

/// Scriptable stand-in for the host platform
pub struct MockPlatform {
    capabilities: StaticCapabilities,
    state: Mutex<MockState>,
    /// While true, `last_location` calls are recorded but do not answer
    fix_hold: watch::Sender<bool>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// All capabilities granted, no scripted fixes
    pub fn new() -> Self {
        Self {
            capabilities: StaticCapabilities::granted(),
            state: Mutex::new(MockState::default()),
            fix_hold: watch::channel(false).0,
        }
    }

    /// Bundle this mock as every platform seam
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            capabilities: self.clone(),
            location: self.clone(),
            geofence: self.clone(),
            notifications: self.clone(),
        }
    }

    pub fn set_capability(&self, capability: Capability, granted: bool) {
        self.capabilities.set(capability, granted);
    }

    pub fn revoke_all(&self) {
        self.capabilities.revoke_all();
    }

    /// Queue the answer for the next `last_location` call
    pub fn push_last_location(&self, result: Result<Option<Fix>, ProviderError>) {
        self.state.lock().last_locations.push_back(result);
    }

    /// Keep `last_location` answers pending until `release_fixes`
    pub fn hold_fixes(&self) {
        self.fix_hold.send_replace(true);
    }

    pub fn release_fixes(&self) {
        self.fix_hold.send_replace(false);
    }

    pub fn fail_request_updates(&self, fail: bool) {
        self.state.lock().fail_request_updates = fail;
    }

    pub fn fail_add_geofence(&self, fail: bool) {
        self.state.lock().fail_add_geofence = fail;
    }

    pub fn fail_remove_geofence(&self, fail: bool) {
        self.state.lock().fail_remove_geofence = fail;
    }

    /// Deliver a fix through the most recent update subscription, even a removed one
    pub fn emit_fix(&self, fix: Fix) -> bool {
        self.emit_fixes(vec![fix])
    }

    pub fn emit_fixes(&self, fixes: Vec<Fix>) -> bool {
        let sink = self.state.lock().fix_sink.clone();
        match sink {
            Some(sink) => {
                sink.deliver_batch(fixes);
                true
            }
            None => false,
        }
    }

    /// Report an exit from the region registered last, even a removed one
    pub fn trigger_exit(&self) -> bool {
        self.trigger_transition(GeofenceTransition::Exit)
    }

    pub fn trigger_transition(&self, transition: GeofenceTransition) -> bool {
        let (sink, region_id) = {
            let state = self.state.lock();
            let region_id = state
                .calls
                .iter()
                .rev()
                .find_map(|call| match call {
                    PlatformCall::AddGeofence { region_id, .. } => Some(region_id.clone()),
                    _ => None,
                });
            (state.geofence_sink.clone(), region_id)
        };
        match (sink, region_id) {
            (Some(sink), Some(region_id)) => {
                sink.deliver(GeofenceEvent { region_id, transition });
                true
            }
            _ => false,
        }
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn provider_calls(&self) -> Vec<PlatformCall> {
        self.calls().into_iter().filter(PlatformCall::is_provider_call).collect()
    }

    pub fn count(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn active_region(&self) -> Option<GeofenceRegion> {
        self.state.lock().active_region.clone()
    }

    fn record(&self, call: PlatformCall) {
        self.state.lock().calls.push(call);
    }
}

impl CapabilityGate for MockPlatform {
    fn is_granted(&self, capability: Capability) -> bool {
        self.capabilities.is_granted(capability)
    }
}

#[async_trait]
impl LocationProvider for MockPlatform {
    async fn request_location_updates(
        &self,
        request: LocationRequest,
        sink: FixSink,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::RequestUpdates {
            interval_ms: request.interval_ms,
            min_update_interval_ms: request.min_update_interval_ms,
        });
        if state.fail_request_updates {
            return Err(ProviderError::Unavailable("updates rejected".to_string()));
        }
        state.fix_sink = Some(sink);
        Ok(())
    }

    async fn remove_location_updates(&self) -> Result<(), ProviderError> {
        self.record(PlatformCall::RemoveUpdates);
        Ok(())
    }

    async fn last_location(&self) -> Result<Option<Fix>, ProviderError> {
        self.record(PlatformCall::LastLocation);
        let mut held = self.fix_hold.subscribe();
        let released = held.wait_for(|held| !*held).await.is_ok();
        if !released {
            return Err(ProviderError::Unavailable("mock dropped".to_string()));
        }
        self.state.lock().last_locations.pop_front().unwrap_or(Ok(None))
    }
}

#[async_trait]
impl GeofenceProvider for MockPlatform {
    async fn add_geofence(
        &self,
        region: &GeofenceRegion,
        sink: GeofenceEventSink,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::AddGeofence {
            region_id: region.id.clone(),
            latitude: region.latitude,
            longitude: region.longitude,
            radius_m: region.radius_m,
        });
        if state.fail_add_geofence {
            return Err(ProviderError::Unavailable("geofence not available".to_string()));
        }
        state.active_region = Some(region.clone());
        state.geofence_sink = Some(sink);
        Ok(())
    }

    async fn remove_geofence(&self, id: &RegionId) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::RemoveGeofence { region_id: id.clone() });
        if state.fail_remove_geofence {
            return Err(ProviderError::Unavailable("remove rejected".to_string()));
        }
        if state.active_region.as_ref().is_some_and(|r| &r.id == id) {
            state.active_region = None;
        }
        Ok(())
    }
}

impl NotificationHost for MockPlatform {
    fn declare_channel(&self, channel: &NotificationChannel) {
        self.record(PlatformCall::DeclareChannel { id: channel.id.clone() });
    }

    fn present(&self, notification_id: u32, payload: &NotificationPayload) {
        self.record(PlatformCall::Present {
            notification_id,
            title: payload.title.clone(),
            body: payload.body.clone(),
        });
    }

    fn release(&self, notification_id: u32) {
        self.record(PlatformCall::Release { notification_id });
    }
}
