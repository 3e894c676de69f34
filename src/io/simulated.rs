//! Simulated device for the `loctrack-sim` binary
//!
//! The device walks at constant speed while slowly turning, serves fixes at
//! the requested interval and reports a geofence exit once it leaves the
//! watched circle.

use crate::domain::types::{Fix, GeofenceEvent, GeofenceRegion, GeofenceTransition, RegionId};
use crate::io::capability::{Capability, CapabilityGate, StaticCapabilities};
use crate::io::notification::{NotificationChannel, NotificationHost, NotificationPayload};
use crate::io::provider::{
    FixSink, GeofenceEventSink, GeofenceProvider, LocationProvider, LocationRequest, ProviderError,
};
use crate::io::Platform;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Walk parameters
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub speed_mps: f64,
    /// Heading change per step (degrees)
    pub turn_deg: f64,
    pub step: Duration,
    pub accuracy_m: f32,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            start_latitude: 64.1466,
            start_longitude: -21.9426,
            speed_mps: 12.0,
            turn_deg: 3.0,
            step: Duration::from_secs(1),
            accuracy_m: 8.0,
        }
    }
}

struct DeviceState {
    latitude: f64,
    longitude: f64,
    heading_deg: f64,
    updates: Option<JoinHandle<()>>,
    region: Option<(GeofenceRegion, GeofenceEventSink)>,
}

/// Moving device plus host surfaces
pub struct SimulatedDevice {
    walk: WalkConfig,
    capabilities: StaticCapabilities,
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    pub fn new(walk: WalkConfig) -> Self {
        let state = DeviceState {
            latitude: walk.start_latitude,
            longitude: walk.start_longitude,
            heading_deg: 0.0,
            updates: None,
            region: None,
        };
        Self { walk, capabilities: StaticCapabilities::granted(), state: Arc::new(Mutex::new(state)) }
    }

    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform {
            capabilities: self.clone(),
            location: self.clone(),
            geofence: self.clone(),
            notifications: self.clone(),
        }
    }

    pub fn capabilities(&self) -> &StaticCapabilities {
        &self.capabilities
    }

    fn current_fix(&self) -> Fix {
        let state = self.state.lock();
        Fix::new(state.latitude, state.longitude, self.walk.accuracy_m)
    }

    /// Advance one step and report an exit if the device left the region
    fn step(&self) {
        let step_m = self.walk.speed_mps * self.walk.step.as_secs_f64();
        let exit = {
            let mut state = self.state.lock();
            state.heading_deg = (state.heading_deg + self.walk.turn_deg) % 360.0;
            let heading = state.heading_deg.to_radians();
            let d_lat = step_m * heading.cos() / EARTH_RADIUS_M;
            let d_lon = step_m * heading.sin() / (EARTH_RADIUS_M * state.latitude.to_radians().cos());
            state.latitude += d_lat.to_degrees();
            state.longitude += d_lon.to_degrees();

            let (lat, lon) = (state.latitude, state.longitude);
            let left = state.region.as_ref().is_some_and(|(region, _)| {
                distance_m(region.latitude, region.longitude, lat, lon) > region.radius_m as f64
            });
            if left {
                // Exit fires once per registration
                state.region.take()
            } else {
                None
            }
        };

        if let Some((region, sink)) = exit {
            info!(region_id = %region.id, "sim_geofence_exit");
            sink.deliver(GeofenceEvent { region_id: region.id, transition: GeofenceTransition::Exit });
        }
    }

    /// Move the device until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.walk.step);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.step(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if let Some(handle) = self.state.lock().updates.take() {
            handle.abort();
        }
        debug!("sim_device_stopped");
    }
}

impl CapabilityGate for SimulatedDevice {
    fn is_granted(&self, capability: Capability) -> bool {
        self.capabilities.is_granted(capability)
    }
}

#[async_trait]
impl LocationProvider for SimulatedDevice {
    async fn request_location_updates(
        &self,
        request: LocationRequest,
        sink: FixSink,
    ) -> Result<(), ProviderError> {
        let state = self.state.clone();
        let accuracy = self.walk.accuracy_m;
        let period = Duration::from_millis(request.interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let fix = {
                    let s = state.lock();
                    Fix::new(s.latitude, s.longitude, accuracy)
                };
                sink.deliver(fix);
            }
        });

        if let Some(previous) = self.state.lock().updates.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn remove_location_updates(&self) -> Result<(), ProviderError> {
        if let Some(handle) = self.state.lock().updates.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn last_location(&self) -> Result<Option<Fix>, ProviderError> {
        Ok(Some(self.current_fix()))
    }
}

#[async_trait]
impl GeofenceProvider for SimulatedDevice {
    async fn add_geofence(
        &self,
        region: &GeofenceRegion,
        sink: GeofenceEventSink,
    ) -> Result<(), ProviderError> {
        self.state.lock().region = Some((region.clone(), sink));
        Ok(())
    }

    async fn remove_geofence(&self, id: &RegionId) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        if state.region.as_ref().is_some_and(|(region, _)| &region.id == id) {
            state.region = None;
        }
        Ok(())
    }
}

impl NotificationHost for SimulatedDevice {
    fn declare_channel(&self, channel: &NotificationChannel) {
        info!(channel_id = %channel.id, name = %channel.name, "sim_channel_declared");
    }

    fn present(&self, notification_id: u32, payload: &NotificationPayload) {
        info!(
            notification_id = %notification_id,
            title = %payload.title,
            body = %payload.body,
            "sim_notification_shown"
        );
    }

    fn release(&self, notification_id: u32) {
        info!(notification_id = %notification_id, "sim_notification_released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SessionId;

    #[test]
    fn test_distance_m() {
        assert_eq!(distance_m(10.0, 20.0, 10.0, 20.0), 0.0);
        // 0.001 deg of latitude is about 111 m
        let d = distance_m(10.0, 20.0, 10.001, 20.0);
        assert!((d - 111.2).abs() < 1.0, "distance was {}", d);
    }

    #[test]
    fn test_step_reports_exit_once() {
        let device = SimulatedDevice::new(WalkConfig {
            speed_mps: 60.0,
            turn_deg: 0.0,
            ..Default::default()
        });
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let start = device.current_fix();
        let region =
            GeofenceRegion::around(&start, RegionId("sim".to_string()), 100.0, true);
        device.state.lock().region = Some((region, GeofenceEventSink::new(SessionId::new(), tx)));

        device.step();
        assert!(rx.try_recv().is_err());
        device.step();
        assert!(rx.try_recv().is_ok());
        device.step();
        assert!(rx.try_recv().is_err());
    }
}
