//! Persistent notification payloads
//!
//! Building is pure; the lifecycle shell decides when to present, declare
//! channels and release.

use crate::domain::types::{ModeSpec, TrackingMode};
use crate::infra::config::NotificationConfig;
use crate::io::notification::{NotificationChannel, NotificationPayload};

pub struct NotificationPresenter {
    config: NotificationConfig,
}

impl NotificationPresenter {
    pub fn new(config: &NotificationConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn notification_id(&self) -> u32 {
        self.config.notification_id
    }

    /// Body text for a mode, e.g. "Interval 5s"
    pub fn describe(spec: &ModeSpec) -> String {
        match spec {
            ModeSpec::Continuous { interval_ms } => format!("Interval {}s", interval_ms / 1000),
            ModeSpec::GeofenceExit => "Tracking via geofence exit events".to_string(),
        }
    }

    /// Channel the mode's notification is posted to
    pub fn channel(&self, mode: TrackingMode) -> NotificationChannel {
        let (id, name) = match mode {
            TrackingMode::Continuous => {
                (&self.config.continuous_channel_id, &self.config.continuous_channel_name)
            }
            TrackingMode::GeofenceExit => {
                (&self.config.geofence_channel_id, &self.config.geofence_channel_name)
            }
        };
        NotificationChannel { id: id.clone(), name: name.clone(), low_importance: true }
    }

    pub fn build(&self, mode: TrackingMode, description: &str) -> NotificationPayload {
        let title = match mode {
            TrackingMode::Continuous => &self.config.continuous_title,
            TrackingMode::GeofenceExit => &self.config.geofence_title,
        };
        NotificationPayload {
            channel_id: self.channel(mode).id,
            title: title.clone(),
            body: description.to_string(),
            icon: self.config.icon.clone(),
            ongoing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presenter() -> NotificationPresenter {
        NotificationPresenter::new(&NotificationConfig::default())
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            NotificationPresenter::describe(&ModeSpec::Continuous { interval_ms: 5000 }),
            "Interval 5s"
        );
        assert_eq!(
            NotificationPresenter::describe(&ModeSpec::GeofenceExit),
            "Tracking via geofence exit events"
        );
    }

    #[test]
    fn test_build_continuous() {
        let payload = presenter().build(TrackingMode::Continuous, "Interval 10s");
        assert_eq!(payload.channel_id, "loc_v2_channel");
        assert_eq!(payload.title, "Location Tracking Active");
        assert_eq!(payload.body, "Interval 10s");
        assert_eq!(payload.icon, "ic_menu_mylocation");
        assert!(payload.ongoing);
    }

    #[test]
    fn test_build_reflects_new_text() {
        let presenter = presenter();
        let first = presenter.build(TrackingMode::Continuous, "Interval 5s");
        let second = presenter.build(TrackingMode::Continuous, "Interval 30s");
        assert_eq!(first.channel_id, second.channel_id);
        assert_ne!(first.body, second.body);
    }

    #[test]
    fn test_geofence_channel() {
        let channel = presenter().channel(TrackingMode::GeofenceExit);
        assert_eq!(channel.id, "geofence_v2_channel");
        assert_eq!(channel.name, "Geofence Location Tracking");
        assert!(channel.low_importance);
    }
}
