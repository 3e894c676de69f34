//! Integration tests for configuration loading

use loctrack::domain::types::{RegionId, TrackingMode};
use loctrack::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[tracking]
default_interval_ms = 10000
enabled_modes = ["continuous"]
resume_on_os_restart = false

[geofence]
radius_m = 150.0
region_id = "test_fence"
initial_trigger_exit = false
require_precise_for_region = false

[notification]
notification_id = 7
continuous_title = "Tracking"

[dispatch]
queue_size = 32
foreground_buffer = 8

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.default_interval_ms(), 10000);
    assert!(config.is_mode_enabled(TrackingMode::Continuous));
    assert!(!config.is_mode_enabled(TrackingMode::GeofenceExit));
    assert!(!config.resume_on_os_restart());
    assert_eq!(config.geofence_radius_m(), 150.0);
    assert_eq!(config.geofence_region_id(), RegionId("test_fence".to_string()));
    assert!(!config.geofence_initial_trigger_exit());
    assert!(!config.require_precise_for_region());
    assert_eq!(config.notification().notification_id, 7);
    assert_eq!(config.notification().continuous_title, "Tracking");
    // Unset keys keep their defaults
    assert_eq!(config.notification().geofence_channel_id, "geofence_v2_channel");
    assert_eq!(config.dispatch_queue_size(), 32);
    assert_eq!(config.foreground_buffer(), 8);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_zero_default_interval_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[tracking]\ndefault_interval_ms = 0\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("default_interval_ms"));
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[tracking\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.default_interval_ms(), 5000);
    assert_eq!(config.geofence_radius_m(), 100.0);
    assert!(config.require_precise_for_region());
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_zero_queue_sizes_rejected() {
    for (content, key) in [
        ("[dispatch]\nqueue_size = 0\n", "queue_size"),
        ("[dispatch]\nforeground_buffer = 0\n", "foreground_buffer"),
    ] {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains(key), "unexpected error: {}", err);
    }
}

#[test]
fn test_zero_queue_size_falls_back_to_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[dispatch]\nqueue_size = 0\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::load_from_path(&temp_file.path().display().to_string());

    assert_eq!(config.dispatch_queue_size(), 256);
    assert_eq!(config.foreground_buffer(), 64);
}
