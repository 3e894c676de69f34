//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{RegionId, TrackingMode};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Interval used when a start command carries none (ms)
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    /// Modes this build accepts start commands for
    #[serde(default = "default_enabled_modes")]
    pub enabled_modes: Vec<TrackingMode>,
    /// Re-subscribe continuous updates when the OS restarts the service
    #[serde(default = "default_resume_on_os_restart")]
    pub resume_on_os_restart: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            enabled_modes: default_enabled_modes(),
            resume_on_os_restart: default_resume_on_os_restart(),
        }
    }
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_enabled_modes() -> Vec<TrackingMode> {
    vec![TrackingMode::Continuous, TrackingMode::GeofenceExit]
}

fn default_resume_on_os_restart() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default = "default_radius_m")]
    pub radius_m: f32,
    /// Identifier reused for every re-registration
    #[serde(default = "default_region_id")]
    pub region_id: String,
    #[serde(default = "default_true")]
    pub initial_trigger_exit: bool,
    /// Region registration needs precise (not just approximate) access
    #[serde(default = "default_true")]
    pub require_precise_for_region: bool,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius_m(),
            region_id: default_region_id(),
            initial_trigger_exit: true,
            require_precise_for_region: true,
        }
    }
}

fn default_radius_m() -> f32 {
    100.0
}

fn default_region_id() -> String {
    "dynamic_geofence_v2".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_id")]
    pub notification_id: u32,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_continuous_channel_id")]
    pub continuous_channel_id: String,
    #[serde(default = "default_continuous_channel_name")]
    pub continuous_channel_name: String,
    #[serde(default = "default_continuous_title")]
    pub continuous_title: String,
    #[serde(default = "default_geofence_channel_id")]
    pub geofence_channel_id: String,
    #[serde(default = "default_geofence_channel_name")]
    pub geofence_channel_name: String,
    #[serde(default = "default_geofence_title")]
    pub geofence_title: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notification_id: default_notification_id(),
            icon: default_icon(),
            continuous_channel_id: default_continuous_channel_id(),
            continuous_channel_name: default_continuous_channel_name(),
            continuous_title: default_continuous_title(),
            geofence_channel_id: default_geofence_channel_id(),
            geofence_channel_name: default_geofence_channel_name(),
            geofence_title: default_geofence_title(),
        }
    }
}

fn default_notification_id() -> u32 {
    202
}

fn default_icon() -> String {
    "ic_menu_mylocation".to_string()
}

fn default_continuous_channel_id() -> String {
    "loc_v2_channel".to_string()
}

fn default_continuous_channel_name() -> String {
    "Location Tracking V2".to_string()
}

fn default_continuous_title() -> String {
    "Location Tracking Active".to_string()
}

fn default_geofence_channel_id() -> String {
    "geofence_v2_channel".to_string()
}

fn default_geofence_channel_name() -> String {
    "Geofence Location Tracking".to_string()
}

fn default_geofence_title() -> String {
    "Location Geofence Active".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Pending fixes between controller and callback worker
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Foreground broadcast buffer (per subscriber)
    #[serde(default = "default_foreground_buffer")]
    pub foreground_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { queue_size: default_queue_size(), foreground_buffer: default_foreground_buffer() }
    }
}

fn default_queue_size() -> usize {
    256
}

fn default_foreground_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the service
#[derive(Debug, Clone)]
pub struct Config {
    default_interval_ms: u64,
    enabled_modes: Vec<TrackingMode>,
    resume_on_os_restart: bool,
    geofence_radius_m: f32,
    geofence_region_id: String,
    geofence_initial_trigger_exit: bool,
    require_precise_for_region: bool,
    notification: NotificationConfig,
    dispatch_queue_size: usize,
    foreground_buffer: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            default_interval_ms: toml_config.tracking.default_interval_ms,
            enabled_modes: toml_config.tracking.enabled_modes,
            resume_on_os_restart: toml_config.tracking.resume_on_os_restart,
            geofence_radius_m: toml_config.geofence.radius_m,
            geofence_region_id: toml_config.geofence.region_id,
            geofence_initial_trigger_exit: toml_config.geofence.initial_trigger_exit,
            require_precise_for_region: toml_config.geofence.require_precise_for_region,
            notification: toml_config.notification,
            dispatch_queue_size: toml_config.dispatch.queue_size,
            foreground_buffer: toml_config.dispatch.foreground_buffer,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if toml_config.tracking.default_interval_ms == 0 {
            anyhow::bail!("tracking.default_interval_ms must be positive in {}", path.display());
        }
        if toml_config.dispatch.queue_size == 0 {
            anyhow::bail!("dispatch.queue_size must be positive in {}", path.display());
        }
        if toml_config.dispatch.foreground_buffer == 0 {
            anyhow::bail!("dispatch.foreground_buffer must be positive in {}", path.display());
        }

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn is_mode_enabled(&self, mode: TrackingMode) -> bool {
        self.enabled_modes.contains(&mode)
    }

    pub fn default_interval_ms(&self) -> u64 {
        self.default_interval_ms
    }

    pub fn enabled_modes(&self) -> &[TrackingMode] {
        &self.enabled_modes
    }

    pub fn resume_on_os_restart(&self) -> bool {
        self.resume_on_os_restart
    }

    pub fn geofence_radius_m(&self) -> f32 {
        self.geofence_radius_m
    }

    pub fn geofence_region_id(&self) -> RegionId {
        RegionId(self.geofence_region_id.clone())
    }

    pub fn geofence_initial_trigger_exit(&self) -> bool {
        self.geofence_initial_trigger_exit
    }

    pub fn require_precise_for_region(&self) -> bool {
        self.require_precise_for_region
    }

    pub fn notification(&self) -> &NotificationConfig {
        &self.notification
    }

    pub fn dispatch_queue_size(&self) -> usize {
        self.dispatch_queue_size
    }

    pub fn foreground_buffer(&self) -> usize {
        self.foreground_buffer
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to restrict the accepted modes
    pub fn with_enabled_modes(mut self, modes: Vec<TrackingMode>) -> Self {
        self.enabled_modes = modes;
        self
    }

    /// Builder method for tests to relax the region capability check
    pub fn with_require_precise_for_region(mut self, required: bool) -> Self {
        self.require_precise_for_region = required;
        self
    }

    /// Builder method for tests to shrink the delivery queues (minimum 1)
    pub fn with_dispatch_queue_size(mut self, size: usize) -> Self {
        self.dispatch_queue_size = size.max(1);
        self
    }
}
