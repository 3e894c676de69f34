//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Fixes delivered by the provider (monotonic)
    fixes_received: AtomicU64,
    /// Fixes handed to the callback worker (monotonic)
    fixes_dispatched: AtomicU64,
    /// Deliveries that arrived for a stopped or replaced session (monotonic)
    stale_deliveries: AtomicU64,
    /// Deliveries dropped because the service queue was full (monotonic)
    dispatch_dropped: AtomicU64,
    /// Individual callback invocations (monotonic)
    callback_invocations: AtomicU64,
    /// Callback invocations that failed or panicked (monotonic)
    callback_failures: AtomicU64,
    /// Sum of dispatch queue delays since last report (µs)
    dispatch_delay_sum_us: AtomicU64,
    /// Max dispatch queue delay since last report (µs)
    dispatch_delay_max_us: AtomicU64,
    /// Dispatches since last report
    dispatches_since_report: AtomicU64,
    /// Regions successfully added (monotonic)
    regions_registered: AtomicU64,
    /// Region remove/add failures (monotonic)
    region_failures: AtomicU64,
    /// Operations aborted for missing capability (monotonic)
    capability_denials: AtomicU64,
    /// Provider requests that failed (monotonic)
    provider_failures: AtomicU64,
    /// Geofence exit transitions handled (monotonic)
    geofence_exits: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fixes_received: AtomicU64::new(0),
            fixes_dispatched: AtomicU64::new(0),
            stale_deliveries: AtomicU64::new(0),
            dispatch_dropped: AtomicU64::new(0),
            callback_invocations: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
            dispatch_delay_sum_us: AtomicU64::new(0),
            dispatch_delay_max_us: AtomicU64::new(0),
            dispatches_since_report: AtomicU64::new(0),
            regions_registered: AtomicU64::new(0),
            region_failures: AtomicU64::new(0),
            capability_denials: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            geofence_exits: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_fix_received(&self) {
        self.fixes_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_dispatched(&self) {
        self.fixes_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_delivery(&self) {
        self.stale_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatch_dropped(&self) {
        self.dispatch_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_callback_invoked(&self) {
        self.callback_invocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time a fix spent queued before the worker picked it up
    #[inline]
    pub fn record_dispatch_delay(&self, delay_us: u64) {
        self.dispatch_delay_sum_us.fetch_add(delay_us, Ordering::Relaxed);
        self.dispatches_since_report.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.dispatch_delay_max_us, delay_us);
    }

    #[inline]
    pub fn record_region_registered(&self) {
        self.regions_registered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_region_failure(&self) {
        self.region_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_capability_denied(&self) {
        self.capability_denials.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_geofence_exit(&self) {
        self.geofence_exits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fixes_dispatched(&self) -> u64 {
        self.fixes_dispatched.load(Ordering::Relaxed)
    }

    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    pub fn capability_denials(&self) -> u64 {
        self.capability_denials.load(Ordering::Relaxed)
    }

    pub fn stale_deliveries(&self) -> u64 {
        self.stale_deliveries.load(Ordering::Relaxed)
    }

    /// Snapshot counters, resetting the per-interval delay figures
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let dispatches = self.dispatches_since_report.swap(0, Ordering::Relaxed);
        let delay_sum = self.dispatch_delay_sum_us.swap(0, Ordering::Relaxed);
        let delay_max = self.dispatch_delay_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            fixes_received: self.fixes_received.load(Ordering::Relaxed),
            fixes_dispatched: self.fixes_dispatched.load(Ordering::Relaxed),
            stale_deliveries: self.stale_deliveries.load(Ordering::Relaxed),
            dispatch_dropped: self.dispatch_dropped.load(Ordering::Relaxed),
            callback_invocations: self.callback_invocations.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            dispatches_per_sec: if elapsed_secs > 0.0 {
                dispatches as f64 / elapsed_secs
            } else {
                0.0
            },
            avg_dispatch_delay_us: if dispatches > 0 { delay_sum / dispatches } else { 0 },
            max_dispatch_delay_us: delay_max,
            regions_registered: self.regions_registered.load(Ordering::Relaxed),
            region_failures: self.region_failures.load(Ordering::Relaxed),
            capability_denials: self.capability_denials.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            geofence_exits: self.geofence_exits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub fixes_received: u64,
    pub fixes_dispatched: u64,
    pub stale_deliveries: u64,
    pub dispatch_dropped: u64,
    pub callback_invocations: u64,
    pub callback_failures: u64,
    pub dispatches_per_sec: f64,
    pub avg_dispatch_delay_us: u64,
    pub max_dispatch_delay_us: u64,
    pub regions_registered: u64,
    pub region_failures: u64,
    pub capability_denials: u64,
    pub provider_failures: u64,
    pub geofence_exits: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            fixes_received = %self.fixes_received,
            fixes_dispatched = %self.fixes_dispatched,
            stale_deliveries = %self.stale_deliveries,
            dispatch_dropped = %self.dispatch_dropped,
            callback_invocations = %self.callback_invocations,
            callback_failures = %self.callback_failures,
            dispatches_per_sec = %format!("{:.2}", self.dispatches_per_sec),
            avg_dispatch_delay_us = %self.avg_dispatch_delay_us,
            max_dispatch_delay_us = %self.max_dispatch_delay_us,
            regions_registered = %self.regions_registered,
            region_failures = %self.region_failures,
            capability_denials = %self.capability_denials,
            provider_failures = %self.provider_failures,
            geofence_exits = %self.geofence_exits,
            "metrics"
        );
    }
}
