//! Callback dispatch worker - invokes callbacks off the delivery path
//!
//! Controllers enqueue fixes via the registry's mpsc channel; this worker
//! invokes the registered callbacks in arrival order, foreground first, each
//! isolated from the other's failure.

use crate::domain::error::CallbackError;
use crate::domain::types::LocationUpdate;
use crate::infra::metrics::Metrics;
use crate::services::callback_registry::{LocationCallback, Slots};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A fix waiting for the callbacks
#[derive(Debug)]
pub struct DispatchJob {
    pub update: LocationUpdate,
    /// When the job was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Worker that invokes registered callbacks
pub struct DispatchWorker {
    slots: Arc<Mutex<Slots>>,
    job_rx: mpsc::Receiver<DispatchJob>,
    metrics: Arc<Metrics>,
}

impl DispatchWorker {
    pub(crate) fn new(
        slots: Arc<Mutex<Slots>>,
        job_rx: mpsc::Receiver<DispatchJob>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { slots, job_rx, metrics }
    }

    /// Run the worker, processing jobs until the channel closes
    pub async fn run(mut self) {
        info!("dispatch_worker_started");

        while let Some(job) = self.job_rx.recv().await {
            let queue_delay_us = job.enqueued_at.elapsed().as_micros() as u64;
            self.metrics.record_dispatch_delay(queue_delay_us);
            self.deliver(&job.update);
        }

        info!("dispatch_worker_stopped");
    }

    /// Invoke whichever slots are filled right now
    fn deliver(&self, update: &LocationUpdate) {
        // Snapshot so callbacks run without the slot lock held
        let (foreground, background) = {
            let slots = self.slots.lock();
            (slots.foreground.clone(), slots.background.clone())
        };

        if let Some(callback) = foreground {
            match self.invoke("foreground", &callback, update) {
                Err(CallbackError::RuntimeUnavailable) => self.clear_foreground(&callback),
                Err(_) | Ok(()) => {}
            }
        }

        if let Some(callback) = background {
            let _ = self.invoke("background", &callback, update);
        }
    }

    fn invoke(
        &self,
        channel: &'static str,
        callback: &LocationCallback,
        update: &LocationUpdate,
    ) -> Result<(), CallbackError> {
        self.metrics.record_callback_invoked();

        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(update)))
            .unwrap_or_else(|_| Err(CallbackError::Failed("callback panicked".to_string())));

        match &result {
            Ok(()) => {
                debug!(channel = %channel, lat = %update.latitude, lng = %update.longitude, "callback_invoked");
            }
            Err(CallbackError::RuntimeUnavailable) => {
                debug!(channel = %channel, "callback_runtime_unavailable");
            }
            Err(e) => {
                self.metrics.record_callback_failure();
                warn!(channel = %channel, error = %e, "callback_failed");
            }
        }
        result
    }

    /// Drop the foreground slot unless it was replaced meanwhile
    fn clear_foreground(&self, callback: &LocationCallback) {
        let mut slots = self.slots.lock();
        if slots.foreground.as_ref().is_some_and(|current| Arc::ptr_eq(current, callback)) {
            slots.foreground = None;
            info!("foreground_callback_cleared_runtime_gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Fix;
    use crate::services::callback_registry::{create_callback_registry, into_callback};
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_failing_foreground_does_not_block_background() {
        let metrics = Arc::new(Metrics::new());
        let (registry, worker) = create_callback_registry(metrics.clone(), 8);
        tokio::spawn(worker.run());

        let (tx, mut rx) = unbounded_channel();
        registry.set_foreground(into_callback(|_| Err(CallbackError::Failed("boom".to_string()))));
        registry.set_background(into_callback(move |update| {
            let _ = tx.send(*update);
            Ok(())
        }));

        registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await;

        let update = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(update.latitude, 1.0);
        assert_eq!(metrics.callback_failures(), 1);
        // A plain failure keeps the slot
        assert!(registry.has_foreground());
    }

    #[tokio::test]
    async fn test_panicking_callback_is_isolated() {
        let metrics = Arc::new(Metrics::new());
        let (registry, worker) = create_callback_registry(metrics.clone(), 8);
        tokio::spawn(worker.run());

        let (tx, mut rx) = unbounded_channel();
        registry.set_foreground(into_callback(|_| panic!("callback exploded")));
        registry.set_background(into_callback(move |update| {
            let _ = tx.send(*update);
            Ok(())
        }));

        registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await;
        registry.dispatch(&Fix::new(4.0, 5.0, 6.0)).await;

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.latitude, 1.0);
        assert_eq!(second.latitude, 4.0);
        assert_eq!(metrics.callback_failures(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_runtime_clears_foreground() {
        let (registry, worker) = create_callback_registry(Arc::new(Metrics::new()), 8);
        tokio::spawn(worker.run());

        let (tx, mut rx) = unbounded_channel();
        registry.set_foreground(into_callback(|_| Err(CallbackError::RuntimeUnavailable)));
        registry.set_background(into_callback(move |update| {
            let _ = tx.send(*update);
            Ok(())
        }));

        registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await;
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

        assert!(!registry.has_foreground());
        assert!(registry.has_background());
    }

    #[tokio::test]
    async fn test_foreground_invoked_before_background() {
        let (registry, worker) = create_callback_registry(Arc::new(Metrics::new()), 8);
        tokio::spawn(worker.run());

        let (tx, mut rx) = unbounded_channel();
        let fg_tx = tx.clone();
        registry.set_foreground(into_callback(move |_| {
            let _ = fg_tx.send("foreground");
            Ok(())
        }));
        registry.set_background(into_callback(move |_| {
            let _ = tx.send("background");
            Ok(())
        }));

        registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await;

        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap(), Some("foreground"));
        assert_eq!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap(), Some("background"));
    }
}
