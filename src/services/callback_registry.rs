//! Foreground/background callback slots
//!
//! The registry is an owned object shared by reference with the controllers.
//! Dispatch only enqueues; the `DispatchWorker` invokes the callbacks on its
//! own task so a slow callback never stalls fix delivery.

use crate::domain::error::CallbackError;
use crate::domain::types::{Fix, LocationUpdate};
use crate::infra::metrics::Metrics;
use crate::services::dispatch_worker::{DispatchJob, DispatchWorker};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A registered delivery path
pub type LocationCallback =
    Arc<dyn Fn(&LocationUpdate) -> Result<(), CallbackError> + Send + Sync>;

/// Wrap a closure as a `LocationCallback`
pub fn into_callback<F>(f: F) -> LocationCallback
where
    F: Fn(&LocationUpdate) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Callbacks carried by a start command. `None` leaves the slot untouched.
#[derive(Clone, Default)]
pub struct CallbackPair {
    pub foreground: Option<LocationCallback>,
    pub background: Option<LocationCallback>,
}

impl CallbackPair {
    pub fn foreground(callback: LocationCallback) -> Self {
        Self { foreground: Some(callback), background: None }
    }

    pub fn with_background(mut self, callback: LocationCallback) -> Self {
        self.background = Some(callback);
        self
    }
}

impl std::fmt::Debug for CallbackPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPair")
            .field("foreground", &self.foreground.is_some())
            .field("background", &self.background.is_some())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct Slots {
    pub(crate) foreground: Option<LocationCallback>,
    pub(crate) background: Option<LocationCallback>,
}

/// Process-wide callback slots with thread-safe replace/clear
pub struct CallbackRegistry {
    slots: Arc<Mutex<Slots>>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    metrics: Arc<Metrics>,
}

impl CallbackRegistry {
    /// Replace the foreground slot
    pub fn set_foreground(&self, callback: LocationCallback) {
        let replaced = self.slots.lock().foreground.replace(callback).is_some();
        debug!(replaced = %replaced, "foreground_callback_set");
    }

    /// Replace the background slot
    pub fn set_background(&self, callback: LocationCallback) {
        let replaced = self.slots.lock().background.replace(callback).is_some();
        debug!(replaced = %replaced, "background_callback_set");
    }

    /// Apply the non-empty halves of a start command's pair
    pub fn register(&self, pair: CallbackPair) {
        let mut slots = self.slots.lock();
        if let Some(foreground) = pair.foreground {
            slots.foreground = Some(foreground);
        }
        if let Some(background) = pair.background {
            slots.background = Some(background);
        }
    }

    /// Empty both slots
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.foreground = None;
        slots.background = None;
        info!("callbacks_cleared");
    }

    pub fn has_foreground(&self) -> bool {
        self.slots.lock().foreground.is_some()
    }

    pub fn has_background(&self) -> bool {
        self.slots.lock().background.is_some()
    }

    /// Queue `fix` for both channels
    ///
    /// Waits for queue space rather than dropping, so a slow callback holds
    /// back the service loop instead of losing fixes. Returns false once the
    /// worker is gone.
    pub async fn dispatch(&self, fix: &Fix) -> bool {
        let job = DispatchJob { update: fix.to_update(), enqueued_at: Instant::now() };
        match self.dispatch_tx.send(job).await {
            Ok(()) => {
                self.metrics.record_fix_dispatched();
                true
            }
            Err(_) => {
                warn!(lat = %fix.latitude, lng = %fix.longitude, "dispatch_worker_gone");
                false
            }
        }
    }
}

/// Create the registry and the worker that drains it
///
/// Returns the registry (shared with controllers) and the worker (to be spawned)
pub fn create_callback_registry(
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (Arc<CallbackRegistry>, DispatchWorker) {
    let (dispatch_tx, dispatch_rx) = mpsc::channel(buffer_size);
    let slots = Arc::new(Mutex::new(Slots::default()));
    let worker = DispatchWorker::new(slots.clone(), dispatch_rx, metrics.clone());
    let registry = Arc::new(CallbackRegistry { slots, dispatch_tx, metrics });
    (registry, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    fn counting_callback(counter: Arc<AtomicUsize>) -> LocationCallback {
        into_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_register_keeps_slots_missing_from_pair() {
        let (registry, _worker) = create_callback_registry(Arc::new(Metrics::new()), 8);
        registry.set_background(counting_callback(Arc::new(AtomicUsize::new(0))));

        registry.register(CallbackPair::foreground(counting_callback(Arc::new(AtomicUsize::new(0)))));

        assert!(registry.has_foreground());
        assert!(registry.has_background());
    }

    #[test]
    fn test_clear_empties_both() {
        let (registry, _worker) = create_callback_registry(Arc::new(Metrics::new()), 8);
        let counter = Arc::new(AtomicUsize::new(0));
        registry.set_foreground(counting_callback(counter.clone()));
        registry.set_background(counting_callback(counter));

        registry.clear();

        assert!(!registry.has_foreground());
        assert!(!registry.has_background());
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_queue_space() {
        let metrics = Arc::new(Metrics::new());
        let (registry, worker) = create_callback_registry(metrics.clone(), 1);

        assert!(registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await);
        let second = Fix::new(4.0, 5.0, 6.0);
        assert!(timeout(Duration::from_millis(20), registry.dispatch(&second)).await.is_err());

        tokio::spawn(worker.run());
        assert!(registry.dispatch(&second).await);
        assert_eq!(metrics.fixes_dispatched(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_reports_missing_worker() {
        let (registry, worker) = create_callback_registry(Arc::new(Metrics::new()), 4);
        drop(worker);

        assert!(!registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await);
    }

    #[tokio::test]
    async fn test_replacing_callback_routes_to_newest() {
        let (registry, worker) = create_callback_registry(Arc::new(Metrics::new()), 8);
        tokio::spawn(worker.run());

        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        registry.set_background(counting_callback(old.clone()));
        registry.set_background(counting_callback(new.clone()));

        registry.dispatch(&Fix::new(1.0, 2.0, 3.0)).await;

        timeout(Duration::from_secs(1), async {
            while new.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(old.load(Ordering::SeqCst), 0);
    }
}
