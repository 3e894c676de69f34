//! Service lifecycle shell
//!
//! `LocationService` is the single actor that owns both controllers. It
//! serializes the three external commands (start, OS restart, stop) with
//! every asynchronous delivery from the providers:
//! - Commands arrive on an mpsc channel and carry a oneshot reply
//! - Provider deliveries arrive as `TrackingEvent`s on a second channel
//! - Status is published on a watch channel after each message
//!
//! At most one controller is active. The persistent notification is shown
//! before any provider call of a start and released once both controllers
//! are stopped.

mod handlers;

use crate::domain::error::TrackingError;
use crate::domain::session::{ContinuousState, GeofenceState};
use crate::domain::types::{ModeSpec, TrackingMode};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::notification::NotificationHost;
use crate::io::provider::TrackingEvent;
use crate::io::Platform;
use crate::services::callback_registry::{create_callback_registry, CallbackPair, CallbackRegistry};
use crate::services::continuous::ContinuousController;
use crate::services::geofence::GeofenceController;
use crate::services::notification::NotificationPresenter;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

const COMMAND_QUEUE_SIZE: usize = 32;

/// External commands, each answered once fully applied
pub enum Command {
    Start {
        spec: ModeSpec,
        callbacks: CallbackPair,
        reply: oneshot::Sender<Result<(), TrackingError>>,
    },
    OsRestart {
        reply: oneshot::Sender<Result<(), TrackingError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Controller states as last published by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub continuous: ContinuousState,
    pub geofence: GeofenceState,
}

impl ServiceStatus {
    pub fn stopped() -> Self {
        Self { continuous: ContinuousState::Stopped, geofence: GeofenceState::Stopped }
    }

    /// True while either controller runs
    pub fn is_tracking_active(&self) -> bool {
        self.continuous != ContinuousState::Stopped || self.geofence != GeofenceState::Stopped
    }

    pub fn active_mode(&self) -> Option<TrackingMode> {
        if self.continuous != ContinuousState::Stopped {
            Some(TrackingMode::Continuous)
        } else if self.geofence != GeofenceState::Stopped {
            Some(TrackingMode::GeofenceExit)
        } else {
            None
        }
    }
}

/// Actor owning the tracking state
pub struct LocationService {
    pub(crate) config: Config,
    pub(crate) presenter: NotificationPresenter,
    pub(crate) notifications: Arc<dyn NotificationHost>,
    pub(crate) registry: Arc<CallbackRegistry>,
    pub(crate) continuous: ContinuousController,
    pub(crate) geofence: GeofenceController,
    /// Mode whose notification is currently shown
    pub(crate) presented: Option<TrackingMode>,
    /// Channels already declared to the host
    pub(crate) declared_channels: FxHashSet<String>,
    pub(crate) status_tx: watch::Sender<ServiceStatus>,
}

impl LocationService {
    pub fn new(
        config: Config,
        platform: &Platform,
        registry: Arc<CallbackRegistry>,
        metrics: Arc<Metrics>,
        events_tx: mpsc::Sender<TrackingEvent>,
        status_tx: watch::Sender<ServiceStatus>,
    ) -> Self {
        let continuous = ContinuousController::new(
            platform.capabilities.clone(),
            platform.location.clone(),
            registry.clone(),
            metrics.clone(),
            events_tx.clone(),
        );
        let geofence = GeofenceController::new(&config, platform, registry.clone(), metrics, events_tx);
        Self {
            presenter: NotificationPresenter::new(config.notification()),
            notifications: platform.notifications.clone(),
            config,
            registry,
            continuous,
            geofence,
            presented: None,
            declared_channels: FxHashSet::default(),
            status_tx,
        }
    }

    /// Spawn the dispatch worker and the service loop
    pub fn spawn(config: Config, platform: Platform, metrics: Arc<Metrics>) -> ServiceHandle {
        let (registry, worker) =
            create_callback_registry(metrics.clone(), config.dispatch_queue_size());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (events_tx, events_rx) = mpsc::channel(config.dispatch_queue_size());
        let (status_tx, status_rx) = watch::channel(ServiceStatus::stopped());

        let service =
            LocationService::new(config, &platform, registry.clone(), metrics, events_tx, status_tx);

        tokio::spawn(worker.run());
        tokio::spawn(service.run(command_rx, events_rx));

        ServiceHandle { command_tx, status_rx, registry }
    }

    /// Process commands and deliveries until every handle is dropped
    pub async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut events_rx: mpsc::Receiver<TrackingEvent>,
    ) {
        info!("location_service_started");

        loop {
            tokio::select! {
                // Commands first so a stop is never queued behind a burst of fixes
                biased;
                command = command_rx.recv() => {
                    match command {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                Some(event) = events_rx.recv() => {
                    self.handle_event(event).await;
                    self.settle();
                }
            }
        }

        self.shutdown().await;
        info!("location_service_stopped");
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus { continuous: self.continuous.state(), geofence: self.geofence.state() }
    }
}

/// Cloneable front end to a running `LocationService`
#[derive(Clone)]
pub struct ServiceHandle {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<ServiceStatus>,
    registry: Arc<CallbackRegistry>,
}

impl ServiceHandle {
    /// Start (or retarget) tracking; returns once the controller has started
    pub async fn on_start(
        &self,
        spec: ModeSpec,
        callbacks: CallbackPair,
    ) -> Result<(), TrackingError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Start { spec, callbacks, reply })
            .await
            .map_err(|_| TrackingError::ServiceStopped)?;
        rx.await.map_err(|_| TrackingError::ServiceStopped)?
    }

    /// Host restarted the service or asked for the region to be recreated
    pub async fn on_os_restart_signal(&self) -> Result<(), TrackingError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::OsRestart { reply })
            .await
            .map_err(|_| TrackingError::ServiceStopped)?;
        rx.await.map_err(|_| TrackingError::ServiceStopped)?
    }

    /// Stop tracking; once this returns no further fix reaches a callback
    /// from the stopped session
    pub async fn on_stop(&self) -> Result<(), TrackingError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Stop { reply })
            .await
            .map_err(|_| TrackingError::ServiceStopped)?;
        rx.await.map_err(|_| TrackingError::ServiceStopped)
    }

    pub fn is_tracking_active(&self) -> bool {
        self.status_rx.borrow().is_tracking_active()
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status_rx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }
}
