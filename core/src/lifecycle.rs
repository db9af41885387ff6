//! Worker lifecycle controller (page context)
//!
//! Registers the service worker on page load. When the page was already
//! controlled by an older worker, it follows the update handshake:
//!
//! 1. `UpdateFound`: show the update indicator and follow the installing worker.
//! 2. The installing worker reaches `Installed`: tell it to skip waiting.
//! 3. `ControllerChanged`: the new worker took over, reload once.
//!
//! A first install never reloads the page that created it.

use crate::message::WorkerMessage;
use crate::platform::{HostError, PageHost};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Service worker registration failed: {0}")]
    Registration(String),

    #[error("Could not observe worker updates: {0}")]
    Observe(String),

    #[error("Could not message the installing worker: {0}")]
    PostMessage(String),

    #[error("Page reload failed: {0}")]
    Reload(String),
}

// ============================================================================
// TYPES
// ============================================================================

/// `ServiceWorker.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The registration found a new worker script.
    UpdateFound,
    /// The tracked installing worker changed state.
    InstallingStateChanged(WorkerState),
    /// A different worker now controls the page.
    ControllerChanged,
}

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    IndicatorShown,
    SkipWaitingSent,
    Reloaded,
    Ignored,
}

#[derive(Debug)]
pub enum BootstrapOutcome {
    /// No service worker support; the page runs without push.
    Unsupported,
    /// Nothing controlled the page before; no update wiring.
    FirstInstall,
    /// An older worker controls the page; feed these events to
    /// [`WorkerLifecycleController::watch`].
    Watching(UnboundedReceiver<LifecycleEvent>),
}

/// Allows at most one reload per controller (i.e. per page load).
#[derive(Debug, Default)]
pub struct RefreshGuard {
    refreshing: AtomicBool,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once.
    pub fn try_claim(&self) -> bool {
        !self.refreshing.swap(true, Ordering::SeqCst)
    }

    pub fn is_claimed(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct WorkerLifecycleController<H: PageHost> {
    host: Arc<H>,
    script_url: String,
    scope: String,
    refresh: RefreshGuard,
    events_tx: Mutex<Option<UnboundedSender<LifecycleEvent>>>,
}

impl<H: PageHost> WorkerLifecycleController<H> {
    pub fn new(host: Arc<H>, script_url: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            host,
            script_url: script_url.into(),
            scope: scope.into(),
            refresh: RefreshGuard::new(),
            events_tx: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn refresh_guard(&self) -> &RefreshGuard {
        &self.refresh
    }

    /// Register the worker. Call once, after the page has loaded.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome, LifecycleError> {
        if !self.host.supports_service_worker() {
            tracing::warn!("Service workers are not supported in this browser.");
            return Ok(BootstrapOutcome::Unsupported);
        }

        // Must be read before registering: registration may claim the page.
        let is_initial = !self.host.has_controller();

        self.host
            .register(&self.script_url, &self.scope)
            .await
            .map_err(|HostError(e)| {
                tracing::error!("Service worker registration failed: {}", e);
                LifecycleError::Registration(e)
            })?;
        tracing::info!("service worker registered: {} (scope {})", self.script_url, self.scope);

        if is_initial {
            return Ok(BootstrapOutcome::FirstInstall);
        }

        let (tx, rx) = mpsc::unbounded();
        self.host
            .observe_updates(tx.clone())
            .map_err(|HostError(e)| LifecycleError::Observe(e))?;
        *self.events_tx.lock() = Some(tx);

        Ok(BootstrapOutcome::Watching(rx))
    }

    pub fn handle_event(&self, event: LifecycleEvent) -> Result<LifecycleAction, LifecycleError> {
        match event {
            LifecycleEvent::UpdateFound => {
                self.host.show_update_indicator();
                let tx = self.events_tx.lock().clone();
                let tracking = match tx {
                    Some(tx) => self.host.track_installing_worker(tx),
                    None => false,
                };
                if tracking {
                    tracing::info!("new service worker installing");
                } else {
                    tracing::debug!("update found but no installing worker to follow");
                }
                Ok(LifecycleAction::IndicatorShown)
            }
            LifecycleEvent::InstallingStateChanged(WorkerState::Installed) => {
                self.host
                    .post_to_tracked_worker(&WorkerMessage::SkipWaiting)
                    .map_err(|HostError(e)| LifecycleError::PostMessage(e))?;
                tracing::info!("new service worker installed, requested skip waiting");
                Ok(LifecycleAction::SkipWaitingSent)
            }
            LifecycleEvent::InstallingStateChanged(state) => {
                tracing::debug!("installing worker state: {:?}", state);
                Ok(LifecycleAction::Ignored)
            }
            LifecycleEvent::ControllerChanged => {
                if !self.refresh.try_claim() {
                    return Ok(LifecycleAction::Ignored);
                }
                tracing::info!("service worker controller changed, reloading");
                self.host
                    .reload()
                    .map_err(|HostError(e)| LifecycleError::Reload(e))?;
                Ok(LifecycleAction::Reloaded)
            }
        }
    }

    /// Handle events until the stream ends. Failures are logged, not fatal.
    pub async fn watch<S>(&self, mut events: S)
    where
        S: Stream<Item = LifecycleEvent> + Unpin,
    {
        while let Some(event) = events.next().await {
            if let Err(e) = self.handle_event(event) {
                tracing::error!("{}", e);
            }
        }
        tracing::debug!("lifecycle event stream closed");
    }
}
