//! Subscription controller (page context)
//!
//! Drives the user-facing subscribe/unsubscribe state machine:
//!
//! ```text
//!   Disabled ──init──▶ Ready ──subscribe──▶ Subscribing ──201──▶ Subscribed
//!      │                 ▲                       │                    │
//!      │                 └────── other status ───┘                    │
//!      │                 ▲                                            │
//!      │                 └──────────── Unsubscribing ◀──unsubscribe───┘
//!      └──capability missing──▶ Unsupported
//! ```
//!
//! Both entry points are gated on the current state, so at most one
//! transition is ever in flight. Nothing is retried automatically.

use crate::capability::CapabilityKind;
use crate::platform::{
    HostError, PushPlatform, SubscribeEndpoint, SubscribeOptions, SubscriptionRecord,
};
use crate::vapid::ApplicationServerKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// HTTP status the subscribe endpoint returns for a stored subscription.
pub const SUBSCRIBE_CREATED: u16 = 201;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("{0} are not supported in this browser.")]
    CapabilityMissing(CapabilityKind),

    #[error("Service worker registration never became ready: {0}")]
    RegistrationUnavailable(String),

    #[error("Failed to register push subscription! (status {status})")]
    Rejected { status: u16 },

    #[error("Push manager error: {0}")]
    Platform(String),

    #[error("Subscribe endpoint unreachable: {0}")]
    Network(String),
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// A required browser capability is missing.
    Unsupported,
    /// Capabilities present but no registration handle (yet, or ever).
    Disabled,
    Ready,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Ready => write!(f, "Ready"),
            Self::Subscribing => write!(f, "Subscribing"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Unsubscribing => write!(f, "Unsubscribing"),
        }
    }
}

/// Clears the loading flag when an in-flight call finishes, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct SubscriptionController<P: PushPlatform, E: SubscribeEndpoint> {
    platform: Arc<P>,
    endpoint: Arc<E>,
    server_key: ApplicationServerKey,
    state: Arc<RwLock<SubscriptionState>>,
    registration: Arc<RwLock<Option<P::Registration>>>,
    loading: Arc<AtomicBool>,
    initialized: Arc<AtomicBool>,
}

impl<P: PushPlatform, E: SubscribeEndpoint> Clone for SubscriptionController<P, E> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            endpoint: Arc::clone(&self.endpoint),
            server_key: self.server_key.clone(),
            state: Arc::clone(&self.state),
            registration: Arc::clone(&self.registration),
            loading: Arc::clone(&self.loading),
            initialized: Arc::clone(&self.initialized),
        }
    }
}

impl<P: PushPlatform, E: SubscribeEndpoint> SubscriptionController<P, E> {
    pub fn new(platform: Arc<P>, endpoint: Arc<E>, server_key: ApplicationServerKey) -> Self {
        Self {
            platform,
            endpoint,
            server_key,
            state: Arc::new(RwLock::new(SubscriptionState::Disabled)),
            registration: Arc::new(RwLock::new(None)),
            loading: Arc::new(AtomicBool::new(false)),
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.read()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.state() == SubscriptionState::Subscribed
    }

    /// True until a registration handle is held.
    pub fn is_disabled(&self) -> bool {
        matches!(
            self.state(),
            SubscriptionState::Unsupported | SubscriptionState::Disabled
        )
    }

    pub fn registration(&self) -> Option<P::Registration> {
        self.registration.read().clone()
    }

    /// Probe capabilities and wait for the worker registration. Runs once per
    /// controller; later calls just report the current state.
    pub async fn init(&self) -> Result<SubscriptionState, SubscriptionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(self.state());
        }

        let report = self.platform.probe();
        if let Some(missing) = report.first_unavailable() {
            let err = SubscriptionError::CapabilityMissing(missing);
            tracing::warn!("{}", err);
            self.set_state(SubscriptionState::Unsupported);
            return Err(err);
        }

        match self.platform.ready().await {
            Ok(registration) => {
                *self.registration.write() = Some(registration);
                self.set_state(SubscriptionState::Ready);
                Ok(SubscriptionState::Ready)
            }
            Err(HostError(e)) => {
                tracing::error!("Service worker registration never became ready: {}", e);
                Err(SubscriptionError::RegistrationUnavailable(e))
            }
        }
    }

    /// Subscribe with the push manager and hand the subscription to the
    /// backend. Only acts from `Ready`; otherwise returns the current state.
    pub async fn subscribe(&self) -> Result<SubscriptionState, SubscriptionError> {
        let Some(registration) = self.registration() else {
            tracing::debug!("subscribe ignored: no registration yet");
            return Ok(self.state());
        };
        if let Err(current) =
            self.begin(&[SubscriptionState::Ready], SubscriptionState::Subscribing)
        {
            tracing::debug!("subscribe ignored in state {}", current);
            return Ok(current);
        }

        let _loading = LoadingGuard::start(&self.loading);
        let result = self.perform_subscribe(&registration).await;

        let next = if result.is_ok() {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::Ready
        };
        self.set_state(next);
        result.map(|()| next)
    }

    async fn perform_subscribe(
        &self,
        registration: &P::Registration,
    ) -> Result<(), SubscriptionError> {
        let options = SubscribeOptions::user_visible(self.server_key.clone());

        let subscription = self
            .platform
            .subscribe(registration, &options)
            .await
            .map_err(|HostError(e)| {
                tracing::error!("Push subscription failed: {}", e);
                SubscriptionError::Platform(e)
            })?;

        let body = subscription
            .to_json()
            .map_err(|HostError(e)| SubscriptionError::Platform(e))?;

        let status = self
            .endpoint
            .post_subscription(&body)
            .await
            .map_err(|HostError(e)| {
                tracing::error!("Failed to register push subscription! {}", e);
                SubscriptionError::Network(e)
            })?;

        if status != SUBSCRIBE_CREATED {
            let err = SubscriptionError::Rejected { status };
            tracing::error!("{}", err);
            return Err(err);
        }

        tracing::info!("push subscription registered");
        Ok(())
    }

    /// Drop the platform subscription, if any. No network call is made.
    pub async fn unsubscribe(&self) -> Result<SubscriptionState, SubscriptionError> {
        let Some(registration) = self.registration() else {
            tracing::debug!("unsubscribe ignored: no registration yet");
            return Ok(self.state());
        };
        let previous = match self.begin(
            &[SubscriptionState::Ready, SubscriptionState::Subscribed],
            SubscriptionState::Unsubscribing,
        ) {
            Ok(previous) => previous,
            Err(current) => {
                tracing::debug!("unsubscribe ignored in state {}", current);
                return Ok(current);
            }
        };

        let _loading = LoadingGuard::start(&self.loading);
        match self.perform_unsubscribe(&registration).await {
            Ok(()) => {
                self.set_state(SubscriptionState::Ready);
                Ok(SubscriptionState::Ready)
            }
            Err(err) => {
                tracing::error!("{}", err);
                self.set_state(previous);
                Err(err)
            }
        }
    }

    async fn perform_unsubscribe(
        &self,
        registration: &P::Registration,
    ) -> Result<(), SubscriptionError> {
        let existing = self
            .platform
            .get_subscription(registration)
            .await
            .map_err(|HostError(e)| SubscriptionError::Platform(e))?;

        let Some(subscription) = existing else {
            tracing::debug!("no push subscription to remove");
            return Ok(());
        };

        let removed = self
            .platform
            .unsubscribe(&subscription)
            .await
            .map_err(|HostError(e)| SubscriptionError::Platform(e))?;
        if !removed {
            tracing::warn!("push manager reported the subscription was not removed");
        }
        Ok(())
    }

    /// Move to `next` if the current state is one of `allowed`. Returns the
    /// state that was replaced, or the current state when refused.
    fn begin(
        &self,
        allowed: &[SubscriptionState],
        next: SubscriptionState,
    ) -> Result<SubscriptionState, SubscriptionState> {
        let mut state = self.state.write();
        let current = *state;
        if !allowed.contains(&current) {
            return Err(current);
        }
        *state = next;
        tracing::debug!("subscription state {} -> {}", current, next);
        Ok(current)
    }

    fn set_state(&self, next: SubscriptionState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::debug!("subscription state {} -> {}", *state, next);
            *state = next;
        }
    }
}
