//! Platform seams
//!
//! Everything the controllers need from the browser goes through these traits.
//! Both browser contexts are single-threaded, so none of the futures are `Send`.

use crate::capability::CapabilityReport;
use crate::lifecycle::LifecycleEvent;
use crate::message::WorkerMessage;
use crate::payload::NotificationPayload;
use crate::vapid::ApplicationServerKey;
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A browser API call rejected or was unavailable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

// ============================================================================
// PAGE CONTEXT
// ============================================================================

/// Page-side hooks used by the worker lifecycle controller.
#[async_trait(?Send)]
pub trait PageHost {
    /// `navigator.serviceWorker` exists.
    fn supports_service_worker(&self) -> bool;

    /// A worker already controls this page.
    fn has_controller(&self) -> bool;

    async fn register(&self, script_url: &str, scope: &str) -> Result<(), HostError>;

    /// Start forwarding `updatefound` and `controllerchange` as events.
    fn observe_updates(&self, events: UnboundedSender<LifecycleEvent>) -> Result<(), HostError>;

    fn show_update_indicator(&self);

    /// Follow state changes of the worker currently installing. Returns false
    /// when no worker is installing.
    fn track_installing_worker(&self, events: UnboundedSender<LifecycleEvent>) -> bool;

    fn post_to_tracked_worker(&self, message: &WorkerMessage) -> Result<(), HostError>;

    fn reload(&self) -> Result<(), HostError>;
}

/// Options passed to `PushManager.subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: ApplicationServerKey,
}

impl SubscribeOptions {
    pub fn user_visible(application_server_key: ApplicationServerKey) -> Self {
        Self {
            user_visible_only: true,
            application_server_key,
        }
    }
}

/// A platform push subscription that can serialize itself for the backend.
pub trait SubscriptionRecord {
    fn to_json(&self) -> Result<String, HostError>;
}

/// Page-side push manager access used by the subscription controller.
#[async_trait(?Send)]
pub trait PushPlatform {
    /// Handle to the active worker registration.
    type Registration: Clone + 'static;
    type Subscription: SubscriptionRecord + 'static;

    fn probe(&self) -> CapabilityReport;

    /// Resolves once a worker registration is active.
    async fn ready(&self) -> Result<Self::Registration, HostError>;

    async fn subscribe(
        &self,
        registration: &Self::Registration,
        options: &SubscribeOptions,
    ) -> Result<Self::Subscription, HostError>;

    async fn get_subscription(
        &self,
        registration: &Self::Registration,
    ) -> Result<Option<Self::Subscription>, HostError>;

    /// Resolves to whether the platform actually removed the subscription.
    async fn unsubscribe(&self, subscription: &Self::Subscription) -> Result<bool, HostError>;
}

/// The backend endpoint that stores subscriptions.
#[async_trait(?Send)]
pub trait SubscribeEndpoint {
    /// POST the subscription JSON, returning the HTTP status.
    async fn post_subscription(&self, body: &str) -> Result<u16, HostError>;
}

// ============================================================================
// WORKER CONTEXT
// ============================================================================

/// Worker-side hooks used by the push event pipeline.
#[async_trait(?Send)]
pub trait WorkerHost {
    type Client: 'static;
    type Notification: 'static;

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<(), HostError>;

    fn close_notification(&self, notification: &Self::Notification);

    /// The `url` stored in the notification's data, if any.
    fn notification_url(&self, notification: &Self::Notification) -> Option<String>;

    /// Open window clients in enumeration order.
    async fn window_clients(&self) -> Result<Vec<Self::Client>, HostError>;

    async fn focus(&self, client: Self::Client) -> Result<(), HostError>;

    fn can_open_window(&self) -> bool;

    async fn open_window(&self, url: &str) -> Result<(), HostError>;

    async fn skip_waiting(&self) -> Result<(), HostError>;
}

// ============================================================================
// SUBSCRIPTION WIRE FORM
// ============================================================================

/// Length of a URL-safe base64 P-256 public key without padding.
pub const P256DH_KEY_LEN: usize = 87;
/// Length of a URL-safe base64 16-byte auth secret without padding.
pub const AUTH_SECRET_LEN: usize = 22;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// JSON form of a `PushSubscription` (what `JSON.stringify` produces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionJson {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<u64>,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionShapeError {
    #[error("endpoint is not an http(s) URL: {0}")]
    Endpoint(String),
    #[error("p256dh key must be {P256DH_KEY_LEN} characters, got {0}")]
    P256dh(usize),
    #[error("auth secret must be {AUTH_SECRET_LEN} characters, got {0}")]
    Auth(usize),
}

impl SubscriptionJson {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the shape the push backend accepts.
    pub fn validate(&self) -> Result<(), SubscriptionShapeError> {
        let has_host = self
            .endpoint
            .strip_prefix("https://")
            .or_else(|| self.endpoint.strip_prefix("http://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(SubscriptionShapeError::Endpoint(self.endpoint.clone()));
        }
        if self.keys.p256dh.len() != P256DH_KEY_LEN {
            return Err(SubscriptionShapeError::P256dh(self.keys.p256dh.len()));
        }
        if self.keys.auth.len() != AUTH_SECRET_LEN {
            return Err(SubscriptionShapeError::Auth(self.keys.auth.len()));
        }
        Ok(())
    }
}

impl SubscriptionRecord for SubscriptionJson {
    fn to_json(&self) -> Result<String, HostError> {
        serde_json::to_string(self).map_err(|e| HostError::new(e.to_string()))
    }
}
