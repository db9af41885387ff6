// Shared in-memory hosts for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use futures::channel::oneshot;
use parking_lot::Mutex;
use swpush_core::{
    CapabilityReport, HostError, LifecycleEvent, NotificationPayload, PageHost, PushPlatform,
    SubscribeEndpoint, SubscribeOptions, SubscriptionJson, SubscriptionKeys, WorkerHost,
    WorkerMessage, WorkerState,
};

pub const VAPID_KEY: &str =
    "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

// ============================================================================
// PAGE
// ============================================================================

/// A page whose browser events are fired by the test.
#[derive(Default)]
pub struct BrowserPage {
    pub controlled: bool,
    pub registrations: Mutex<Vec<String>>,
    pub update_tx: Mutex<Option<UnboundedSender<LifecycleEvent>>>,
    pub installing_tx: Mutex<Option<UnboundedSender<LifecycleEvent>>>,
    pub indicator_shown: Mutex<bool>,
    pub posted: Mutex<Vec<serde_json::Value>>,
    pub reloads: Mutex<u32>,
}

impl BrowserPage {
    pub fn controlled() -> Self {
        Self {
            controlled: true,
            ..Default::default()
        }
    }

    /// Events fired before the page is wired panic instead of vanishing.
    pub fn fire_update_found(&self) {
        self.update_tx
            .lock()
            .as_ref()
            .expect("updatefound fired before observe_updates")
            .unbounded_send(LifecycleEvent::UpdateFound)
            .unwrap();
    }

    pub fn fire_installing_state(&self, state: WorkerState) {
        self.installing_tx
            .lock()
            .as_ref()
            .expect("statechange fired before an installing worker was tracked")
            .unbounded_send(LifecycleEvent::InstallingStateChanged(state))
            .unwrap();
    }

    pub fn fire_controller_change(&self) {
        self.update_tx
            .lock()
            .as_ref()
            .expect("controllerchange fired before observe_updates")
            .unbounded_send(LifecycleEvent::ControllerChanged)
            .unwrap();
    }

    pub fn is_tracking_installing(&self) -> bool {
        self.installing_tx.lock().is_some()
    }

    pub fn is_wired(&self) -> bool {
        self.update_tx.lock().is_some()
    }
}

#[async_trait(?Send)]
impl PageHost for BrowserPage {
    fn supports_service_worker(&self) -> bool {
        true
    }

    fn has_controller(&self) -> bool {
        self.controlled
    }

    async fn register(&self, script_url: &str, _scope: &str) -> Result<(), HostError> {
        self.registrations.lock().push(script_url.to_string());
        Ok(())
    }

    fn observe_updates(&self, events: UnboundedSender<LifecycleEvent>) -> Result<(), HostError> {
        *self.update_tx.lock() = Some(events);
        Ok(())
    }

    fn show_update_indicator(&self) {
        *self.indicator_shown.lock() = true;
    }

    fn track_installing_worker(&self, events: UnboundedSender<LifecycleEvent>) -> bool {
        *self.installing_tx.lock() = Some(events);
        true
    }

    fn post_to_tracked_worker(&self, message: &WorkerMessage) -> Result<(), HostError> {
        self.posted.lock().push(message.to_value());
        Ok(())
    }

    fn reload(&self) -> Result<(), HostError> {
        *self.reloads.lock() += 1;
        Ok(())
    }
}

// ============================================================================
// PUSH MANAGER + ENDPOINT
// ============================================================================

pub fn sample_subscription() -> SubscriptionJson {
    SubscriptionJson {
        endpoint: "https://updates.push.services.mozilla.com/wpush/v2/abc".to_string(),
        expiration_time: None,
        keys: SubscriptionKeys {
            p256dh: "B".repeat(87),
            auth: "a".repeat(22),
        },
    }
}

#[derive(Default)]
pub struct PushManager {
    pub report: Option<CapabilityReport>,
    pub stored: Mutex<Option<SubscriptionJson>>,
    pub subscribe_calls: Mutex<u32>,
    pub unsubscribe_calls: Mutex<u32>,
}

#[async_trait(?Send)]
impl PushPlatform for PushManager {
    type Registration = &'static str;
    type Subscription = SubscriptionJson;

    fn probe(&self) -> CapabilityReport {
        self.report.unwrap_or_else(CapabilityReport::all_available)
    }

    async fn ready(&self) -> Result<&'static str, HostError> {
        Ok("/")
    }

    async fn subscribe(
        &self,
        _registration: &&'static str,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionJson, HostError> {
        assert!(options.user_visible_only);
        assert!(options.application_server_key.is_uncompressed_p256());
        *self.subscribe_calls.lock() += 1;
        let sub = sample_subscription();
        *self.stored.lock() = Some(sub.clone());
        Ok(sub)
    }

    async fn get_subscription(
        &self,
        _registration: &&'static str,
    ) -> Result<Option<SubscriptionJson>, HostError> {
        Ok(self.stored.lock().clone())
    }

    async fn unsubscribe(&self, _subscription: &SubscriptionJson) -> Result<bool, HostError> {
        *self.unsubscribe_calls.lock() += 1;
        Ok(self.stored.lock().take().is_some())
    }
}

/// Backend endpoint. With a gate installed, the first POST waits for the test
/// to release it.
pub struct Backend {
    pub status: u16,
    pub posts: Mutex<Vec<String>>,
    pub gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Backend {
    pub fn returning(status: u16) -> Self {
        Self {
            status,
            posts: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn gated(status: u16) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let backend = Self {
            gate: Mutex::new(Some(rx)),
            ..Self::returning(status)
        };
        (backend, tx)
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().len()
    }
}

#[async_trait(?Send)]
impl SubscribeEndpoint for Backend {
    async fn post_subscription(&self, body: &str) -> Result<u16, HostError> {
        self.posts.lock().push(body.to_string());
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.await.map_err(|_| HostError::new("gate dropped"))?;
        }
        Ok(self.status)
    }
}

// ============================================================================
// WORKER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenWindow {
    pub id: u32,
}

pub struct ShownNotification {
    pub url: Option<String>,
}

#[derive(Default)]
pub struct ServiceWorker {
    pub windows: Vec<OpenWindow>,
    pub open_window_available: bool,
    pub shown: Mutex<Vec<NotificationPayload>>,
    pub closed: Mutex<u32>,
    pub focused: Mutex<Vec<u32>>,
    pub opened: Mutex<Vec<String>>,
    pub skip_waiting_calls: Mutex<u32>,
}

#[async_trait(?Send)]
impl WorkerHost for ServiceWorker {
    type Client = OpenWindow;
    type Notification = ShownNotification;

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<(), HostError> {
        self.shown.lock().push(payload.clone());
        Ok(())
    }

    fn close_notification(&self, _notification: &ShownNotification) {
        *self.closed.lock() += 1;
    }

    fn notification_url(&self, notification: &ShownNotification) -> Option<String> {
        notification.url.clone()
    }

    async fn window_clients(&self) -> Result<Vec<OpenWindow>, HostError> {
        Ok(self.windows.clone())
    }

    async fn focus(&self, client: OpenWindow) -> Result<(), HostError> {
        self.focused.lock().push(client.id);
        Ok(())
    }

    fn can_open_window(&self) -> bool {
        self.open_window_available
    }

    async fn open_window(&self, url: &str) -> Result<(), HostError> {
        self.opened.lock().push(url.to_string());
        Ok(())
    }

    async fn skip_waiting(&self) -> Result<(), HostError> {
        *self.skip_waiting_calls.lock() += 1;
        Ok(())
    }
}
