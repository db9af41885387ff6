// Page context: worker registration, update handshake and the push widget
//
// web-sys implementations of the core page traits, plus the two entry points
// the page script calls: `bootstrapWorker` on load and `PushSubscriptionWidget`
// for the subscribe toggle.

use crate::listeners::{ListenerSet, ManagedListener};
use crate::{js_error, parse_config, to_js_error};
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use futures::channel::oneshot;
use js_sys::{Promise, Reflect, Uint8Array};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use swpush_core::{
    BootstrapOutcome, Capability, CapabilityReport, HostError, LifecycleEvent, PageHost,
    PushError, PushPlatform, SubscribeEndpoint, SubscribeOptions, SubscriptionController,
    SubscriptionRecord, WorkerLifecycleController, WorkerMessage, WorkerState,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    Event, EventTarget, Headers, PushManager, PushSubscription, PushSubscriptionOptionsInit,
    RegistrationOptions, Request, RequestInit, Response, ServiceWorker, ServiceWorkerContainer,
    ServiceWorkerRegistration, ServiceWorkerState, Window,
};

/// Attribute set on `<html>` when no `renderLoader` function is defined.
const UPDATE_INDICATOR_ATTR: &str = "data-sw-updating";

fn window() -> Result<Window, HostError> {
    web_sys::window().ok_or_else(|| HostError::new("no window in this context"))
}

fn has_property(target: &JsValue, name: &str) -> bool {
    Reflect::has(target, &JsValue::from_str(name)).unwrap_or(false)
}

fn container() -> Result<ServiceWorkerContainer, HostError> {
    Ok(window()?.navigator().service_worker())
}

fn worker_state(state: ServiceWorkerState) -> Option<WorkerState> {
    match state {
        ServiceWorkerState::Parsed => Some(WorkerState::Parsed),
        ServiceWorkerState::Installing => Some(WorkerState::Installing),
        ServiceWorkerState::Installed => Some(WorkerState::Installed),
        ServiceWorkerState::Activating => Some(WorkerState::Activating),
        ServiceWorkerState::Activated => Some(WorkerState::Activated),
        ServiceWorkerState::Redundant => Some(WorkerState::Redundant),
        _ => None,
    }
}

/// Probe the three capabilities the subscription widget needs.
pub fn probe_capabilities() -> CapabilityReport {
    let Some(window) = web_sys::window() else {
        return CapabilityReport {
            service_worker: Capability::Missing,
            notification_display: Capability::Missing,
            push_manager: Capability::Missing,
        };
    };
    let global = JsValue::from(window.clone());

    let notification_display = Reflect::get(&global, &JsValue::from_str("ServiceWorkerRegistration"))
        .and_then(|ctor| Reflect::get(&ctor, &JsValue::from_str("prototype")))
        .map(|proto| Capability::from_present(has_property(&proto, "showNotification")))
        .unwrap_or(Capability::Unknown);

    CapabilityReport {
        service_worker: Capability::from_present(has_property(
            &JsValue::from(window.navigator()),
            "serviceWorker",
        )),
        notification_display,
        push_manager: Capability::from_present(has_property(&global, "PushManager")),
    }
}

// ============================================================================
// WORKER LIFECYCLE
// ============================================================================

pub struct WebPageHost {
    registration: RwLock<Option<ServiceWorkerRegistration>>,
    tracked_worker: RwLock<Option<ServiceWorker>>,
    listeners: ListenerSet,
    /// `statechange` on the tracked worker; replacing it detaches the old one.
    tracked_listener: Mutex<Option<ManagedListener>>,
}

impl WebPageHost {
    pub fn new() -> Self {
        Self {
            registration: RwLock::new(None),
            tracked_worker: RwLock::new(None),
            listeners: ListenerSet::new(),
            tracked_listener: Mutex::new(None),
        }
    }

    pub fn registration(&self) -> Option<ServiceWorkerRegistration> {
        self.registration.read().clone()
    }
}

impl Default for WebPageHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl PageHost for WebPageHost {
    fn supports_service_worker(&self) -> bool {
        web_sys::window()
            .map(|w| has_property(&JsValue::from(w.navigator()), "serviceWorker"))
            .unwrap_or(false)
    }

    fn has_controller(&self) -> bool {
        container()
            .map(|c| c.controller().is_some())
            .unwrap_or(false)
    }

    async fn register(&self, script_url: &str, scope: &str) -> Result<(), HostError> {
        let options = RegistrationOptions::new();
        options.set_scope(scope);

        let promise = container()?.register_with_options(script_url, &options);
        let registration: ServiceWorkerRegistration = JsFuture::from(promise)
            .await
            .map_err(|e| js_error("serviceWorker.register", e))?
            .dyn_into()
            .map_err(|_| HostError::new("Unexpected return value from serviceWorker.register"))?;

        *self.registration.write() = Some(registration);
        Ok(())
    }

    fn observe_updates(&self, events: UnboundedSender<LifecycleEvent>) -> Result<(), HostError> {
        let registration = self
            .registration()
            .ok_or_else(|| HostError::new("no registration to observe"))?;

        let tx = events.clone();
        self.listeners
            .attach(registration.as_ref(), "updatefound", move |_| {
                let _ = tx.unbounded_send(LifecycleEvent::UpdateFound);
            })
            .map_err(HostError::new)?;

        let container = container()?;
        self.listeners
            .attach(container.as_ref(), "controllerchange", move |_| {
                let _ = events.unbounded_send(LifecycleEvent::ControllerChanged);
            })
            .map_err(HostError::new)?;
        Ok(())
    }

    fn show_update_indicator(&self) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let render = Reflect::get(&window, &JsValue::from_str("renderLoader"))
            .ok()
            .and_then(|f| f.dyn_into::<js_sys::Function>().ok());
        if let Some(render) = render {
            if let Err(e) = render.call0(&JsValue::NULL) {
                tracing::warn!("renderLoader threw: {:?}", e);
            }
            return;
        }

        if let Some(root) = window.document().and_then(|d| d.document_element()) {
            let _ = root.set_attribute(UPDATE_INDICATOR_ATTR, "true");
        }
    }

    fn track_installing_worker(&self, events: UnboundedSender<LifecycleEvent>) -> bool {
        let Some(worker) = self.registration().and_then(|r| r.installing()) else {
            return false;
        };

        let observed = worker.clone();
        let listener = match ManagedListener::attach(worker.as_ref(), "statechange", move |_| {
            if let Some(state) = worker_state(observed.state()) {
                let _ = events.unbounded_send(LifecycleEvent::InstallingStateChanged(state));
            }
        }) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!("{}", e);
                return false;
            }
        };

        let previous = self.tracked_listener.lock().replace(listener);
        if previous.is_some() {
            tracing::debug!("stopped following the previous installing worker");
        }
        *self.tracked_worker.write() = Some(worker);
        true
    }

    fn post_to_tracked_worker(&self, message: &WorkerMessage) -> Result<(), HostError> {
        let worker = self
            .tracked_worker
            .read()
            .clone()
            .ok_or_else(|| HostError::new("no installing worker"))?;

        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let value = serde::Serialize::serialize(message, &serializer)
            .map_err(|e| HostError::new(e.to_string()))?;
        worker
            .post_message(&value)
            .map_err(|e| js_error("ServiceWorker.postMessage", e))
    }

    fn reload(&self) -> Result<(), HostError> {
        window()?
            .location()
            .reload()
            .map_err(|e| js_error("location.reload", e))
    }
}

/// Resolves once the document has finished loading.
async fn page_loaded() -> Result<(), HostError> {
    let window = window()?;
    let complete = window
        .document()
        .map(|d| d.ready_state() == "complete")
        .unwrap_or(true);
    if complete {
        return Ok(());
    }

    let (tx, rx) = oneshot::channel::<()>();
    let tx = Mutex::new(Some(tx));
    let target: &EventTarget = window.as_ref();
    let _listener = ManagedListener::attach(target, "load", move |_: Event| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(());
        }
    })
    .map_err(HostError::new)?;

    rx.await
        .map_err(|_| HostError::new("load listener dropped before firing"))
}

/// Register the service worker once the page has loaded and, when an older
/// worker controls the page, follow the update handshake in the background.
#[wasm_bindgen(js_name = bootstrapWorker)]
pub async fn bootstrap_worker(config: JsValue) -> Result<(), JsValue> {
    let config = parse_config(config)?;
    config
        .validate_paths()
        .map_err(|e| to_js_error(PushError::from(e)))?;

    page_loaded()
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let controller = Arc::new(WorkerLifecycleController::new(
        Arc::new(WebPageHost::new()),
        config.worker_script,
        config.worker_scope,
    ));

    let outcome = controller
        .bootstrap()
        .await
        .map_err(|e| to_js_error(PushError::from(e)))?;

    if let BootstrapOutcome::Watching(events) = outcome {
        wasm_bindgen_futures::spawn_local(async move {
            controller.watch(events).await;
        });
    }
    Ok(())
}

// ============================================================================
// PUSH SUBSCRIPTION
// ============================================================================

pub struct WebSubscription(PushSubscription);

impl SubscriptionRecord for WebSubscription {
    fn to_json(&self) -> Result<String, HostError> {
        js_sys::JSON::stringify(&self.0)
            .map(String::from)
            .map_err(|e| js_error("JSON.stringify", e))
    }
}

#[derive(Default)]
pub struct WebPushPlatform;

impl WebPushPlatform {
    fn push_manager(registration: &ServiceWorkerRegistration) -> Result<PushManager, HostError> {
        registration
            .push_manager()
            .map_err(|e| js_error("registration.pushManager", e))
    }
}

#[async_trait(?Send)]
impl PushPlatform for WebPushPlatform {
    type Registration = ServiceWorkerRegistration;
    type Subscription = WebSubscription;

    fn probe(&self) -> CapabilityReport {
        probe_capabilities()
    }

    async fn ready(&self) -> Result<ServiceWorkerRegistration, HostError> {
        let promise = container()?
            .ready()
            .map_err(|e| js_error("serviceWorker.ready", e))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| js_error("serviceWorker.ready", e))?
            .dyn_into()
            .map_err(|_| HostError::new("Unexpected return value from serviceWorker.ready"))
    }

    async fn subscribe(
        &self,
        registration: &ServiceWorkerRegistration,
        options: &SubscribeOptions,
    ) -> Result<WebSubscription, HostError> {
        let key = JsValue::from(Uint8Array::from(options.application_server_key.as_bytes()));
        let init = PushSubscriptionOptionsInit::new();
        init.set_user_visible_only(options.user_visible_only);
        init.set_application_server_key(Some(&key));

        let promise = Self::push_manager(registration)?
            .subscribe_with_options(&init)
            .map_err(|e| js_error("pushManager.subscribe", e))?;
        let subscription = JsFuture::from(promise)
            .await
            .map_err(|e| js_error("pushManager.subscribe", e))?
            .dyn_into()
            .map_err(|_| HostError::new("Unexpected return value from pushManager.subscribe"))?;
        Ok(WebSubscription(subscription))
    }

    async fn get_subscription(
        &self,
        registration: &ServiceWorkerRegistration,
    ) -> Result<Option<WebSubscription>, HostError> {
        let promise = Self::push_manager(registration)?
            .get_subscription()
            .map_err(|e| js_error("pushManager.getSubscription", e))?;
        let value = JsFuture::from(promise)
            .await
            .map_err(|e| js_error("pushManager.getSubscription", e))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        value
            .dyn_into()
            .map(|s| Some(WebSubscription(s)))
            .map_err(|_| HostError::new("Unexpected return value from pushManager.getSubscription"))
    }

    async fn unsubscribe(&self, subscription: &WebSubscription) -> Result<bool, HostError> {
        let promise = subscription
            .0
            .unsubscribe()
            .map_err(|e| js_error("PushSubscription.unsubscribe", e))?;
        let removed = JsFuture::from(promise)
            .await
            .map_err(|e| js_error("PushSubscription.unsubscribe", e))?;
        Ok(removed.as_bool().unwrap_or(false))
    }
}

/// POSTs subscriptions to a same-origin endpoint.
pub struct FetchEndpoint {
    url: String,
}

impl FetchEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait(?Send)]
impl SubscribeEndpoint for FetchEndpoint {
    async fn post_subscription(&self, body: &str) -> Result<u16, HostError> {
        let headers = Headers::new().map_err(|e| js_error("Headers", e))?;
        headers
            .set("Content-Type", "application/json")
            .map_err(|e| js_error("Headers.set", e))?;

        let init = RequestInit::new();
        init.set_method("POST");
        init.set_headers(&headers);
        init.set_body(&JsValue::from_str(body));

        let request =
            Request::new_with_str_and_init(&self.url, &init).map_err(|e| js_error("Request", e))?;
        let response: Response = JsFuture::from(window()?.fetch_with_request(&request))
            .await
            .map_err(|e| js_error("fetch", e))?
            .dyn_into()
            .map_err(|_| HostError::new("Unexpected return value from fetch"))?;
        Ok(response.status())
    }
}

type WebSubscriptionController = SubscriptionController<WebPushPlatform, FetchEndpoint>;

/// Subscribe toggle state for the page UI.
#[wasm_bindgen]
pub struct PushSubscriptionWidget {
    controller: WebSubscriptionController,
}

#[wasm_bindgen]
impl PushSubscriptionWidget {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<PushSubscriptionWidget, JsValue> {
        let config = parse_config(config)?;
        config
            .validate()
            .map_err(|e| to_js_error(PushError::from(e)))?;
        let key = config
            .application_server_key()
            .map_err(|e| to_js_error(PushError::from(e)))?;

        Ok(Self {
            controller: SubscriptionController::new(
                Arc::new(WebPushPlatform),
                Arc::new(FetchEndpoint::new(config.subscribe_endpoint)),
                key,
            ),
        })
    }

    /// Probe capabilities and wait for the worker registration. Resolves to
    /// the new state name.
    pub fn init(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            controller
                .init()
                .await
                .map(|state| JsValue::from_str(&state.to_string()))
                .map_err(|e| to_js_error(PushError::from(e)))
        })
    }

    pub fn subscribe(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            controller
                .subscribe()
                .await
                .map(|state| JsValue::from_str(&state.to_string()))
                .map_err(|e| to_js_error(PushError::from(e)))
        })
    }

    pub fn unsubscribe(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            controller
                .unsubscribe()
                .await
                .map(|state| JsValue::from_str(&state.to_string()))
                .map_err(|e| to_js_error(PushError::from(e)))
        })
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.controller.state().to_string()
    }

    #[wasm_bindgen(getter, js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.controller.is_loading()
    }

    #[wasm_bindgen(getter, js_name = isSubscribed)]
    pub fn is_subscribed(&self) -> bool {
        self.controller.is_subscribed()
    }

    #[wasm_bindgen(getter, js_name = isDisabled)]
    pub fn is_disabled(&self) -> bool {
        self.controller.is_disabled()
    }
}
