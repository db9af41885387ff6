// Worker context: push, notification click, messages, precache and the
// runtime cache
//
// `installWorkerHandlers` is called from the service worker script. Every
// handler hands its work to `waitUntil` so the browser keeps the worker alive
// until it completes.

use crate::listeners::ListenerSet;
use crate::{js_error, parse_config, to_js_error};
use async_trait::async_trait;
use futures::FutureExt;
use js_sys::{Array, Promise, Reflect};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use swpush_core::{
    EventTask, ExpirationPolicy, HostError, NotificationPayload, PipelineError, PrecacheManifest,
    PrecacheRoutes, PushData, PushError, PushEventPipeline, RuntimeCacheIndex, RuntimeCacheRoute,
    WorkerHost,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    Cache, ClientQueryOptions, ClientType, Event, ExtendableEvent, ExtendableMessageEvent,
    FetchEvent, Notification, NotificationEvent, NotificationOptions, PushEvent, Request,
    Response, ServiceWorkerGlobalScope, WindowClient,
};

thread_local! {
    static HANDLERS: RefCell<Option<ListenerSet>> = const { RefCell::new(None) };
}

fn global_scope() -> Result<ServiceWorkerGlobalScope, HostError> {
    js_sys::global()
        .dyn_into()
        .map_err(|_| HostError::new("not running in a service worker"))
}

async fn open_cache(scope: &ServiceWorkerGlobalScope, name: &str) -> Result<Cache, HostError> {
    let storage = scope.caches().map_err(|e| js_error("caches", e))?;
    JsFuture::from(storage.open(name))
        .await
        .map_err(|e| js_error("caches.open", e))?
        .dyn_into()
        .map_err(|_| HostError::new("Unexpected return value from caches.open"))
}

async fn fetch(scope: &ServiceWorkerGlobalScope, request: &Request) -> Result<Response, HostError> {
    JsFuture::from(scope.fetch_with_request(request))
        .await
        .map_err(|e| js_error("fetch", e))?
        .dyn_into()
        .map_err(|_| HostError::new("Unexpected return value from fetch"))
}

/// Keep `event` alive until `task` settles.
fn extend(event: &ExtendableEvent, task: EventTask) {
    let promise = future_to_promise(async move {
        task.await
            .map(|()| JsValue::UNDEFINED)
            .map_err(|e| {
                tracing::error!("{}", e);
                to_js_error(PushError::from(e))
            })
    });
    if let Err(e) = event.wait_until(&promise) {
        tracing::error!("waitUntil rejected: {:?}", e);
    }
}

// ============================================================================
// WORKER HOST
// ============================================================================

pub struct WebWorkerHost {
    scope: ServiceWorkerGlobalScope,
}

impl WebWorkerHost {
    pub fn new(scope: ServiceWorkerGlobalScope) -> Self {
        Self { scope }
    }
}

#[async_trait(?Send)]
impl WorkerHost for WebWorkerHost {
    type Client = WindowClient;
    type Notification = Notification;

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<(), HostError> {
        let options = NotificationOptions::new();
        if let Some(body) = &payload.body {
            options.set_body(body);
        }
        if let Some(icon) = &payload.icon {
            options.set_icon(icon);
        }
        options.set_tag(&payload.tag);
        options.set_renotify(payload.renotify);

        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let data = serde::Serialize::serialize(&payload.notification_data(), &serializer)
            .map_err(|e| HostError::new(e.to_string()))?;
        options.set_data(&data);

        let promise = self
            .scope
            .registration()
            .show_notification_with_options(&payload.title, &options)
            .map_err(|e| js_error("registration.showNotification", e))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| js_error("registration.showNotification", e))?;
        Ok(())
    }

    fn close_notification(&self, notification: &Notification) {
        notification.close();
    }

    fn notification_url(&self, notification: &Notification) -> Option<String> {
        let data = notification.data();
        if data.is_null() || data.is_undefined() {
            return None;
        }
        Reflect::get(&data, &JsValue::from_str("url"))
            .ok()
            .and_then(|url| url.as_string())
    }

    async fn window_clients(&self) -> Result<Vec<WindowClient>, HostError> {
        let options = ClientQueryOptions::new();
        options.set_type(ClientType::Window);

        let matched = JsFuture::from(self.scope.clients().match_all_with_options(&options))
            .await
            .map_err(|e| js_error("clients.matchAll", e))?;
        Ok(Array::from(&matched)
            .iter()
            .filter_map(|client| client.dyn_into::<WindowClient>().ok())
            .collect())
    }

    async fn focus(&self, client: WindowClient) -> Result<(), HostError> {
        let promise = client.focus().map_err(|e| js_error("WindowClient.focus", e))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| js_error("WindowClient.focus", e))?;
        Ok(())
    }

    fn can_open_window(&self) -> bool {
        Reflect::has(&self.scope.clients(), &JsValue::from_str("openWindow")).unwrap_or(false)
    }

    async fn open_window(&self, url: &str) -> Result<(), HostError> {
        JsFuture::from(self.scope.clients().open_window(url))
            .await
            .map_err(|e| js_error("clients.openWindow", e))?;
        Ok(())
    }

    async fn skip_waiting(&self) -> Result<(), HostError> {
        let promise = self
            .scope
            .skip_waiting()
            .map_err(|e| js_error("skipWaiting", e))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| js_error("skipWaiting", e))?;
        Ok(())
    }
}

// ============================================================================
// RUNTIME CACHE
// ============================================================================

/// Cache-first handling for requests under the configured prefix, capped at
/// the policy's entry count.
pub struct RuntimeCache {
    scope: ServiceWorkerGlobalScope,
    route: RuntimeCacheRoute,
    index: Mutex<Option<RuntimeCacheIndex>>,
    policy: ExpirationPolicy,
}

impl RuntimeCache {
    pub fn new(scope: ServiceWorkerGlobalScope, route: RuntimeCacheRoute, policy: ExpirationPolicy) -> Self {
        Self {
            scope,
            route,
            index: Mutex::new(None),
            policy,
        }
    }

    pub fn handles(&self, request: &Request) -> bool {
        request.method() == "GET" && self.route.matches(&request.url())
    }

    /// Rebuild the index from what a previous worker left in the cache.
    async fn ensure_index(&self, cache: &Cache) -> Result<(), HostError> {
        if self.index.lock().is_some() {
            return Ok(());
        }
        let keys = JsFuture::from(cache.keys())
            .await
            .map_err(|e| js_error("cache.keys", e))?;

        let mut index = RuntimeCacheIndex::new(self.policy);
        let mut evicted = Vec::new();
        for request in Array::from(&keys).iter() {
            if let Ok(request) = request.dyn_into::<Request>() {
                evicted.extend(index.record(&request.url()));
            }
        }

        let mut slot = self.index.lock();
        if slot.is_none() {
            *slot = Some(index);
        }
        drop(slot);

        self.evict(cache, evicted).await;
        Ok(())
    }

    async fn evict(&self, cache: &Cache, urls: Vec<String>) {
        for url in urls {
            tracing::debug!("runtime cache evicting {}", url);
            if let Err(e) = JsFuture::from(cache.delete_with_str(&url)).await {
                tracing::warn!("{}", js_error("cache.delete", e));
            }
        }
    }

    pub async fn respond(&self, request: Request) -> Result<Response, HostError> {
        let cache = open_cache(&self.scope, &self.route.cache_name).await?;
        self.ensure_index(&cache).await?;
        let url = request.url();

        let cached = JsFuture::from(cache.match_with_request(&request))
            .await
            .map_err(|e| js_error("cache.match", e))?;
        if let Ok(response) = cached.dyn_into::<Response>() {
            let evicted = self
                .index
                .lock()
                .as_mut()
                .map(|index| index.record(&url))
                .unwrap_or_default();
            self.evict(&cache, evicted).await;
            return Ok(response);
        }

        let response = fetch(&self.scope, &request).await?;

        // Opaque responses have status 0 and are stored too.
        if response.ok() || response.status() == 0 {
            let copy = response.clone().map_err(|e| js_error("Response.clone", e))?;
            JsFuture::from(cache.put_with_request(&request, &copy))
                .await
                .map_err(|e| js_error("cache.put", e))?;
            let evicted = self
                .index
                .lock()
                .as_mut()
                .map(|index| index.record(&url))
                .unwrap_or_default();
            self.evict(&cache, evicted).await;
        }
        Ok(response)
    }
}

// ============================================================================
// PRECACHE
// ============================================================================

/// The build manifest, stored on install and served cache-first.
pub struct Precache {
    scope: ServiceWorkerGlobalScope,
    cache_name: String,
    routes: PrecacheRoutes,
}

impl Precache {
    pub fn new(scope: ServiceWorkerGlobalScope, manifest: &PrecacheManifest) -> Self {
        let origin = scope.location().origin();
        Self {
            routes: manifest.routes(&origin),
            cache_name: manifest.cache_name.clone(),
            scope,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Store every entry not already cached under its revisioned key. Any
    /// failed fetch fails the install, so the previous worker stays active.
    pub async fn install(&self) -> Result<(), HostError> {
        let cache = open_cache(&self.scope, &self.cache_name).await?;
        let mut fetched = 0;
        for (url, key) in self.routes.keys() {
            let cached = JsFuture::from(cache.match_with_str(key))
                .await
                .map_err(|e| js_error("cache.match", e))?;
            if cached.is_instance_of::<Response>() {
                continue;
            }

            let request = Request::new_with_str(url).map_err(|e| js_error("Request", e))?;
            let response = fetch(&self.scope, &request).await?;
            if !response.ok() {
                return Err(HostError::new(format!(
                    "precache fetch of {} returned {}",
                    url,
                    response.status()
                )));
            }
            JsFuture::from(cache.put_with_str(key, &response))
                .await
                .map_err(|e| js_error("cache.put", e))?;
            fetched += 1;
        }
        tracing::info!("precached {} of {} files", fetched, self.routes.len());
        Ok(())
    }

    /// Delete entries left by earlier builds.
    pub async fn activate(&self) -> Result<(), HostError> {
        let cache = open_cache(&self.scope, &self.cache_name).await?;
        let keys = JsFuture::from(cache.keys())
            .await
            .map_err(|e| js_error("cache.keys", e))?;
        let cached: Vec<String> = Array::from(&keys)
            .iter()
            .filter_map(|request| request.dyn_into::<Request>().ok())
            .map(|request| request.url())
            .collect();

        for key in self.routes.stale(&cached) {
            tracing::debug!("precache removing stale {}", key);
            JsFuture::from(cache.delete_with_str(key))
                .await
                .map_err(|e| js_error("cache.delete", e))?;
        }
        Ok(())
    }

    pub fn key_for(&self, request: &Request) -> Option<String> {
        if request.method() != "GET" {
            return None;
        }
        self.routes.lookup(&request.url()).map(str::to_string)
    }

    pub async fn respond(&self, request: Request, key: String) -> Result<Response, HostError> {
        let cache = open_cache(&self.scope, &self.cache_name).await?;
        let cached = JsFuture::from(cache.match_with_str(&key))
            .await
            .map_err(|e| js_error("cache.match", e))?;
        if let Ok(response) = cached.dyn_into::<Response>() {
            return Ok(response);
        }
        tracing::warn!("precache miss for {}, using the network", key);
        fetch(&self.scope, &request).await
    }
}

// ============================================================================
// EVENT WIRING
// ============================================================================

/// Both caches a fetch may be answered from.
pub struct FetchRouter {
    precache: Rc<Precache>,
    runtime: RuntimeCache,
}

fn on_install(precache: &Rc<Precache>, event: Event) {
    let Ok(event) = event.dyn_into::<ExtendableEvent>() else {
        return;
    };
    let precache = Rc::clone(precache);
    let task: EventTask =
        async move { precache.install().await.map_err(PipelineError::from) }.boxed_local();
    extend(&event, task);
}

fn on_activate(precache: &Rc<Precache>, event: Event) {
    let Ok(event) = event.dyn_into::<ExtendableEvent>() else {
        return;
    };
    let precache = Rc::clone(precache);
    let task: EventTask =
        async move { precache.activate().await.map_err(PipelineError::from) }.boxed_local();
    extend(&event, task);
}

fn on_push(pipeline: &PushEventPipeline<WebWorkerHost>, event: Event) {
    let Ok(event) = event.dyn_into::<PushEvent>() else {
        return;
    };
    let data = event.data().map(|d| PushData::from_text(d.text()));
    extend(&event, pipeline.on_push(data));
}

fn on_notification_click(pipeline: &PushEventPipeline<WebWorkerHost>, event: Event) {
    let Ok(event) = event.dyn_into::<NotificationEvent>() else {
        return;
    };
    extend(&event, pipeline.on_notification_click(event.notification()));
}

fn on_message(pipeline: &PushEventPipeline<WebWorkerHost>, event: Event) {
    let Ok(event) = event.dyn_into::<ExtendableMessageEvent>() else {
        return;
    };
    let message: serde_json::Value = match serde_wasm_bindgen::from_value(event.data()) {
        Ok(message) => message,
        Err(_) => return,
    };
    if let Some(task) = pipeline.on_message(&message) {
        extend(&event, task);
    }
}

fn on_fetch(router: &Rc<FetchRouter>, event: Event) {
    let Ok(event) = event.dyn_into::<FetchEvent>() else {
        return;
    };
    let request = event.request();
    let precache_key = router.precache.key_for(&request);
    if precache_key.is_none() && !router.runtime.handles(&request) {
        return;
    }

    let router = Rc::clone(router);
    let promise: Promise = future_to_promise(async move {
        let response = match precache_key {
            Some(key) => router.precache.respond(request, key).await,
            None => router.runtime.respond(request).await,
        };
        response
            .map(JsValue::from)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    });
    if let Err(e) = event.respond_with(&promise) {
        tracing::error!("respondWith rejected: {:?}", e);
    }
}

/// Attach the install, activate, push, notificationclick, message and fetch
/// handlers to the worker global scope. Calling it again replaces the
/// previous handlers.
#[wasm_bindgen(js_name = installWorkerHandlers)]
pub fn install_worker_handlers(config: JsValue) -> Result<(), JsValue> {
    let config = parse_config(config)?;
    config
        .validate_paths()
        .map_err(|e| to_js_error(PushError::from(e)))?;
    let scope = global_scope().map_err(|e| JsValue::from_str(&e.to_string()))?;

    let pipeline = PushEventPipeline::new(
        Arc::new(WebWorkerHost::new(scope.clone())),
        config.notification.clone(),
        &config.default_click_url,
    );
    let precache = Rc::new(Precache::new(scope.clone(), &config.precache));
    let router = Rc::new(FetchRouter {
        precache: Rc::clone(&precache),
        runtime: RuntimeCache::new(
            scope.clone(),
            RuntimeCacheRoute::from_config(&config.runtime_cache),
            ExpirationPolicy::new(config.runtime_cache.max_entries),
        ),
    });

    let listeners = ListenerSet::new();
    if !precache.is_empty() {
        let p = Rc::clone(&precache);
        listeners.attach(scope.as_ref(), "install", move |e| on_install(&p, e))?;
        listeners.attach(scope.as_ref(), "activate", move |e| on_activate(&precache, e))?;
    }
    let p = pipeline.clone();
    listeners.attach(scope.as_ref(), "push", move |e| on_push(&p, e))?;
    let p = pipeline.clone();
    listeners.attach(scope.as_ref(), "notificationclick", move |e| {
        on_notification_click(&p, e)
    })?;
    listeners.attach(scope.as_ref(), "message", move |e| on_message(&pipeline, e))?;
    listeners.attach(scope.as_ref(), "fetch", move |e| on_fetch(&router, e))?;

    tracing::info!("worker handlers installed ({} listeners)", listeners.len());
    HANDLERS.with(|slot| *slot.borrow_mut() = Some(listeners));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_install_outside_worker_fails() {
        // The test page is a window, not a service worker.
        assert!(install_worker_handlers(JsValue::UNDEFINED).is_err());
    }
}
