//! Push event pipeline (worker context)
//!
//! One dispatch function per event kind. Each returns an [`EventTask`]: the
//! host must keep the originating event alive (`waitUntil`) until the task
//! resolves, otherwise the browser may stop the worker mid-operation.

use crate::config::NotificationDefaults;
use crate::message::WorkerMessage;
use crate::payload::{NotificationPayload, PushData};
use crate::platform::{HostError, WorkerHost};
use crate::routing::{route_click, ClickAction};
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Worker host call failed: {0}")]
    Host(#[from] HostError),
}

/// Work the host must wait on before the event is considered complete.
pub type EventTask = LocalBoxFuture<'static, Result<(), PipelineError>>;

pub struct PushEventPipeline<H: WorkerHost> {
    host: Arc<H>,
    defaults: Arc<NotificationDefaults>,
    default_click_url: Arc<str>,
}

impl<H: WorkerHost> Clone for PushEventPipeline<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            defaults: Arc::clone(&self.defaults),
            default_click_url: Arc::clone(&self.default_click_url),
        }
    }
}

impl<H: WorkerHost + 'static> PushEventPipeline<H> {
    pub fn new(host: Arc<H>, defaults: NotificationDefaults, default_click_url: &str) -> Self {
        Self {
            host,
            defaults: Arc::new(defaults),
            default_click_url: Arc::from(default_click_url),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Decode the payload and show it. Completes when the notification is shown.
    pub fn on_push(&self, data: Option<PushData>) -> EventTask {
        let payload = NotificationPayload::decode(data.as_ref(), &self.defaults);
        tracing::debug!(
            "push received: tag={} shape={:?}",
            payload.tag,
            payload.shape
        );

        let host = Arc::clone(&self.host);
        async move {
            host.show_notification(&payload).await?;
            Ok(())
        }
        .boxed_local()
    }

    /// Close the clicked notification, then focus an open window or open one.
    pub fn on_notification_click(&self, notification: H::Notification) -> EventTask {
        self.host.close_notification(&notification);
        let data_url = self.host.notification_url(&notification);

        let host = Arc::clone(&self.host);
        let default_url = Arc::clone(&self.default_click_url);
        async move {
            let clients = host.window_clients().await?;
            let action = route_click(
                clients,
                host.can_open_window(),
                data_url.as_deref(),
                &default_url,
            );

            match action {
                ClickAction::Focus(client) => {
                    tracing::debug!("notification click: focusing existing window");
                    host.focus(client).await?;
                }
                ClickAction::Open(url) => {
                    tracing::debug!("notification click: opening {}", url);
                    host.open_window(&url).await?;
                }
                ClickAction::Ignore => {
                    tracing::debug!("notification click: no window and openWindow unavailable");
                }
            }
            Ok(())
        }
        .boxed_local()
    }

    /// Handle a message posted to the worker. Only skip-waiting produces work.
    pub fn on_message(&self, message: &Value) -> Option<EventTask> {
        match WorkerMessage::from_value(message)? {
            WorkerMessage::SkipWaiting => {
                tracing::info!("skip-waiting requested, activating new worker");
                let host = Arc::clone(&self.host);
                Some(
                    async move {
                        host.skip_waiting().await?;
                        Ok(())
                    }
                    .boxed_local(),
                )
            }
        }
    }
}
