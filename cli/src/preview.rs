// Offline previews of what the worker would do
//
// Runs the same core decoding and routing the service worker runs, without a
// browser, so payloads and config changes can be checked from a terminal.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use swpush_core::{
    route_click, ApplicationServerKey, ClickAction, ClientConfig, NotificationPayload, PushData,
    SubscriptionJson,
};

/// The notification a push with `data` would show, plus the data attached to it.
pub fn render_payload(data: Option<&str>, config: &ClientConfig) -> Value {
    let data = data.map(PushData::from_text);
    let payload = NotificationPayload::decode(data.as_ref(), &config.notification);
    json!({
        "title": payload.title,
        "options": {
            "body": payload.body,
            "icon": payload.icon,
            "tag": payload.tag,
            "renotify": payload.renotify,
            "data": payload.notification_data(),
        },
        "shape": payload.shape,
    })
}

/// Describe what a notification click does given `windows` open window clients.
pub fn describe_click(
    windows: usize,
    can_open_window: bool,
    url: Option<&str>,
    config: &ClientConfig,
) -> String {
    let clients: Vec<usize> = (0..windows).collect();
    match route_click(clients, can_open_window, url, &config.default_click_url) {
        ClickAction::Focus(index) => format!("focus window #{}", index),
        ClickAction::Open(url) => format!("open {}", url),
        ClickAction::Ignore => "nothing (no window open and openWindow unavailable)".to_string(),
    }
}

pub struct KeyReport {
    pub bytes: Vec<u8>,
    pub uncompressed_p256: bool,
    pub canonical: String,
}

pub fn inspect_key(key: &str) -> Result<KeyReport> {
    let key = ApplicationServerKey::from_url_safe(key).context("Failed to decode VAPID key")?;
    Ok(KeyReport {
        bytes: key.as_bytes().to_vec(),
        uncompressed_p256: key.is_uncompressed_p256(),
        canonical: key.to_url_safe(),
    })
}

/// Parse and shape-check a stored `PushSubscription` JSON document.
pub fn check_subscription(json: &str) -> Result<SubscriptionJson> {
    let subscription =
        SubscriptionJson::from_json(json).context("Not a PushSubscription JSON document")?;
    subscription
        .validate()
        .context("Subscription would be rejected")?;
    Ok(subscription)
}
