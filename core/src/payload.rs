//! Push payload decoding
//!
//! A push message is either a JSON object whose fields are layered over the
//! structured defaults, or anything else, which is shown verbatim as the body
//! under the text defaults. The two paths use different icons and tags so the
//! shapes stay distinguishable on screen.

use crate::config::NotificationDefaults;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw data of one push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushData {
    text: String,
}

impl PushData {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Which decoding path produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    Structured,
    Text,
}

/// Everything needed to render one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    /// Whether a replacement alerts the user again.
    pub renotify: bool,
    /// Click target, stored in the notification's data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub shape: PayloadShape,
}

impl NotificationPayload {
    pub fn decode(data: Option<&PushData>, defaults: &NotificationDefaults) -> Self {
        let Some(data) = data else {
            return Self::text_fallback(None, defaults);
        };

        match serde_json::from_str::<Value>(data.text()) {
            Ok(Value::Object(fields)) => Self::structured(&fields, defaults),
            Ok(_) => {
                tracing::debug!("push payload is JSON but not an object, using text fallback");
                Self::text_fallback(Some(data.text().to_string()), defaults)
            }
            Err(_) => Self::text_fallback(Some(data.text().to_string()), defaults),
        }
    }

    fn structured(fields: &Map<String, Value>, defaults: &NotificationDefaults) -> Self {
        let string = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            title: string("title").unwrap_or_else(|| defaults.default_title.clone()),
            body: fields.get("body").and_then(scalar_text),
            icon: Some(string("icon").unwrap_or_else(|| defaults.structured_icon.clone())),
            tag: string("tag").unwrap_or_else(|| defaults.structured_tag.clone()),
            renotify: fields.get("renotify").and_then(Value::as_bool) != Some(false),
            url: string("url"),
            shape: PayloadShape::Structured,
        }
    }

    fn text_fallback(body: Option<String>, defaults: &NotificationDefaults) -> Self {
        Self {
            title: defaults.default_title.clone(),
            body,
            icon: Some(defaults.text_icon.clone()),
            tag: defaults.text_tag.clone(),
            renotify: true,
            url: None,
            shape: PayloadShape::Text,
        }
    }

    /// The `data` attached to the shown notification.
    pub fn notification_data(&self) -> Value {
        match &self.url {
            Some(url) => serde_json::json!({ "url": url }),
            None => Value::Null,
        }
    }
}

/// Scalars render as the text a notification would show for them.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
