//! Client configuration
//!
//! Injected into the page (and the worker) as a JSON object. Every field has a
//! default, so an empty object is a valid config apart from the VAPID key.

use crate::precache::{PrecacheError, PrecacheManifest};
use crate::vapid::{ApplicationServerKey, KeyDecodeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_WORKER_SCRIPT: &str = "/sw.js";
pub const DEFAULT_WORKER_SCOPE: &str = "/";
pub const DEFAULT_SUBSCRIBE_ENDPOINT: &str = "/demo/subscribe";
pub const DEFAULT_CLICK_URL: &str = "/";
pub const DEFAULT_NOTIFICATION_TITLE: &str = "New push message";
pub const DEFAULT_STRUCTURED_ICON: &str =
    "https://raw.githubusercontent.com/twitter/twemoji/master/assets/72x72/1f3c4.png";
pub const DEFAULT_TEXT_ICON: &str =
    "https://raw.githubusercontent.com/twitter/twemoji/master/assets/72x72/1f3ca.png";
pub const DEFAULT_RUNTIME_CACHE_PREFIX: &str = "https://cdn.jsdelivr.net/npm/";
pub const DEFAULT_RUNTIME_CACHE_NAME: &str = "jsdelivr-cache";
pub const DEFAULT_RUNTIME_CACHE_MAX_ENTRIES: usize = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(String),

    #[error("Invalid VAPID public key: {0}")]
    VapidKey(#[from] KeyDecodeError),

    #[error("{field} must be an origin-relative path, got {value:?}")]
    NotOriginRelative { field: &'static str, value: String },

    #[error("defaultClickUrl must be an origin-relative path or an http(s) URL, got {0:?}")]
    InvalidClickUrl(String),

    #[error("runtimeCache.maxEntries must be at least 1")]
    ZeroCacheEntries,

    #[error("Invalid precache manifest: {0}")]
    Precache(#[from] PrecacheError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Server public key, URL-safe base64.
    pub vapid_public_key: String,

    pub worker_script: String,

    pub worker_scope: String,

    /// Where the page POSTs new subscriptions.
    pub subscribe_endpoint: String,

    /// Opened by a notification click when the payload carries no `url`.
    /// Either a path on this origin or an absolute http(s) URL, such as a
    /// landing page on another site.
    pub default_click_url: String,

    pub notification: NotificationDefaults,

    pub runtime_cache: RuntimeCacheConfig,

    /// Files the worker stores on install and serves cache-first.
    pub precache: PrecacheManifest,
}

/// Values layered under every rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationDefaults {
    pub default_title: String,
    /// Icon for JSON payloads.
    pub structured_icon: String,
    /// Icon for plain-text payloads.
    pub text_icon: String,
    pub structured_tag: String,
    pub text_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeCacheConfig {
    pub cache_name: String,
    pub url_prefix: String,
    pub max_entries: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: String::new(),
            worker_script: DEFAULT_WORKER_SCRIPT.to_string(),
            worker_scope: DEFAULT_WORKER_SCOPE.to_string(),
            subscribe_endpoint: DEFAULT_SUBSCRIBE_ENDPOINT.to_string(),
            default_click_url: DEFAULT_CLICK_URL.to_string(),
            notification: NotificationDefaults::default(),
            runtime_cache: RuntimeCacheConfig::default(),
            precache: PrecacheManifest::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            default_title: DEFAULT_NOTIFICATION_TITLE.to_string(),
            structured_icon: DEFAULT_STRUCTURED_ICON.to_string(),
            text_icon: DEFAULT_TEXT_ICON.to_string(),
            structured_tag: "custom".to_string(),
            text_tag: "default".to_string(),
        }
    }
}

impl Default for RuntimeCacheConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_RUNTIME_CACHE_NAME.to_string(),
            url_prefix: DEFAULT_RUNTIME_CACHE_PREFIX.to_string(),
            max_entries: DEFAULT_RUNTIME_CACHE_MAX_ENTRIES,
        }
    }
}

impl ClientConfig {
    pub fn with_vapid_key(vapid_public_key: impl Into<String>) -> Self {
        Self {
            vapid_public_key: vapid_public_key.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn application_server_key(&self) -> Result<ApplicationServerKey, ConfigError> {
        Ok(ApplicationServerKey::from_url_safe(&self.vapid_public_key)?)
    }

    /// Check everything the page needs before any controller is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.application_server_key()?;
        self.validate_paths()
    }

    /// The checks that do not involve the VAPID key. The worker and the
    /// registration bootstrap never use the key.
    pub fn validate_paths(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("workerScript", &self.worker_script),
            ("workerScope", &self.worker_scope),
            ("subscribeEndpoint", &self.subscribe_endpoint),
        ] {
            if !is_origin_relative(value) {
                return Err(ConfigError::NotOriginRelative {
                    field,
                    value: value.clone(),
                });
            }
        }

        let click = &self.default_click_url;
        if !is_origin_relative(click) && !is_absolute_http(click) {
            return Err(ConfigError::InvalidClickUrl(click.clone()));
        }

        if self.runtime_cache.max_entries == 0 {
            return Err(ConfigError::ZeroCacheEntries);
        }
        self.precache.validate()?;
        Ok(())
    }

    /// Set a single field by its JSON name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "vapidPublicKey" => self.vapid_public_key = value.to_string(),
            "workerScript" => self.worker_script = value.to_string(),
            "workerScope" => self.worker_scope = value.to_string(),
            "subscribeEndpoint" => self.subscribe_endpoint = value.to_string(),
            "defaultClickUrl" => self.default_click_url = value.to_string(),
            "notification.defaultTitle" => self.notification.default_title = value.to_string(),
            "notification.structuredIcon" => self.notification.structured_icon = value.to_string(),
            "notification.textIcon" => self.notification.text_icon = value.to_string(),
            "notification.structuredTag" => self.notification.structured_tag = value.to_string(),
            "notification.textTag" => self.notification.text_tag = value.to_string(),
            "runtimeCache.cacheName" => self.runtime_cache.cache_name = value.to_string(),
            "runtimeCache.urlPrefix" => self.runtime_cache.url_prefix = value.to_string(),
            "runtimeCache.maxEntries" => {
                self.runtime_cache.max_entries = value
                    .parse()
                    .map_err(|_| ConfigError::Parse(format!("Invalid number: {}", value)))?;
            }
            "precache.cacheName" => self.precache.cache_name = value.to_string(),
            _ => return Err(ConfigError::Parse(format!("Unknown config key: {}", key))),
        }
        Ok(())
    }

    /// Get a single field by its JSON name.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "vapidPublicKey" => Some(self.vapid_public_key.clone()),
            "workerScript" => Some(self.worker_script.clone()),
            "workerScope" => Some(self.worker_scope.clone()),
            "subscribeEndpoint" => Some(self.subscribe_endpoint.clone()),
            "defaultClickUrl" => Some(self.default_click_url.clone()),
            "notification.defaultTitle" => Some(self.notification.default_title.clone()),
            "notification.structuredIcon" => Some(self.notification.structured_icon.clone()),
            "notification.textIcon" => Some(self.notification.text_icon.clone()),
            "notification.structuredTag" => Some(self.notification.structured_tag.clone()),
            "notification.textTag" => Some(self.notification.text_tag.clone()),
            "runtimeCache.cacheName" => Some(self.runtime_cache.cache_name.clone()),
            "runtimeCache.urlPrefix" => Some(self.runtime_cache.url_prefix.clone()),
            "runtimeCache.maxEntries" => Some(self.runtime_cache.max_entries.to_string()),
            "precache.cacheName" => Some(self.precache.cache_name.clone()),
            _ => None,
        }
    }

    /// All settable keys, in display order.
    pub fn keys() -> &'static [&'static str] {
        &[
            "vapidPublicKey",
            "workerScript",
            "workerScope",
            "subscribeEndpoint",
            "defaultClickUrl",
            "notification.defaultTitle",
            "notification.structuredIcon",
            "notification.textIcon",
            "notification.structuredTag",
            "notification.textTag",
            "runtimeCache.cacheName",
            "runtimeCache.urlPrefix",
            "runtimeCache.maxEntries",
            "precache.cacheName",
        ]
    }
}

fn is_origin_relative(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
}

fn is_absolute_http(url: &str) -> bool {
    ["https://", "http://"].iter().any(|scheme| {
        url.len() > scheme.len()
            && url
                .get(..scheme.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.worker_script, "/sw.js");
        assert_eq!(config.worker_scope, "/");
        assert_eq!(config.subscribe_endpoint, "/demo/subscribe");
        assert_eq!(config.default_click_url, "/");
        assert_eq!(config.notification.structured_tag, "custom");
        assert_eq!(config.notification.text_tag, "default");
        assert_ne!(config.notification.structured_icon, config.notification.text_icon);
        assert_eq!(config.runtime_cache.max_entries, 30);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ClientConfig::from_json(r#"{"vapidPublicKey":"abc","defaultClickUrl":"/news"}"#)
                .unwrap();
        assert_eq!(config.vapid_public_key, "abc");
        assert_eq!(config.default_click_url, "/news");
        assert_eq!(config.worker_script, "/sw.js");
        assert_eq!(config.notification.default_title, "New push message");
    }

    #[test]
    fn test_validate() {
        assert_eq!(ClientConfig::with_vapid_key(KEY).validate(), Ok(()));

        assert!(matches!(
            ClientConfig::default().validate(),
            Err(ConfigError::VapidKey(KeyDecodeError::Empty))
        ));

        let mut config = ClientConfig::with_vapid_key(KEY);
        config.worker_script = "https://cdn.example/sw.js".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotOriginRelative { field: "workerScript", .. })
        ));

        let mut config = ClientConfig::with_vapid_key(KEY);
        config.default_click_url = "//evil.example".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::with_vapid_key(KEY);
        config.runtime_cache.max_entries = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroCacheEntries));
    }

    #[test]
    fn test_validate_paths_ignores_key() {
        assert_eq!(ClientConfig::default().validate_paths(), Ok(()));

        let mut config = ClientConfig::default();
        config.worker_scope = "scope".to_string();
        assert!(config.validate_paths().is_err());
    }

    #[test]
    fn test_click_url_may_be_absolute() {
        let mut config = ClientConfig::default();
        for url in ["/", "/news/latest", "https://example.com/landing", "HTTP://example.com"] {
            config.default_click_url = url.to_string();
            assert_eq!(config.validate_paths(), Ok(()), "{}", url);
        }

        for url in ["landing", "//example.com", "javascript:alert(1)", "https://", ""] {
            config.default_click_url = url.to_string();
            assert_eq!(
                config.validate_paths(),
                Err(ConfigError::InvalidClickUrl(url.to_string())),
                "{}",
                url
            );
        }

        // Only the click target may leave the origin.
        let mut config = ClientConfig::default();
        config.subscribe_endpoint = "https://example.com/subscribe".to_string();
        assert!(matches!(
            config.validate_paths(),
            Err(ConfigError::NotOriginRelative { field: "subscribeEndpoint", .. })
        ));
    }

    #[test]
    fn test_precache_manifest_from_json() {
        let config = ClientConfig::from_json(
            r#"{"precache":{"entries":[{"url":"/index.html","revision":"1"}]}}"#,
        )
        .unwrap();
        assert_eq!(config.precache.cache_name, "swpush-precache");
        assert_eq!(config.precache.entries.len(), 1);
        assert_eq!(config.validate_paths(), Ok(()));

        let config = ClientConfig::from_json(
            r#"{"precache":{"entries":[{"url":"/a.js","revision":"1"},{"url":"/a.js","revision":"2"}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate_paths(),
            Err(ConfigError::Precache(PrecacheError::ConflictingRevision { .. }))
        ));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ClientConfig::default();
        config.set("defaultClickUrl", "/landing").unwrap();
        config.set("runtimeCache.maxEntries", "5").unwrap();
        assert_eq!(config.get("defaultClickUrl").as_deref(), Some("/landing"));
        assert_eq!(config.runtime_cache.max_entries, 5);

        assert!(config.set("runtimeCache.maxEntries", "many").is_err());
        assert!(config.set("nope", "1").is_err());
        assert_eq!(config.get("nope"), None);

        for key in ClientConfig::keys() {
            assert!(config.get(key).is_some(), "missing getter for {}", key);
        }
    }

    #[test]
    fn test_json_roundtrip_uses_camel_case() {
        let json = ClientConfig::with_vapid_key(KEY).to_json_pretty().unwrap();
        assert!(json.contains("\"vapidPublicKey\""));
        assert!(json.contains("\"maxEntries\": 30"));
        assert_eq!(ClientConfig::from_json(&json).unwrap().vapid_public_key, KEY);
    }
}
