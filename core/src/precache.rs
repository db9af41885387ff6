//! Build-time precache
//!
//! The site build emits a manifest of the files the worker should install
//! with. Each entry is stored under a key that carries its revision, so a new
//! build re-fetches only the files that changed. On activation every cached
//! key that is not in the current manifest is deleted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_PRECACHE_NAME: &str = "swpush-precache";

/// Query parameter that carries the revision in a cache key.
pub const REVISION_PARAM: &str = "__WB_REVISION__";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrecacheError {
    #[error("precache entry has an empty url")]
    EmptyUrl,

    #[error("precache lists {url} twice with different revisions")]
    ConflictingRevision { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    /// Absent for files whose name already changes with their content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: Option<&str>) -> Self {
        Self {
            url: url.into(),
            revision: revision.map(str::to_string),
        }
    }

    /// Relative to the worker's origin.
    pub fn cache_key(&self, origin: &str) -> String {
        let url = absolute(&self.url, origin);
        match &self.revision {
            Some(revision) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!("{}{}{}={}", url, sep, REVISION_PARAM, revision)
            }
            None => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrecacheManifest {
    pub cache_name: String,
    pub entries: Vec<PrecacheEntry>,
}

impl Default for PrecacheManifest {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_PRECACHE_NAME.to_string(),
            entries: Vec::new(),
        }
    }
}

impl PrecacheManifest {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<(), PrecacheError> {
        let mut seen: HashMap<&str, &Option<String>> = HashMap::new();
        for entry in &self.entries {
            if entry.url.is_empty() {
                return Err(PrecacheError::EmptyUrl);
            }
            if let Some(previous) = seen.insert(entry.url.as_str(), &entry.revision) {
                if previous != &entry.revision {
                    return Err(PrecacheError::ConflictingRevision {
                        url: entry.url.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Request URL to cache key, for every entry.
    pub fn routes(&self, origin: &str) -> PrecacheRoutes {
        PrecacheRoutes {
            keys: self
                .entries
                .iter()
                .map(|entry| (absolute(&entry.url, origin), entry.cache_key(origin)))
                .collect(),
        }
    }
}

/// Resolves fetched URLs to precached keys.
#[derive(Debug, Clone, Default)]
pub struct PrecacheRoutes {
    keys: HashMap<String, String>,
}

impl PrecacheRoutes {
    /// Cache key serving `request_url`, trying the URL as requested, then as
    /// a directory index, then with `.html` appended.
    pub fn lookup(&self, request_url: &str) -> Option<&str> {
        let url = request_url.split('#').next().unwrap_or(request_url);
        if let Some(key) = self.keys.get(url) {
            return Some(key.as_str());
        }
        if url.contains('?') {
            return None;
        }
        let fallback = if url.ends_with('/') {
            format!("{}index.html", url)
        } else {
            format!("{}.html", url)
        };
        self.keys.get(&fallback).map(String::as_str)
    }

    /// Whether `key` belongs to the current manifest.
    pub fn is_current(&self, key: &str) -> bool {
        self.keys.values().any(|k| k == key)
    }

    /// Cached keys left over from earlier builds.
    pub fn stale<'a>(&self, cached: &'a [String]) -> Vec<&'a str> {
        cached
            .iter()
            .filter(|key| !self.is_current(key))
            .map(String::as_str)
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(url, key)| (url.as_str(), key.as_str()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn absolute(url: &str, origin: &str) -> String {
    if url.starts_with('/') && !url.starts_with("//") {
        format!("{}{}", origin.trim_end_matches('/'), url)
    } else {
        url.to_string()
    }
}
