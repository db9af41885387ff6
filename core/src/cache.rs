//! Runtime cache for third-party scripts
//!
//! Matching requests are served cache-first. The cache is bounded by an entry
//! count; the least recently used entries are evicted first.

use crate::config::RuntimeCacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCacheRoute {
    pub cache_name: String,
    pub url_prefix: String,
}

impl RuntimeCacheRoute {
    pub fn from_config(config: &RuntimeCacheConfig) -> Self {
        Self {
            cache_name: config.cache_name.clone(),
            url_prefix: config.url_prefix.clone(),
        }
    }

    /// The request URL is under the prefix and names something past it.
    pub fn matches(&self, url: &str) -> bool {
        url.strip_prefix(&self.url_prefix)
            .is_some_and(|rest| !rest.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationPolicy {
    pub max_entries: usize,
}

impl ExpirationPolicy {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
        }
    }
}

/// Tracks which URLs are cached, in least-recently-used order.
#[derive(Debug, Clone)]
pub struct RuntimeCacheIndex {
    policy: ExpirationPolicy,
    entries: VecDeque<String>,
}

impl RuntimeCacheIndex {
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self {
            policy,
            entries: VecDeque::with_capacity(policy.max_entries),
        }
    }

    /// Record a use of `url` (hit or fresh insert). Returns the URLs that
    /// must now be deleted from the cache.
    pub fn record(&mut self, url: &str) -> Vec<String> {
        if let Some(pos) = self.entries.iter().position(|u| u == url) {
            if let Some(existing) = self.entries.remove(pos) {
                self.entries.push_back(existing);
            }
            return Vec::new();
        }

        self.entries.push_back(url.to_string());

        let overflow = self.entries.len().saturating_sub(self.policy.max_entries);
        let evicted: Vec<String> = self.entries.drain(..overflow).collect();
        if !evicted.is_empty() {
            tracing::debug!("runtime cache evicting {} entries", evicted.len());
        }
        evicted
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.iter().any(|u| u == url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }
}
