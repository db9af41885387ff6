//! Browser capability probing
//!
//! Push needs three things from the page: the service worker API, the
//! registration's `showNotification`, and `PushManager`. Each is probed
//! separately and the report is composed by logical AND.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of probing a single capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Available,
    Missing,
    /// The probe itself could not run (e.g. no `window`).
    Unknown,
}

impl Capability {
    pub fn from_present(present: bool) -> Self {
        if present {
            Capability::Available
        } else {
            Capability::Missing
        }
    }

    pub fn is_available(self) -> bool {
        self == Capability::Available
    }
}

/// The capabilities push depends on, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    ServiceWorker,
    NotificationDisplay,
    PushManager,
}

impl CapabilityKind {
    pub const PROBE_ORDER: [CapabilityKind; 3] = [
        CapabilityKind::ServiceWorker,
        CapabilityKind::NotificationDisplay,
        CapabilityKind::PushManager,
    ];
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::ServiceWorker => write!(f, "Service workers"),
            CapabilityKind::NotificationDisplay => write!(f, "Notifications"),
            CapabilityKind::PushManager => write!(f, "Push notifications"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub service_worker: Capability,
    pub notification_display: Capability,
    pub push_manager: Capability,
}

impl CapabilityReport {
    pub fn all_available() -> Self {
        Self {
            service_worker: Capability::Available,
            notification_display: Capability::Available,
            push_manager: Capability::Available,
        }
    }

    pub fn get(&self, kind: CapabilityKind) -> Capability {
        match kind {
            CapabilityKind::ServiceWorker => self.service_worker,
            CapabilityKind::NotificationDisplay => self.notification_display,
            CapabilityKind::PushManager => self.push_manager,
        }
    }

    /// First capability in probe order that is not available.
    pub fn first_unavailable(&self) -> Option<CapabilityKind> {
        CapabilityKind::PROBE_ORDER
            .into_iter()
            .find(|kind| !self.get(*kind).is_available())
    }

    pub fn is_supported(&self) -> bool {
        self.first_unavailable().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_available_is_supported() {
        assert!(CapabilityReport::all_available().is_supported());
    }

    #[test]
    fn test_first_unavailable_follows_probe_order() {
        let report = CapabilityReport {
            service_worker: Capability::Available,
            notification_display: Capability::Missing,
            push_manager: Capability::Missing,
        };
        assert_eq!(
            report.first_unavailable(),
            Some(CapabilityKind::NotificationDisplay)
        );
        assert!(!report.is_supported());
    }

    #[test]
    fn test_unknown_counts_as_unavailable() {
        let report = CapabilityReport {
            push_manager: Capability::Unknown,
            ..CapabilityReport::all_available()
        };
        assert_eq!(report.first_unavailable(), Some(CapabilityKind::PushManager));
    }
}
