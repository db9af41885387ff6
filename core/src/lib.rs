// swpush core: push subscription and service worker lifecycle
//
// Platform-agnostic state machines for the page context (worker lifecycle,
// subscription) and the worker context (push event pipeline). Browser APIs are
// reached only through the traits in `platform`; the wasm crate provides the
// web-sys implementations.

pub mod cache;
pub mod capability;
pub mod config;
pub mod lifecycle;
pub mod message;
pub mod payload;
pub mod pipeline;
pub mod platform;
pub mod precache;
pub mod routing;
pub mod subscription;
pub mod vapid;

use thiserror::Error;

pub use cache::{ExpirationPolicy, RuntimeCacheIndex, RuntimeCacheRoute};
pub use capability::{Capability, CapabilityKind, CapabilityReport};
pub use config::{ClientConfig, ConfigError, NotificationDefaults, RuntimeCacheConfig};
pub use lifecycle::{
    BootstrapOutcome, LifecycleAction, LifecycleError, LifecycleEvent, RefreshGuard,
    WorkerLifecycleController, WorkerState,
};
pub use message::WorkerMessage;
pub use payload::{NotificationPayload, PayloadShape, PushData};
pub use pipeline::{EventTask, PipelineError, PushEventPipeline};
pub use platform::{
    HostError, PageHost, PushPlatform, SubscribeEndpoint, SubscribeOptions, SubscriptionJson,
    SubscriptionKeys, SubscriptionRecord, SubscriptionShapeError, WorkerHost,
};
pub use precache::{PrecacheEntry, PrecacheError, PrecacheManifest, PrecacheRoutes};
pub use routing::{route_click, ClickAction};
pub use subscription::{SubscriptionController, SubscriptionError, SubscriptionState};
pub use vapid::{decode_vapid_key, ApplicationServerKey, KeyDecodeError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Any failure surfaced by the core, for callers that handle every component
/// through one channel (the wasm boundary, the CLI).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error(transparent)]
    Key(#[from] KeyDecodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl PushError {
    /// Short stable name of the failure class, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PushError::Key(_) => "KeyDecodeFailure",
            PushError::Config(_) => "ConfigInvalid",
            PushError::Lifecycle(_) => "RegistrationFailure",
            PushError::Subscription(SubscriptionError::CapabilityMissing(_)) => "CapabilityMissing",
            PushError::Subscription(SubscriptionError::RegistrationUnavailable(_)) => {
                "RegistrationFailure"
            }
            PushError::Subscription(_) => "SubscriptionRequestFailure",
            PushError::Pipeline(_) => "WorkerHostFailure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err: PushError = SubscriptionError::Rejected { status: 500 }.into();
        assert_eq!(err.kind(), "SubscriptionRequestFailure");

        let err: PushError =
            SubscriptionError::CapabilityMissing(CapabilityKind::PushManager).into();
        assert_eq!(err.kind(), "CapabilityMissing");

        let err: PushError = LifecycleError::Registration("boom".to_string()).into();
        assert_eq!(err.kind(), "RegistrationFailure");
        assert_eq!(err.to_string(), "Service worker registration failed: boom");
    }
}
