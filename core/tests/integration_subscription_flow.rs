// Integration test for the subscribe/unsubscribe state machine
//
// Drives a SubscriptionController against an in-memory push manager and
// backend, covering the gating rules that keep transitions from overlapping.

mod common;

use common::{Backend, PushManager, VAPID_KEY};
use std::sync::Arc;
use swpush_core::{
    ApplicationServerKey, Capability, CapabilityReport, ClientConfig, SubscriptionController,
    SubscriptionError, SubscriptionJson, SubscriptionState,
};

fn controller(
    push: PushManager,
    backend: Backend,
) -> (
    SubscriptionController<PushManager, Backend>,
    Arc<PushManager>,
    Arc<Backend>,
) {
    let push = Arc::new(push);
    let backend = Arc::new(backend);
    let key = ApplicationServerKey::from_url_safe(VAPID_KEY).unwrap();
    let controller = SubscriptionController::new(Arc::clone(&push), Arc::clone(&backend), key);
    (controller, push, backend)
}

#[tokio::test]
async fn test_full_subscribe_unsubscribe_cycle() {
    let (c, push, backend) = controller(PushManager::default(), Backend::returning(201));

    assert_eq!(c.init().await, Ok(SubscriptionState::Ready));
    assert_eq!(c.subscribe().await, Ok(SubscriptionState::Subscribed));

    // The backend receives the raw subscription JSON.
    let posted = backend.posts.lock()[0].clone();
    let parsed = SubscriptionJson::from_json(&posted).unwrap();
    assert_eq!(parsed, common::sample_subscription());
    assert!(parsed.validate().is_ok());

    assert_eq!(c.unsubscribe().await, Ok(SubscriptionState::Ready));
    assert_eq!(*push.unsubscribe_calls.lock(), 1);
    assert!(push.stored.lock().is_none());

    // Steady states can be cycled again.
    assert_eq!(c.subscribe().await, Ok(SubscriptionState::Subscribed));
    assert_eq!(backend.post_count(), 2);
}

#[tokio::test]
async fn test_second_subscribe_while_subscribed_does_not_post() {
    let (c, push, backend) = controller(PushManager::default(), Backend::returning(201));
    c.init().await.unwrap();

    c.subscribe().await.unwrap();
    assert_eq!(c.subscribe().await, Ok(SubscriptionState::Subscribed));

    assert_eq!(backend.post_count(), 1);
    assert_eq!(*push.subscribe_calls.lock(), 1);
}

#[tokio::test]
async fn test_second_subscribe_while_subscribing_does_not_post() {
    let (backend, release) = Backend::gated(201);
    let (c, push, backend) = controller(PushManager::default(), backend);
    c.init().await.unwrap();

    let first = c.subscribe();
    let second = async {
        // Runs while the first call is parked on the backend.
        let state = c.state();
        let result = c.subscribe().await;
        let unsub = c.unsubscribe().await;
        release.send(()).unwrap();
        (state, result, unsub)
    };

    let (first, (seen, second, unsub)) = futures::join!(first, second);

    assert_eq!(seen, SubscriptionState::Subscribing);
    assert_eq!(second, Ok(SubscriptionState::Subscribing));
    assert_eq!(unsub, Ok(SubscriptionState::Subscribing));
    assert_eq!(first, Ok(SubscriptionState::Subscribed));

    assert_eq!(backend.post_count(), 1);
    assert_eq!(*push.subscribe_calls.lock(), 1);
    assert_eq!(*push.unsubscribe_calls.lock(), 0);
}

#[tokio::test]
async fn test_loading_flag_tracks_in_flight_call() {
    let (backend, release) = Backend::gated(201);
    let (c, _, _) = controller(PushManager::default(), backend);
    c.init().await.unwrap();
    assert!(!c.is_loading());

    let observer = async {
        let during = c.is_loading();
        release.send(()).unwrap();
        during
    };
    let (result, during) = futures::join!(c.subscribe(), observer);

    assert!(during);
    assert!(result.is_ok());
    assert!(!c.is_loading());
}

#[tokio::test]
async fn test_unsubscribe_without_subscription_makes_no_calls() {
    let (c, push, backend) = controller(PushManager::default(), Backend::returning(201));
    c.init().await.unwrap();

    assert_eq!(c.unsubscribe().await, Ok(SubscriptionState::Ready));
    assert_eq!(*push.unsubscribe_calls.lock(), 0);
    assert_eq!(backend.post_count(), 0);
}

#[tokio::test]
async fn test_backend_failure_allows_manual_retry() {
    let (c, _, backend) = controller(PushManager::default(), Backend::returning(400));
    c.init().await.unwrap();

    assert_eq!(
        c.subscribe().await,
        Err(SubscriptionError::Rejected { status: 400 })
    );
    assert_eq!(c.state(), SubscriptionState::Ready);

    // Nothing retried on its own; a second user action posts again.
    assert_eq!(backend.post_count(), 1);
    let _ = c.subscribe().await;
    assert_eq!(backend.post_count(), 2);
}

#[tokio::test]
async fn test_unsupported_is_monotonic() {
    for missing in [
        CapabilityReport {
            service_worker: Capability::Missing,
            ..CapabilityReport::all_available()
        },
        CapabilityReport {
            push_manager: Capability::Unknown,
            ..CapabilityReport::all_available()
        },
    ] {
        let (c, _, backend) = controller(
            PushManager {
                report: Some(missing),
                ..Default::default()
            },
            Backend::returning(201),
        );

        assert!(c.init().await.is_err());
        for _ in 0..3 {
            let _ = c.init().await;
            let _ = c.subscribe().await;
            let _ = c.unsubscribe().await;
            assert_eq!(c.state(), SubscriptionState::Unsupported);
        }
        assert_eq!(backend.post_count(), 0);
    }
}

#[tokio::test]
async fn test_controller_built_from_config() {
    let config = ClientConfig::with_vapid_key(VAPID_KEY);
    config.validate().unwrap();

    let key = config.application_server_key().unwrap();
    let c = SubscriptionController::new(
        Arc::new(PushManager::default()),
        Arc::new(Backend::returning(201)),
        key,
    );
    c.init().await.unwrap();
    assert_eq!(c.subscribe().await, Ok(SubscriptionState::Subscribed));
}
