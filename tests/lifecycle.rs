//! Lifecycle controller integration tests

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use secrecy::ExposeSecret;
use wake_listener::{Error, ServiceState};

mod common;
use common::{Harness, harness, key};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

async fn state(h: &Harness) -> ServiceState {
    h.handle.state().await.unwrap()
}

#[tokio::test]
async fn save_start_detect_stop_scenario() {
    let h = harness();
    let mut events = h.bridge.subscribe();

    assert!(h.bridge.save_credential(&key("K1")).ok);
    assert!(h.bridge.start(key("K1")).await.ok);
    assert!(h.bridge.is_running().await);
    assert!(h.wake.is_held());
    assert!(h.indicator.is_visible());

    assert!(h.engine.fire());
    let event = events.next().await.unwrap();
    assert_eq!(event.keyword_index, 0);
    assert!(h.bridge.was_launched_by_detection().await);
    assert_eq!(h.activator.count(), 1);

    assert!(h.bridge.stop().await.ok);
    assert_eq!(state(&h).await, ServiceState::Stopped);
    assert!(!h.settings.enabled().unwrap());
    assert!(h.presence_released());
    assert_eq!(h.engine.disposes(), 1);
}

#[tokio::test]
async fn successful_start_persists_intent_and_credential() {
    let h = harness();

    h.handle.start(key("K1")).await.unwrap();

    let snapshot = h.settings.snapshot().unwrap();
    assert!(snapshot.enabled);
    assert_eq!(snapshot.credential.expose_secret(), "K1");
}

#[tokio::test]
async fn engine_failure_faults_without_touching_intent() {
    let h = harness();
    h.settings.set_enabled(true).unwrap();
    h.engine.fail_init.store(true, Ordering::SeqCst);

    let err = h.handle.start(key("K1")).await.unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
    assert_eq!(state(&h).await, ServiceState::Faulted);
    assert!(h.presence_released());
    assert!(h.settings.enabled().unwrap());
    assert!(!h.bridge.is_running().await);
}

#[tokio::test]
async fn start_failure_after_init_disposes_engine() {
    let h = harness();
    h.engine.fail_start.store(true, Ordering::SeqCst);

    let result = h.bridge.start(key("K1")).await;
    assert!(!result.ok);
    assert_eq!(result.reason.as_deref(), Some("engine_unavailable"));
    assert_eq!(state(&h).await, ServiceState::Faulted);
    assert_eq!(h.engine.disposes(), 1);
    assert!(h.presence_released());
    assert!(!h.settings.enabled().unwrap());
}

#[tokio::test]
async fn presence_denial_faults_the_start() {
    let h = harness();
    h.wake.deny.store(true, Ordering::SeqCst);

    let result = h.bridge.start(key("K1")).await;
    assert_eq!(result.reason.as_deref(), Some("presence_denied"));
    assert_eq!(state(&h).await, ServiceState::Faulted);
    assert_eq!(h.engine.inits(), 0);
    assert_eq!(h.indicator.shown.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn faulted_is_not_sticky() {
    let h = harness();
    h.engine.fail_init.store(true, Ordering::SeqCst);
    assert!(h.handle.start(key("K1")).await.is_err());

    h.engine.fail_init.store(false, Ordering::SeqCst);
    h.handle.start(key("K1")).await.unwrap();
    assert_eq!(state(&h).await, ServiceState::Listening);
}

#[tokio::test]
async fn empty_credential_never_changes_intent() {
    for enabled in [false, true] {
        let h = harness();
        h.settings.set_enabled(enabled).unwrap();

        let err = h.handle.start(key("")).await.unwrap_err();
        assert!(matches!(err, Error::EmptyCredential));
        assert_eq!(state(&h).await, ServiceState::Stopped);
        assert_eq!(h.settings.enabled().unwrap(), enabled);
        assert_eq!(h.wake.acquired.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn empty_credential_while_listening_keeps_listening() {
    let h = harness();
    h.handle.start(key("K1")).await.unwrap();

    let result = h.bridge.start(key("  ")).await;
    assert_eq!(result.reason.as_deref(), Some("empty_credential"));
    assert_eq!(state(&h).await, ServiceState::Listening);
}

#[tokio::test]
async fn activation_flag_is_read_and_clear() {
    let h = harness();
    assert!(!h.bridge.was_launched_by_detection().await);

    h.handle.start(key("K1")).await.unwrap();
    h.engine.fire();
    h.engine.fire();

    assert!(h.bridge.was_launched_by_detection().await);
    assert!(!h.bridge.was_launched_by_detection().await);

    h.engine.fire();
    assert!(h.bridge.was_launched_by_detection().await);
}

#[tokio::test]
async fn one_event_per_callback() {
    let h = harness();
    let mut events = h.bridge.subscribe();
    h.handle.start(key("K1")).await.unwrap();

    for _ in 0..3 {
        assert!(h.engine.fire());
    }

    for _ in 0..3 {
        assert!(events.next().await.is_some());
    }
    // State query is processed after every queued detection
    state(&h).await;
    assert!(events.next().now_or_never().is_none());
    assert_eq!(h.activator.count(), 3);
}

#[tokio::test]
async fn no_event_after_stop() {
    let h = harness();
    let mut events = h.bridge.subscribe();
    h.handle.start(key("K1")).await.unwrap();
    let late = h.engine.callback().unwrap();

    h.handle.stop().await.unwrap();
    late(0);

    assert_eq!(state(&h).await, ServiceState::Stopped);
    assert!(events.next().now_or_never().is_none());
    assert_eq!(h.activator.count(), 0);
    assert!(!h.bridge.was_launched_by_detection().await);
}

#[tokio::test]
async fn stale_session_detection_is_dropped() {
    let h = harness();
    let mut events = h.bridge.subscribe();
    h.handle.start(key("K1")).await.unwrap();
    let stale = h.engine.callback().unwrap();

    h.handle.start(key("K2")).await.unwrap();
    assert_eq!(h.engine.inits(), 2);
    assert_eq!(h.engine.disposes(), 1);

    stale(0);
    state(&h).await;
    assert!(events.next().now_or_never().is_none());

    h.engine.fire();
    assert!(events.next().await.is_some());
    assert_eq!(h.settings.credential().unwrap().expose_secret(), "K2");
}

#[tokio::test]
async fn restart_with_same_credential_is_noop() {
    let h = harness();
    h.handle.start(key("K1")).await.unwrap();
    h.handle.start(key("K1")).await.unwrap();

    assert_eq!(h.engine.inits(), 1);
    assert_eq!(h.wake.acquired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn indicator_stop_action_routes_through_controller() {
    let h = harness();
    h.handle.start(key("K1")).await.unwrap();

    assert!(h.indicator.press_stop());

    assert_eq!(state(&h).await, ServiceState::Stopped);
    assert!(!h.settings.enabled().unwrap());
    assert!(h.presence_released());
}

#[tokio::test]
async fn stop_during_starting_waits_for_start() {
    let h = harness();
    h.engine.hold_init.store(true, Ordering::SeqCst);

    let starter = h.handle.clone();
    let start = tokio::spawn(async move { starter.start(key("K1")).await });
    wait_until(|| h.engine.init_entered.load(Ordering::SeqCst)).await;

    let stopper = h.handle.clone();
    let stop = tokio::spawn(async move { stopper.stop().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!start.is_finished());
    assert!(!stop.is_finished());

    h.engine.hold_init.store(false, Ordering::SeqCst);
    start.await.unwrap().unwrap();
    stop.await.unwrap().unwrap();

    assert_eq!(state(&h).await, ServiceState::Stopped);
    assert_eq!(h.engine.disposes(), 1);
    assert!(h.presence_released());
    assert!(!h.settings.enabled().unwrap());
}

#[tokio::test]
async fn start_during_stopping_waits_for_teardown() {
    let h = harness();
    h.handle.start(key("K1")).await.unwrap();
    h.engine.hold_dispose.store(true, Ordering::SeqCst);

    let stopper = h.handle.clone();
    let stop = tokio::spawn(async move { stopper.stop().await });
    wait_until(|| h.engine.dispose_entered.load(Ordering::SeqCst)).await;

    let starter = h.handle.clone();
    let start = tokio::spawn(async move { starter.start(key("K2")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!stop.is_finished());
    assert!(!start.is_finished());
    assert_eq!(h.engine.inits(), 1);

    h.engine.hold_dispose.store(false, Ordering::SeqCst);
    stop.await.unwrap().unwrap();
    start.await.unwrap().unwrap();

    assert_eq!(state(&h).await, ServiceState::Listening);
    assert_eq!(h.engine.inits(), 2);
    assert_eq!(h.engine.disposes(), 1);
    assert!(h.wake.max_held.load(Ordering::SeqCst) <= 1);
    assert!(h.wake.is_held());
    assert!(h.settings.enabled().unwrap());
    assert_eq!(h.settings.credential().unwrap().expose_secret(), "K2");
}

#[tokio::test]
async fn stop_when_stopped_still_persists_intent() {
    let h = harness();
    h.settings.set_enabled(true).unwrap();

    h.handle.stop().await.unwrap();
    assert_eq!(state(&h).await, ServiceState::Stopped);
    assert!(!h.settings.enabled().unwrap());
}

#[tokio::test]
async fn final_state_follows_last_accepted_command() {
    // (command, init fails) sequences; true = start, false = stop
    let sequences: &[&[(bool, bool)]] = &[
        &[(true, false)],
        &[(true, false), (false, false)],
        &[(true, true)],
        &[(true, false), (true, true)],
        &[(true, true), (true, false)],
        &[(false, false), (true, false), (false, false), (true, false)],
        &[(true, false), (false, false), (false, false)],
        &[(true, true), (false, false)],
    ];

    for sequence in sequences {
        let h = harness();
        let mut expected = ServiceState::Stopped;

        for (i, &(is_start, fail)) in sequence.iter().enumerate() {
            h.engine.fail_init.store(fail, Ordering::SeqCst);
            if is_start {
                // Vary the credential so every start really restarts
                let result = h.handle.start(key(&format!("K{i}"))).await;
                expected = if result.is_ok() {
                    ServiceState::Listening
                } else {
                    ServiceState::Faulted
                };
            } else {
                h.handle.stop().await.unwrap();
                expected = ServiceState::Stopped;
            }
        }

        assert_eq!(state(&h).await, expected, "sequence {sequence:?}");
        assert!(h.wake.max_held.load(Ordering::SeqCst) <= 1);
        assert_eq!(h.wake.is_held(), expected == ServiceState::Listening);
    }
}

#[tokio::test]
async fn shutdown_releases_presence() {
    let h = harness();
    h.handle.start(key("K1")).await.unwrap();

    let Harness {
        controller,
        wake,
        indicator,
        settings,
        handle,
        ..
    } = h;
    tokio::task::spawn_blocking(move || controller.shutdown())
        .await
        .unwrap();

    assert!(!wake.is_held());
    assert!(!indicator.is_visible());
    assert!(settings.enabled().unwrap());
    assert!(!handle.is_running().await.unwrap_or(false));
}
