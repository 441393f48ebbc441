//! Shared test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use wake_listener::bridge::{Bridge, EventHub};
use wake_listener::controller::{
    ControllerBuilder, ControllerHandle, DetectionEvent, LifecycleController,
};
use wake_listener::engine::{
    DetectionCallback, DetectorEngine, EngineConfig, EngineError, EngineSession,
};
use wake_listener::platform::HostActivator;
use wake_listener::presence::{
    ForegroundIndicator, Notice, PresenceError, PresenceManager, StopAction, WakeResource,
};
use wake_listener::{DbPool, SettingsStore, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Settings store over a fresh in-memory database
#[must_use]
pub fn setup_settings() -> SettingsStore {
    SettingsStore::new(setup_test_db(), "jarvis_prefs")
}

pub fn key(raw: &str) -> SecretString {
    SecretString::from(raw.to_string())
}

/// Shared controls and counters for [`ScriptedEngine`]
#[derive(Default)]
pub struct EngineScript {
    pub fail_init: AtomicBool,
    pub fail_start: AtomicBool,
    pub hold_init: AtomicBool,
    pub init_entered: AtomicBool,
    pub hold_dispose: AtomicBool,
    pub dispose_entered: AtomicBool,
    pub inits: AtomicUsize,
    pub disposes: AtomicUsize,
    current: Mutex<Option<DetectionCallback>>,
}

impl EngineScript {
    /// Invoke the running session's callback; false if nothing is running
    pub fn fire(&self) -> bool {
        let callback = self.current.lock().unwrap().clone();
        match callback {
            Some(callback) => {
                callback(0);
                true
            }
            None => false,
        }
    }

    /// The running session's callback, kept to simulate a late delivery
    pub fn callback(&self) -> Option<DetectionCallback> {
        self.current.lock().unwrap().clone()
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn disposes(&self) -> usize {
        self.disposes.load(Ordering::SeqCst)
    }
}

/// Detector engine driven by the test instead of a microphone
pub struct ScriptedEngine(pub Arc<EngineScript>);

struct ScriptedSession(Arc<EngineScript>);

impl DetectorEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn initialize(&self, _config: &EngineConfig) -> Result<Box<dyn EngineSession>, EngineError> {
        self.0.init_entered.store(true, Ordering::SeqCst);
        while self.0.hold_init.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        if self.0.fail_init.load(Ordering::SeqCst) {
            return Err(EngineError::EngineUnavailable("audio input denied".to_string()));
        }
        self.0.inits.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession(Arc::clone(&self.0))))
    }
}

impl EngineSession for ScriptedSession {
    fn start(&mut self, on_detect: DetectionCallback) -> Result<(), EngineError> {
        if self.0.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::EngineUnavailable("sampling failed".to_string()));
        }
        *self.0.current.lock().unwrap() = Some(on_detect);
        Ok(())
    }

    fn stop(&mut self) {
        self.0.current.lock().unwrap().take();
    }

    fn dispose(&mut self) {
        self.0.dispose_entered.store(true, Ordering::SeqCst);
        while self.0.hold_dispose.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.0.disposes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wake resource counters
#[derive(Default)]
pub struct WakeProbe {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub held: AtomicUsize,
    pub max_held: AtomicUsize,
    pub deny: AtomicBool,
}

impl WakeProbe {
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst) > 0
    }
}

struct ProbeWake(Arc<WakeProbe>);

impl WakeResource for ProbeWake {
    fn acquire(&self) -> Result<(), PresenceError> {
        if self.0.deny.load(Ordering::SeqCst) {
            return Err(PresenceError::WakeDenied("battery saver".to_string()));
        }
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        let held = self.0.held.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_held.fetch_max(held, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
        self.0.held.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Foreground indicator that records visibility and keeps the stop action
#[derive(Default)]
pub struct RecordingIndicator {
    pub shown: AtomicUsize,
    pub dismissed: AtomicUsize,
    on_stop: Mutex<Option<StopAction>>,
}

impl RecordingIndicator {
    pub fn is_visible(&self) -> bool {
        self.on_stop.lock().unwrap().is_some()
    }

    /// Press the indicator's Stop action
    pub fn press_stop(&self) -> bool {
        let action = self.on_stop.lock().unwrap().clone();
        action.map(|action| action()).is_some()
    }
}

impl ForegroundIndicator for RecordingIndicator {
    fn show(&self, _notice: &Notice, on_stop: StopAction) -> Result<(), PresenceError> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        *self.on_stop.lock().unwrap() = Some(on_stop);
        Ok(())
    }

    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
        self.on_stop.lock().unwrap().take();
    }
}

/// Host activator that records every request
#[derive(Default)]
pub struct RecordingActivator {
    pub events: Mutex<Vec<DetectionEvent>>,
}

impl RecordingActivator {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl HostActivator for RecordingActivator {
    fn bring_to_foreground(&self, event: &DetectionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A controller wired to fakes, plus everything needed to observe it
pub struct Harness {
    pub controller: LifecycleController,
    pub handle: ControllerHandle,
    pub bridge: Bridge,
    pub events: Arc<EventHub>,
    pub settings: SettingsStore,
    pub engine: Arc<EngineScript>,
    pub wake: Arc<WakeProbe>,
    pub indicator: Arc<RecordingIndicator>,
    pub activator: Arc<RecordingActivator>,
}

impl Harness {
    /// Presence fully released: wake resource not held and indicator gone
    pub fn presence_released(&self) -> bool {
        !self.wake.is_held() && !self.indicator.is_visible()
    }
}

#[must_use]
pub fn harness() -> Harness {
    harness_with(setup_settings(), Arc::new(EngineScript::default()))
}

#[must_use]
pub fn harness_with(settings: SettingsStore, engine: Arc<EngineScript>) -> Harness {
    let wake = Arc::new(WakeProbe::default());
    let indicator = Arc::new(RecordingIndicator::default());
    let activator = Arc::new(RecordingActivator::default());
    let events = Arc::new(EventHub::new());

    let presence = PresenceManager::new(Box::new(ProbeWake(Arc::clone(&wake))), indicator.clone());
    let controller = ControllerBuilder::new(
        Arc::new(ScriptedEngine(Arc::clone(&engine))),
        presence,
        settings.clone(),
    )
    .activator(activator.clone())
    .event_bus(events.clone())
    .spawn()
    .expect("failed to spawn controller");

    let handle = controller.handle();
    let bridge = Bridge::new(handle.clone(), settings.clone(), Arc::clone(&events));

    Harness {
        controller,
        handle,
        bridge,
        events,
        settings,
        engine,
        wake,
        indicator,
        activator,
    }
}
