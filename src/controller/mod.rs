//! Service lifecycle controller
//!
//! Owns the [`ServiceState`], the detector adapter, and the presence handle.
//! Every mutation runs on one dedicated thread that drains a request queue:
//! UI commands, the indicator's stop action, and engine detection callbacks
//! all enqueue messages and never touch state themselves. Because the queue
//! is processed in order, a stop issued while a start is in flight runs once
//! that start finishes, and a start issued during teardown waits for
//! `Stopped`.

mod state;

use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, oneshot};

use crate::engine::{DEFAULT_KEYWORD, DetectorAdapter, DetectorEngine, EngineConfig};
use crate::platform::{HostActivator, TracingActivator};
use crate::presence::{PresenceHandle, PresenceManager, StopAction};
use crate::settings::{SettingsStore, mask};
use crate::{Error, Result};

pub use state::{DetectionEvent, EventBus, NullEventBus, ServiceState};

enum Request {
    Start {
        credential: SecretString,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    State {
        reply: oneshot::Sender<ServiceState>,
    },
    TakeActivation {
        reply: oneshot::Sender<bool>,
    },
    Detected {
        session: u64,
        keyword_index: u32,
        at: DateTime<Utc>,
    },
    Shutdown,
}

/// Builds and spawns the controller thread
pub struct ControllerBuilder {
    engine: Arc<dyn DetectorEngine>,
    presence: PresenceManager,
    settings: SettingsStore,
    keyword: String,
    activator: Arc<dyn HostActivator>,
    events: Arc<dyn EventBus>,
}

impl ControllerBuilder {
    /// Start from the three required collaborators
    #[must_use]
    pub fn new(
        engine: Arc<dyn DetectorEngine>,
        presence: PresenceManager,
        settings: SettingsStore,
    ) -> Self {
        Self {
            engine,
            presence,
            settings,
            keyword: DEFAULT_KEYWORD.to_string(),
            activator: Arc::new(TracingActivator),
            events: Arc::new(NullEventBus),
        }
    }

    /// Keyword selector for the engine
    #[must_use]
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    /// Receiver of the "bring host forward" side effect
    #[must_use]
    pub fn activator(mut self, activator: Arc<dyn HostActivator>) -> Self {
        self.activator = activator;
        self
    }

    /// Where detection events go
    #[must_use]
    pub fn event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Spawn the controller thread in state `Stopped`
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn(self) -> Result<LifecycleController> {
        let (tx, rx) = mpsc::unbounded_channel();
        let requests = tx.downgrade();

        // Sessions are not `Send`, so the controller is built on its own thread
        let thread = std::thread::Builder::new()
            .name("wake-controller".to_string())
            .spawn(move || {
                let controller = Controller {
                    engine: self.engine,
                    presence: self.presence,
                    settings: self.settings,
                    keyword: self.keyword,
                    activator: self.activator,
                    events: self.events,
                    requests,
                    state: ServiceState::Stopped,
                    session: None,
                    generation: 0,
                    activated: false,
                };
                controller.run(rx);
            })?;

        tracing::debug!("lifecycle controller started");

        Ok(LifecycleController {
            handle: ControllerHandle { tx },
            thread: Some(thread),
        })
    }
}

/// Owner of the controller thread
///
/// Dropping it (or calling [`shutdown`](Self::shutdown)) tears down any
/// active session synchronously without touching persisted intent.
pub struct LifecycleController {
    handle: ControllerHandle,
    thread: Option<JoinHandle<()>>,
}

impl LifecycleController {
    /// A cloneable command handle
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Tear down and wait for the controller thread to exit
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(Request::Shutdown);
        if thread.join().is_err() {
            tracing::error!("lifecycle controller thread panicked");
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.join();
    }
}

/// Command entry point into the controller
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl ControllerHandle {
    /// Start listening with `credential`
    ///
    /// # Errors
    ///
    /// Returns `EmptyCredential` without a state change for a blank
    /// credential, or the engine/presence error that faulted the start
    pub async fn start(&self, credential: SecretString) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Start { credential, reply })?;
        rx.await.map_err(|_| Error::ControllerGone)?
    }

    /// Stop listening and persist `enabled=false`
    ///
    /// # Errors
    ///
    /// Returns `ControllerGone` if the controller has exited
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Stop { reply: Some(reply) })?;
        rx.await.map_err(|_| Error::ControllerGone)?
    }

    /// Current state, after every earlier request has been processed
    ///
    /// # Errors
    ///
    /// Returns `ControllerGone` if the controller has exited
    pub async fn state(&self) -> Result<ServiceState> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::State { reply })?;
        rx.await.map_err(|_| Error::ControllerGone)
    }

    /// Whether the listener is in `Listening`
    ///
    /// # Errors
    ///
    /// Returns `ControllerGone` if the controller has exited
    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.state().await?.is_listening())
    }

    /// Read and clear the activation flag
    ///
    /// # Errors
    ///
    /// Returns `ControllerGone` if the controller has exited
    pub async fn take_activation(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::TakeActivation { reply })?;
        rx.await.map_err(|_| Error::ControllerGone)
    }

    /// Queue a stop without waiting for it
    pub fn request_stop(&self) {
        let _ = self.tx.send(Request::Stop { reply: None });
    }

    fn send(&self, request: Request) -> Result<()> {
        self.tx.send(request).map_err(|_| Error::ControllerGone)
    }
}

struct Session {
    adapter: DetectorAdapter,
    presence: PresenceHandle,
    credential: SecretString,
    id: u64,
}

struct Controller {
    engine: Arc<dyn DetectorEngine>,
    presence: PresenceManager,
    settings: SettingsStore,
    keyword: String,
    activator: Arc<dyn HostActivator>,
    events: Arc<dyn EventBus>,
    requests: mpsc::WeakUnboundedSender<Request>,
    state: ServiceState,
    session: Option<Session>,
    generation: u64,
    activated: bool,
}

impl Controller {
    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        while let Some(request) = rx.blocking_recv() {
            match request {
                Request::Start { credential, reply } => {
                    let _ = reply.send(self.start(&credential));
                }
                Request::Stop { reply } => {
                    self.stop();
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(()));
                    }
                }
                Request::State { reply } => {
                    let _ = reply.send(self.state);
                }
                Request::TakeActivation { reply } => {
                    let _ = reply.send(std::mem::take(&mut self.activated));
                }
                Request::Detected {
                    session,
                    keyword_index,
                    at,
                } => self.on_detected(session, keyword_index, at),
                Request::Shutdown => break,
            }
        }

        self.shutdown();
        tracing::debug!("lifecycle controller exited");
    }

    fn transition(&mut self, to: ServiceState) {
        tracing::info!(from = %self.state, to = %to, "state transition");
        self.state = to;
    }

    fn start(&mut self, credential: &SecretString) -> Result<()> {
        if credential.expose_secret().trim().is_empty() {
            tracing::warn!(state = %self.state, "start rejected: empty credential");
            return Err(Error::EmptyCredential);
        }

        if let Some(session) = &self.session {
            if session.credential.expose_secret() == credential.expose_secret() {
                tracing::debug!("already listening with this credential");
                return Ok(());
            }
        }

        if let Some(session) = self.session.take() {
            tracing::info!("credential changed, restarting listener");
            self.teardown(session);
        }

        tracing::info!(credential = %mask(credential), "starting listener");
        self.transition(ServiceState::Starting);

        match self.bring_up(credential) {
            Ok(session) => {
                self.session = Some(session);
                self.transition(ServiceState::Listening);
                if let Err(e) = self.settings.set_enabled(true) {
                    tracing::warn!(error = %e, "failed to persist enabled flag");
                }
                if let Err(e) = self.settings.set_credential(credential) {
                    tracing::warn!(error = %e, "failed to persist credential");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "listener failed to start");
                self.transition(ServiceState::Faulted);
                Err(e)
            }
        }
    }

    /// Acquire presence, then initialize and start the engine. Anything
    /// acquired is released again if a later step fails.
    fn bring_up(&mut self, credential: &SecretString) -> Result<Session> {
        let requests = self.requests.clone();
        let on_stop: StopAction = Arc::new(move || {
            if let Some(tx) = requests.upgrade() {
                let _ = tx.send(Request::Stop { reply: None });
            }
        });
        let presence = self.presence.acquire(on_stop)?;

        let config = EngineConfig::new(credential.clone(), self.keyword.clone());
        let mut adapter = DetectorAdapter::initialize(self.engine.as_ref(), &config)?;

        self.generation += 1;
        let id = self.generation;
        let requests = self.requests.clone();
        adapter.start(Arc::new(move |keyword_index| {
            let at = Utc::now();
            if let Some(tx) = requests.upgrade() {
                let _ = tx.send(Request::Detected {
                    session: id,
                    keyword_index,
                    at,
                });
            }
        }))?;

        Ok(Session {
            adapter,
            presence,
            credential: credential.clone(),
            id,
        })
    }

    fn teardown(&mut self, session: Session) {
        self.transition(ServiceState::Stopping);

        let Session {
            mut adapter,
            presence,
            ..
        } = session;
        adapter.stop();
        adapter.dispose();
        drop(adapter);
        self.presence.release(presence);

        self.transition(ServiceState::Stopped);
    }

    fn stop(&mut self) {
        match self.session.take() {
            Some(session) => self.teardown(session),
            None if self.state == ServiceState::Stopped => {
                tracing::debug!("stop requested while already stopped");
            }
            None => self.transition(ServiceState::Stopped),
        }

        if let Err(e) = self.settings.set_enabled(false) {
            tracing::warn!(error = %e, "failed to persist enabled flag");
        }
    }

    fn on_detected(&mut self, session: u64, keyword_index: u32, at: DateTime<Utc>) {
        let current = self.session.as_ref().map(|s| s.id);
        if !self.state.is_listening() || current != Some(session) {
            tracing::debug!(
                state = %self.state,
                session,
                "detection dropped, session not listening"
            );
            return;
        }

        tracing::info!(keyword_index, "wake word detected");
        let event = DetectionEvent {
            timestamp: at,
            keyword_index,
        };
        self.activated = true;
        self.activator.bring_to_foreground(&event);
        self.events.deliver(event);
    }

    fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("tearing down listener on shutdown");
            self.teardown(session);
        }
    }
}
