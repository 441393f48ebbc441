//! Control & event bridge
//!
//! The command surface the UI talks to, plus a single-subscriber event stream
//! of detections. A new subscription replaces the previous one; events that
//! arrive with nobody subscribed are dropped.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::Result;
use crate::controller::{ControllerHandle, DetectionEvent, EventBus, ServiceState};
use crate::settings::SettingsStore;

/// Outcome of a bridge command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded
    pub ok: bool,
    /// Machine-readable failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandResult {
    /// Successful result
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    /// Failed result with a reason
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

impl From<Result<()>> for CommandResult {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.reason()),
        }
    }
}

/// Listener status as seen by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Controller state
    pub state: ServiceState,
    /// Persisted user intent
    pub enabled: bool,
}

/// Single-slot subscriber registry
#[derive(Debug, Default)]
pub struct EventHub {
    slot: Mutex<Option<(u64, mpsc::UnboundedSender<DetectionEvent>)>>,
    next_id: AtomicU64,
}

impl EventHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber, replacing (and ending) any previous one
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((id, tx));
        if previous.is_some() {
            tracing::info!(subscriber = id, "event subscriber replaced");
        } else {
            tracing::debug!(subscriber = id, "event subscriber attached");
        }

        EventSubscription {
            id,
            hub: Arc::clone(self),
            stream: UnboundedReceiverStream::new(rx),
        }
    }

    /// Whether a subscriber is attached
    #[must_use]
    pub fn has_subscriber(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn unsubscribe(&self, id: u64) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
            tracing::debug!(subscriber = id, "event subscriber detached");
        }
    }
}

impl EventBus for EventHub {
    fn deliver(&self, event: DetectionEvent) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((id, tx)) = slot.as_ref() else {
            tracing::debug!("no event subscriber, detection dropped");
            return;
        };
        if tx.send(event).is_err() {
            tracing::debug!(subscriber = id, "event subscriber gone, detection dropped");
            *slot = None;
        }
    }
}

/// Stream of detection events for the active subscriber
///
/// Ends when another subscription replaces this one.
pub struct EventSubscription {
    id: u64,
    hub: Arc<EventHub>,
    stream: UnboundedReceiverStream<DetectionEvent>,
}

impl Stream for EventSubscription {
    type Item = DetectionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

/// UI-facing command and event API
#[derive(Clone)]
pub struct Bridge {
    controller: ControllerHandle,
    settings: SettingsStore,
    events: Arc<EventHub>,
}

impl Bridge {
    /// Create a bridge over a running controller
    #[must_use]
    pub const fn new(
        controller: ControllerHandle,
        settings: SettingsStore,
        events: Arc<EventHub>,
    ) -> Self {
        Self {
            controller,
            settings,
            events,
        }
    }

    /// Start listening
    pub async fn start(&self, credential: SecretString) -> CommandResult {
        self.controller.start(credential).await.into()
    }

    /// Stop listening
    pub async fn stop(&self) -> CommandResult {
        self.controller.stop().await.into()
    }

    /// Whether the listener is in `Listening`
    pub async fn is_running(&self) -> bool {
        self.controller.is_running().await.unwrap_or(false)
    }

    /// Persist the credential without starting
    pub fn save_credential(&self, credential: &SecretString) -> CommandResult {
        self.settings.set_credential(credential).into()
    }

    /// Read and clear the activation flag
    pub async fn was_launched_by_detection(&self) -> bool {
        self.controller.take_activation().await.unwrap_or(false)
    }

    /// Controller state plus persisted intent
    ///
    /// # Errors
    ///
    /// Returns error if the controller is gone or settings cannot be read
    pub async fn status(&self) -> Result<Status> {
        Ok(Status {
            state: self.controller.state().await?,
            enabled: self.settings.enabled()?,
        })
    }

    /// Attach as the event subscriber
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }
}
