//! Service state and detection events

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not listening; the state every process starts in
    #[default]
    Stopped,
    /// Presence acquired, engine coming up
    Starting,
    /// Engine sampling audio
    Listening,
    /// Teardown in progress
    Stopping,
    /// Last start failed; behaves like `Stopped`
    Faulted,
}

impl ServiceState {
    /// Whether the listener is sampling audio
    #[must_use]
    pub const fn is_listening(self) -> bool {
        matches!(self, Self::Listening)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Listening => write!(f, "listening"),
            Self::Stopping => write!(f, "stopping"),
            Self::Faulted => write!(f, "faulted"),
        }
    }
}

/// One physical detection of the wake word
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// When the engine reported the match
    pub timestamp: DateTime<Utc>,
    /// Matched keyword; always 0 with a single keyword
    pub keyword_index: u32,
}

/// Typed channel from the controller to the UI bridge
pub trait EventBus: Send + Sync {
    /// Hand off an event; must not block
    fn deliver(&self, event: DetectionEvent);
}

/// Event bus that discards everything
#[derive(Debug, Default)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn deliver(&self, event: DetectionEvent) {
        tracing::debug!(keyword_index = event.keyword_index, "detection discarded, no event bus");
    }
}
