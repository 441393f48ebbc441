//! Wake Listener - background wake word service
//!
//! This library provides the core of a long-running wake word listener:
//! - Lifecycle state machine serializing start, stop, and detections
//! - Detector engine adapter over an opaque keyword spotter
//! - Presence (sleep inhibition and a "listening" indicator with a Stop action)
//! - Persistent user intent and credential
//! - Boot reactivation and a UI bridge over local HTTP
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      UI                              │
//! │   HTTP commands   │   WebSocket detection events     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Bridge                            │
//! │   start │ stop │ running │ credential │ activation   │
//! └────────────────────┬────────────────────────────────┘
//!                      │  request queue
//! ┌────────────────────▼────────────────────────────────┐
//! │           Lifecycle controller thread                │
//! │   Presence  │  Detector adapter  │  Settings store   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod boot;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod db;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod presence;
pub mod settings;

pub use boot::{BootOutcome, BootReactivator};
pub use bridge::{Bridge, CommandResult, EventHub, EventSubscription};
pub use config::Config;
pub use controller::{
    ControllerBuilder, ControllerHandle, DetectionEvent, EventBus, LifecycleController,
    ServiceState,
};
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use engine::{DetectorAdapter, DetectorEngine, EngineConfig, EngineError, EngineSession};
pub use error::{Error, Result};
pub use presence::{PresenceError, PresenceHandle, PresenceManager};
pub use settings::{SettingsStore, WakeSettings};
