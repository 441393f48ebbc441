//! Detector engine adapter
//!
//! The keyword-spotting engine is consumed through two capability traits:
//! [`DetectorEngine`] builds sessions from a credential, and [`EngineSession`]
//! runs one of them. [`DetectorAdapter`] owns a single session and makes
//! `stop`/`dispose` idempotent. The adapter never retries; errors go straight
//! back to the lifecycle controller.

mod energy;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

pub use energy::{EnergyTriggerEngine, SAMPLE_RATE, SpeechBurstDetector};

/// Tuned detection sensitivity, deliberately not configurable
pub const SENSITIVITY: f32 = 0.7;

/// Keyword spotted when nothing else is configured
pub const DEFAULT_KEYWORD: &str = "jarvis";

/// Invoked on the engine's own thread with the matched keyword index
pub type DetectionCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Errors surfaced by a detector engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Credential is empty or rejected by the engine
    #[error("invalid credential")]
    InvalidCredential,
    /// Engine could not allocate its resources (e.g. audio input denied)
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
}

/// Everything an engine needs to build a session
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Opaque engine credential
    pub credential: SecretString,
    /// Keyword selector; exactly one keyword is configured
    pub keyword: String,
    /// Detection sensitivity in `0.0..=1.0`
    pub sensitivity: f32,
}

impl EngineConfig {
    /// Build a config with the fixed sensitivity
    #[must_use]
    pub fn new(credential: SecretString, keyword: impl Into<String>) -> Self {
        Self {
            credential,
            keyword: keyword.into(),
            sensitivity: SENSITIVITY,
        }
    }
}

/// Factory for engine sessions
///
/// Implementations must be shareable across threads; the sessions they build
/// live on the controller thread and need not be `Send`.
pub trait DetectorEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Allocate a session for the given configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredential` or `EngineUnavailable`
    fn initialize(&self, config: &EngineConfig) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One allocated engine instance
pub trait EngineSession {
    /// Begin continuous sampling; `on_detect` fires once per utterance
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` if sampling cannot begin
    fn start(&mut self, on_detect: DetectionCallback) -> Result<(), EngineError>;

    /// Stop sampling
    fn stop(&mut self);

    /// Release all engine resources
    fn dispose(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    Running,
    Stopped,
    Disposed,
}

/// Owns exactly one engine session
pub struct DetectorAdapter {
    engine_name: String,
    session: Box<dyn EngineSession>,
    phase: Phase,
}

impl DetectorAdapter {
    /// Initialize a session on `engine`
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredential` for a blank credential without touching the
    /// engine, otherwise whatever the engine reports
    pub fn initialize(
        engine: &dyn DetectorEngine,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        if config.credential.expose_secret().trim().is_empty() {
            return Err(EngineError::InvalidCredential);
        }

        let session = engine.initialize(config)?;
        tracing::debug!(engine = engine.name(), keyword = %config.keyword, "engine initialized");

        Ok(Self {
            engine_name: engine.name().to_string(),
            session,
            phase: Phase::Initialized,
        })
    }

    /// Start sampling
    ///
    /// # Errors
    ///
    /// Returns the engine's error; also `EngineUnavailable` if the session was
    /// already disposed
    pub fn start(&mut self, on_detect: DetectionCallback) -> Result<(), EngineError> {
        match self.phase {
            Phase::Running => return Ok(()),
            Phase::Disposed => {
                return Err(EngineError::EngineUnavailable(
                    "session already disposed".to_string(),
                ));
            }
            Phase::Initialized | Phase::Stopped => {}
        }

        self.session.start(on_detect)?;
        self.phase = Phase::Running;
        tracing::info!(engine = %self.engine_name, "wake word detection started");
        Ok(())
    }

    /// Stop sampling; no-op unless running
    pub fn stop(&mut self) {
        if self.phase == Phase::Running {
            self.session.stop();
            self.phase = Phase::Stopped;
            tracing::info!(engine = %self.engine_name, "wake word detection stopped");
        }
    }

    /// Release the session; no-op if already disposed
    pub fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        self.stop();
        self.session.dispose();
        self.phase = Phase::Disposed;
        tracing::debug!(engine = %self.engine_name, "engine disposed");
    }

    /// Whether the session is sampling audio
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}

impl Drop for DetectorAdapter {
    fn drop(&mut self) {
        self.dispose();
    }
}
