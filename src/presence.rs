//! Presence manager
//!
//! Holds the OS resources that keep a listener alive: a CPU wake resource and a
//! persistent foreground indicator with a single "Stop" action. Both are
//! acquired together and released together when the last [`PresenceHandle`]
//! drops, so every exit path out of listening releases them.

use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Routes the indicator's "Stop" action back into the controller
pub type StopAction = Arc<dyn Fn() + Send + Sync>;

/// The OS refused one of the presence resources
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    /// CPU wake resource denied
    #[error("wake resource denied: {0}")]
    WakeDenied(String),
    /// Foreground elevation or indicator denied
    #[error("foreground indicator denied: {0}")]
    ForegroundDenied(String),
}

/// Prevents the CPU from suspending while acquired
pub trait WakeResource: Send + Sync {
    /// Take the resource
    ///
    /// # Errors
    ///
    /// Returns `WakeDenied` if the OS refuses
    fn acquire(&self) -> Result<(), PresenceError>;

    /// Give the resource back
    fn release(&self);
}

/// Text shown on the foreground indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Indicator title
    pub title: String,
    /// Indicator body
    pub text: String,
    /// Label of the single user action
    pub action_label: String,
}

impl Default for Notice {
    fn default() -> Self {
        Self {
            title: "J.A.R.V.I.S Active".to_string(),
            text: "Listening for wake word...".to_string(),
            action_label: "Stop".to_string(),
        }
    }
}

/// Persistent, non-dismissible "listening" indicator
pub trait ForegroundIndicator: Send + Sync {
    /// Show the indicator; `on_stop` must run when the user picks the action
    ///
    /// # Errors
    ///
    /// Returns `ForegroundDenied` if the OS refuses elevation
    fn show(&self, notice: &Notice, on_stop: StopAction) -> Result<(), PresenceError>;

    /// Remove the indicator
    fn dismiss(&self);
}

/// Wake resource reference-counted at 0/1
pub struct WakeLock {
    resource: Box<dyn WakeResource>,
    held: Mutex<bool>,
}

impl WakeLock {
    /// Wrap a platform resource
    #[must_use]
    pub fn new(resource: Box<dyn WakeResource>) -> Self {
        Self {
            resource,
            held: Mutex::new(false),
        }
    }

    /// Acquire; no-op if already held
    ///
    /// # Errors
    ///
    /// Returns the platform's refusal
    pub fn acquire(&self) -> Result<(), PresenceError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held {
            tracing::debug!("wake resource already held");
            return Ok(());
        }
        self.resource.acquire()?;
        *held = true;
        tracing::debug!("wake resource acquired");
        Ok(())
    }

    /// Release; no-op (with a warning) if not held
    pub fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !*held {
            tracing::warn!("release requested for a wake resource that is not held");
            return;
        }
        self.resource.release();
        *held = false;
        tracing::debug!("wake resource released");
    }

    /// Whether the resource is currently held
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Lease {
    wake: Arc<WakeLock>,
    foreground: Arc<dyn ForegroundIndicator>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.foreground.dismiss();
        self.wake.release();
        tracing::info!("presence released");
    }
}

/// Scoped ownership of the presence resources
///
/// Dropping the handle releases them.
#[must_use = "dropping a PresenceHandle releases presence immediately"]
pub struct PresenceHandle {
    _lease: Arc<Lease>,
}

impl std::fmt::Debug for PresenceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceHandle").finish_non_exhaustive()
    }
}

/// Acquires and releases the wake resource and foreground indicator together
pub struct PresenceManager {
    wake: Arc<WakeLock>,
    foreground: Arc<dyn ForegroundIndicator>,
    notice: Notice,
    current: Mutex<Weak<Lease>>,
}

impl PresenceManager {
    /// Create a manager over platform resources
    #[must_use]
    pub fn new(wake: Box<dyn WakeResource>, foreground: Arc<dyn ForegroundIndicator>) -> Self {
        Self {
            wake: Arc::new(WakeLock::new(wake)),
            foreground,
            notice: Notice::default(),
            current: Mutex::new(Weak::new()),
        }
    }

    /// Override the indicator text
    #[must_use]
    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = notice;
        self
    }

    /// Acquire presence
    ///
    /// If presence is already held, the returned handle shares the existing
    /// lease and `on_stop` is ignored; no second reference is taken on the
    /// underlying resources.
    ///
    /// # Errors
    ///
    /// Returns the first refusal; nothing stays acquired on error
    pub fn acquire(&self, on_stop: StopAction) -> Result<PresenceHandle, PresenceError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lease) = current.upgrade() {
            tracing::debug!("presence already held");
            return Ok(PresenceHandle { _lease: lease });
        }

        self.wake.acquire()?;
        if let Err(e) = self.foreground.show(&self.notice, on_stop) {
            self.wake.release();
            return Err(e);
        }

        let lease = Arc::new(Lease {
            wake: Arc::clone(&self.wake),
            foreground: Arc::clone(&self.foreground),
        });
        *current = Arc::downgrade(&lease);
        tracing::info!("presence acquired");

        Ok(PresenceHandle { _lease: lease })
    }

    /// Release presence held by `handle`
    pub fn release(&self, handle: PresenceHandle) {
        drop(handle);
    }

    /// Whether any handle is outstanding
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }

    /// Whether the wake resource itself is held
    #[must_use]
    pub fn wake_held(&self) -> bool {
        self.wake.is_held()
    }
}
