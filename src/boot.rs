//! Boot reactivator
//!
//! Consumes the "device finished booting" signal once and restarts the
//! listener if the user left it enabled. Failures are terminal for the boot
//! cycle.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::controller::ControllerHandle;
use crate::settings::SettingsStore;

/// What a boot pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Persisted intent is off; nothing started
    Disabled,
    /// Enabled, but no credential has been saved
    MissingCredential,
    /// Listener started
    Started,
    /// Settings could not be read or the start failed
    Failed(String),
    /// The boot signal was already consumed by this process
    AlreadyFired,
}

/// One-shot reaction to the boot signal
#[derive(Debug)]
pub struct BootReactivator {
    settings: SettingsStore,
    controller: ControllerHandle,
    fired: AtomicBool,
}

impl BootReactivator {
    /// Create a reactivator for a freshly spawned controller
    #[must_use]
    pub const fn new(settings: SettingsStore, controller: ControllerHandle) -> Self {
        Self {
            settings,
            controller,
            fired: AtomicBool::new(false),
        }
    }

    /// Handle the boot signal
    pub async fn on_boot(&self) -> BootOutcome {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!("boot signal already handled");
            return BootOutcome::AlreadyFired;
        }

        let snapshot = match self.settings.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "failed to read wake settings at boot");
                return BootOutcome::Failed(e.reason().to_string());
            }
        };

        if !snapshot.enabled {
            tracing::info!("wake word disabled, not starting at boot");
            return BootOutcome::Disabled;
        }

        if !snapshot.has_credential() {
            tracing::warn!("wake word enabled but no credential saved, not starting at boot");
            return BootOutcome::MissingCredential;
        }

        match self.controller.start(snapshot.credential).await {
            Ok(()) => {
                tracing::info!("wake word listener restarted at boot");
                BootOutcome::Started
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to restart wake word listener at boot");
                BootOutcome::Failed(e.reason().to_string())
            }
        }
    }
}
