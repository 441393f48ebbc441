//! Daemon - the wake listener service
//!
//! Wires the settings store, presence, detector engine, lifecycle controller,
//! bridge, and HTTP server together, and owns the single controller instance
//! for the life of the process.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::ApiServer;
use crate::boot::BootReactivator;
use crate::bridge::{Bridge, EventHub};
use crate::controller::ControllerBuilder;
use crate::db;
use crate::engine::{DetectorEngine, EnergyTriggerEngine};
use crate::platform::{
    CommandActivator, HostActivator, InhibitorWakeResource, NoopWakeResource, TracingActivator,
    TracingIndicator,
};
use crate::presence::{PresenceManager, WakeResource};
use crate::settings::SettingsStore;
use crate::{Config, Error, Result};

/// Open the settings store described by `config`
///
/// # Errors
///
/// Returns error if the database cannot be opened or migrated
pub fn open_settings(config: &Config) -> Result<SettingsStore> {
    let db_path = config.db_path();
    let db = db::init(&db_path)?;
    tracing::info!(path = %db_path.display(), "database initialized");
    Ok(SettingsStore::new(db, config.namespace.clone()))
}

/// The wake listener daemon
pub struct Daemon {
    config: Config,
    settings: SettingsStore,
    engine: Arc<dyn DetectorEngine>,
}

impl Daemon {
    /// Create a new daemon instance using the microphone engine
    ///
    /// # Errors
    ///
    /// Returns error if initialization fails
    pub fn new(config: Config) -> Result<Self> {
        Self::with_engine(config, Arc::new(EnergyTriggerEngine::new()))
    }

    /// Create a daemon around a specific detector engine
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn with_engine(config: Config, engine: Arc<dyn DetectorEngine>) -> Result<Self> {
        let settings = open_settings(&config)?;
        Ok(Self {
            config,
            settings,
            engine,
        })
    }

    fn wake_resource(&self) -> Box<dyn WakeResource> {
        if !self.config.presence.inhibit_sleep {
            return Box::new(NoopWakeResource);
        }
        match InhibitorWakeResource::detect() {
            Some(inhibitor) => Box::new(inhibitor),
            None => {
                tracing::warn!("systemd-inhibit not found, sleep will not be inhibited");
                Box::new(NoopWakeResource)
            }
        }
    }

    fn activator(&self) -> Arc<dyn HostActivator> {
        match CommandActivator::new(self.config.activation_command.clone()) {
            Some(command) => Arc::new(command),
            None => Arc::new(TracingActivator),
        }
    }

    /// Run the daemon until interrupted
    ///
    /// With `boot` set, the process is treated as the boot signal and the
    /// listener is reactivated if the user left it enabled.
    ///
    /// # Errors
    ///
    /// Returns error if the controller cannot start or the API server fails
    pub async fn run(self, boot: bool) -> Result<()> {
        let settings = self.settings.clone();
        let indicator = Arc::new(TracingIndicator::new());
        let presence = PresenceManager::new(self.wake_resource(), indicator.clone())
            .with_notice(self.config.presence.notice.clone());
        let events = Arc::new(EventHub::new());

        tracing::info!(
            engine = self.engine.name(),
            keyword = %self.config.keyword,
            "detector engine selected"
        );

        let controller = ControllerBuilder::new(
            Arc::clone(&self.engine),
            presence,
            settings.clone(),
        )
        .keyword(self.config.keyword.clone())
        .activator(self.activator())
        .event_bus(events.clone())
        .spawn()?;

        let bridge = Bridge::new(controller.handle(), settings.clone(), events);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut server = ApiServer::new(bridge, &self.config.api_server).spawn(async move {
            let _ = shutdown_rx.changed().await;
        });

        tracing::info!(
            addr = %self.config.api_server.bind,
            port = self.config.api_server.port,
            boot,
            "daemon running"
        );

        // Installed before the boot pass; a signal during engine startup
        // must still reach the teardown below
        let mut signals = ShutdownSignals::install()?;

        let boot_pass = boot.then(|| {
            let reactivator = BootReactivator::new(settings, controller.handle());
            tokio::spawn(async move {
                let outcome = reactivator.on_boot().await;
                tracing::info!(?outcome, "boot reactivation finished");
            })
        });

        let finished = tokio::select! {
            () = signals.wait(&indicator) => None,
            joined = &mut server => Some(joined),
        };

        tracing::info!("shutting down");
        let _ = shutdown_tx.send(true);
        let joined = match finished {
            Some(joined) => joined,
            None => server.await,
        };

        // Teardown blocks on the controller thread
        tokio::task::spawn_blocking(move || controller.shutdown())
            .await
            .map_err(|e| Error::Config(format!("controller shutdown failed: {e}")))?;

        if let Some(task) = boot_pass {
            let _ = task.await;
        }

        joined.map_err(|e| Error::Config(format!("API server task failed: {e}")))?
    }
}

/// Process signals that end the daemon
///
/// `SIGUSR1` selects the listening indicator's stop action instead.
#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    stop_action: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            stop_action: signal(SignalKind::user_defined1())?,
        })
    }

    async fn wait(&mut self, indicator: &TracingIndicator) {
        loop {
            tokio::select! {
                _ = self.interrupt.recv() => {
                    tracing::info!("interrupt received");
                    return;
                }
                _ = self.terminate.recv() => {
                    tracing::info!("termination requested");
                    return;
                }
                _ = self.hangup.recv() => {
                    tracing::info!("hangup received");
                    return;
                }
                _ = self.stop_action.recv() => {
                    if !indicator.trigger_stop() {
                        tracing::debug!("stop signal ignored, indicator not shown");
                    }
                }
            }
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    #[allow(clippy::unnecessary_wraps)]
    const fn install() -> Result<Self> {
        Ok(Self)
    }

    #[allow(clippy::unused_self)]
    async fn wait(&mut self, _indicator: &TracingIndicator) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received"),
            Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
        }
    }
}
