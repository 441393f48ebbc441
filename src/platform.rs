//! Desktop implementations of the OS boundary
//!
//! Wake resource, foreground indicator, and the "bring the UI forward"
//! activator used by the daemon.

use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Mutex, PoisonError};

use crate::presence::{ForegroundIndicator, Notice, PresenceError, StopAction, WakeResource};

/// Receives the "bring the host application forward" side effect
pub trait HostActivator: Send + Sync {
    /// Called on the controller thread for every accepted detection
    fn bring_to_foreground(&self, event: &crate::controller::DetectionEvent);
}

/// Wake resource that holds nothing
#[derive(Debug, Default)]
pub struct NoopWakeResource;

impl WakeResource for NoopWakeResource {
    fn acquire(&self) -> Result<(), PresenceError> {
        Ok(())
    }

    fn release(&self) {}
}

/// Child process that runs until its stdin reaches EOF
///
/// The write end of the pipe lives only in this process, so the child also
/// ends when the process dies without running destructors.
#[derive(Debug)]
struct Holder {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Holder {
    fn spawn(command: &mut Command) -> std::io::Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();
        Ok(Self { child, stdin })
    }

    fn end(mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            tracing::warn!(error = %e, "failed to stop sleep inhibitor");
        }
        let _ = self.child.wait();
    }
}

/// Holds a `systemd-inhibit` lock for as long as the resource is acquired
#[derive(Debug)]
pub struct InhibitorWakeResource {
    program: PathBuf,
    holder: Mutex<Option<Holder>>,
}

impl InhibitorWakeResource {
    /// Locate `systemd-inhibit` on `PATH`
    #[must_use]
    pub fn detect() -> Option<Self> {
        which::which("systemd-inhibit").ok().map(|program| Self {
            program,
            holder: Mutex::new(None),
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args([
            "--what=sleep:idle",
            "--who=wake-listener",
            "--why=Listening for wake word",
            "--mode=block",
            "cat",
        ]);
        command
    }
}

impl WakeResource for InhibitorWakeResource {
    fn acquire(&self) -> Result<(), PresenceError> {
        let mut slot = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        let holder = Holder::spawn(&mut self.command()).map_err(|e| {
            PresenceError::WakeDenied(format!("failed to run systemd-inhibit: {e}"))
        })?;

        tracing::debug!(pid = holder.child.id(), "sleep inhibitor started");
        *slot = Some(holder);
        Ok(())
    }

    fn release(&self) {
        let holder = self
            .holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(holder) = holder {
            holder.end();
            tracing::debug!("sleep inhibitor stopped");
        }
    }
}

impl Drop for InhibitorWakeResource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Foreground indicator that logs and keeps the stop action for signal wiring
#[derive(Default)]
pub struct TracingIndicator {
    on_stop: Mutex<Option<StopAction>>,
}

impl TracingIndicator {
    /// Create the indicator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user picking the indicator's action
    ///
    /// Returns false if no indicator is showing.
    pub fn trigger_stop(&self) -> bool {
        let action = self
            .on_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match action {
            Some(action) => {
                tracing::info!("stop action selected on listening indicator");
                action();
                true
            }
            None => false,
        }
    }
}

impl ForegroundIndicator for TracingIndicator {
    fn show(&self, notice: &Notice, on_stop: StopAction) -> Result<(), PresenceError> {
        *self.on_stop.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_stop);
        tracing::info!(
            title = %notice.title,
            text = %notice.text,
            action = %notice.action_label,
            "listening indicator shown"
        );
        Ok(())
    }

    fn dismiss(&self) {
        self.on_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        tracing::info!("listening indicator dismissed");
    }
}

/// Activator that only logs
#[derive(Debug, Default)]
pub struct TracingActivator;

impl HostActivator for TracingActivator {
    fn bring_to_foreground(&self, event: &crate::controller::DetectionEvent) {
        tracing::info!(keyword_index = event.keyword_index, "host activation requested");
    }
}

/// Activator that launches a configured command, detached
#[derive(Debug, Clone)]
pub struct CommandActivator {
    argv: Vec<String>,
}

impl CommandActivator {
    /// Create from an argv list; `None` when the list is empty
    #[must_use]
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            None
        } else {
            Some(Self { argv })
        }
    }
}

impl HostActivator for CommandActivator {
    fn bring_to_foreground(&self, event: &crate::controller::DetectionEvent) {
        let Some((program, args)) = self.argv.split_first() else {
            return;
        };

        let spawned = Command::new(program)
            .args(args)
            .env("WAKE_KEYWORD_INDEX", event.keyword_index.to_string())
            .env("WAKE_DETECTED_AT", event.timestamp.to_rfc3339())
            .stdin(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                tracing::info!(program = %program, pid = child.id(), "host activation launched");
                // Reap off the controller thread
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => {
                tracing::warn!(program = %program, error = %e, "host activation failed");
            }
        }
    }
}
