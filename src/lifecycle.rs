//! Platform-specific service installation
//!
//! Installs the listener as a user service that runs `wake-listener run --boot`
//! once per login/boot. The service is never restarted automatically: a failed
//! boot reactivation stays failed until the user reopens the UI.

use std::path::PathBuf;

use crate::{Error, Result};

/// Service status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Service is running
    Running,
    /// Service is installed but not running
    Stopped,
    /// Service is not installed
    NotInstalled,
    /// Status could not be determined
    Unknown(String),
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::NotInstalled => write!(f, "not installed"),
            Self::Unknown(msg) => write!(f, "unknown ({msg})"),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path to the wake-listener binary
    pub binary_path: PathBuf,
    /// Port the bridge listens on
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("wake-listener"),
            port: crate::config::DEFAULT_PORT,
        }
    }
}

impl ServiceConfig {
    /// Arguments the service manager passes to the binary
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "--boot".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ]
    }
}

/// Install the listener as a user service
///
/// # Errors
///
/// Returns error if service installation fails
pub fn install_service(config: &ServiceConfig) -> Result<()> {
    #[cfg(target_os = "macos")]
    return install_launchd(config);

    #[cfg(target_os = "linux")]
    return install_systemd(config);

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = config;
        Err(Error::Config(
            "service installation not supported on this platform".to_string(),
        ))
    }
}

/// Uninstall the user service
///
/// # Errors
///
/// Returns error if service removal fails
pub fn uninstall_service() -> Result<()> {
    #[cfg(target_os = "macos")]
    return uninstall_launchd();

    #[cfg(target_os = "linux")]
    return uninstall_systemd();

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    Err(Error::Config(
        "service management not supported on this platform".to_string(),
    ))
}

/// Query the user service status
///
/// # Errors
///
/// Returns error if status cannot be determined
pub fn service_status() -> Result<ServiceStatus> {
    #[cfg(target_os = "macos")]
    return launchd_status();

    #[cfg(target_os = "linux")]
    return systemd_status();

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    Ok(ServiceStatus::Unknown("platform not supported".to_string()))
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), allow(dead_code))]
fn log_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("/tmp"),
        |d| d.data_dir().join("wake-listener").join("logs"),
    )
}

// --- macOS (launchd) ---

#[cfg(target_os = "macos")]
const LAUNCHD_LABEL: &str = "dev.wake-listener";

#[cfg(target_os = "macos")]
fn plist_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home)
        .join("Library/LaunchAgents")
        .join(format!("{LAUNCHD_LABEL}.plist"))
}

/// Render the `LaunchAgent` plist
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn render_plist(label: &str, config: &ServiceConfig, log_dir: &std::path::Path) -> String {
    use std::fmt::Write as _;

    let mut arguments = format!("        <string>{}</string>\n", config.binary_path.display());
    for arg in config.arguments() {
        let _ = writeln!(arguments, "        <string>{arg}</string>");
    }
    let stdout_log = log_dir.join("wake-listener.log");
    let stderr_log = log_dir.join("wake-listener.err.log");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
{arguments}    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
    <key>StandardOutPath</key>
    <string>{stdout}</string>
    <key>StandardErrorPath</key>
    <string>{stderr}</string>
</dict>
</plist>"#,
        stdout = stdout_log.display(),
        stderr = stderr_log.display(),
    )
}

#[cfg(target_os = "macos")]
fn install_launchd(config: &ServiceConfig) -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let path = plist_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, render_plist(LAUNCHD_LABEL, config, &log_dir))?;

    let output = std::process::Command::new("launchctl")
        .args(["load", "-w"])
        .arg(&path)
        .output()
        .map_err(|e| Error::Config(format!("failed to run launchctl: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Config(format!("launchctl load failed: {stderr}")));
    }

    tracing::info!(path = %path.display(), "installed LaunchAgent");
    Ok(())
}

#[cfg(target_os = "macos")]
fn uninstall_launchd() -> Result<()> {
    let path = plist_path();

    if path.exists() {
        let _ = std::process::Command::new("launchctl")
            .args(["unload"])
            .arg(&path)
            .output();

        std::fs::remove_file(&path)?;
        tracing::info!("uninstalled LaunchAgent");
    }

    Ok(())
}

#[cfg(target_os = "macos")]
fn launchd_status() -> Result<ServiceStatus> {
    if !plist_path().exists() {
        return Ok(ServiceStatus::NotInstalled);
    }

    let output = std::process::Command::new("launchctl")
        .args(["list", LAUNCHD_LABEL])
        .output()
        .map_err(|e| Error::Config(format!("failed to run launchctl: {e}")))?;

    if output.status.success() {
        Ok(ServiceStatus::Running)
    } else {
        Ok(ServiceStatus::Stopped)
    }
}

// --- Linux (systemd) ---

#[cfg(target_os = "linux")]
const SYSTEMD_SERVICE: &str = "wake-listener";

#[cfg(target_os = "linux")]
fn service_file_path() -> PathBuf {
    let config_dir = directories::BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });

    config_dir
        .join("systemd/user")
        .join(format!("{SYSTEMD_SERVICE}.service"))
}

/// Render the systemd user unit
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn render_unit(config: &ServiceConfig) -> String {
    format!(
        r"[Unit]
Description=Wake word listener
After=sound.target

[Service]
Type=simple
ExecStart={binary} {args}
Restart=no
Environment=RUST_LOG=info

[Install]
WantedBy=default.target
",
        binary = config.binary_path.display(),
        args = config.arguments().join(" "),
    )
}

#[cfg(target_os = "linux")]
fn install_systemd(config: &ServiceConfig) -> Result<()> {
    std::fs::create_dir_all(log_dir())?;

    let path = service_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, render_unit(config))?;

    // Reload and enable for the next login; the unit also starts now
    run_systemctl(&["--user", "daemon-reload"])?;
    run_systemctl(&["--user", "enable", "--now", SYSTEMD_SERVICE])?;

    tracing::info!(path = %path.display(), "installed systemd user service");
    Ok(())
}

#[cfg(target_os = "linux")]
fn uninstall_systemd() -> Result<()> {
    let _ = run_systemctl(&["--user", "disable", "--now", SYSTEMD_SERVICE]);

    let path = service_file_path();
    if path.exists() {
        std::fs::remove_file(&path)?;
        let _ = run_systemctl(&["--user", "daemon-reload"]);
        tracing::info!("uninstalled systemd user service");
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn systemd_status() -> Result<ServiceStatus> {
    if !service_file_path().exists() {
        return Ok(ServiceStatus::NotInstalled);
    }

    let output = std::process::Command::new("systemctl")
        .args(["--user", "is-active", SYSTEMD_SERVICE])
        .output()
        .map_err(|e| Error::Config(format!("failed to run systemctl: {e}")))?;

    let status = String::from_utf8_lossy(&output.stdout).trim().to_string();
    match status.as_str() {
        "active" => Ok(ServiceStatus::Running),
        "inactive" | "failed" => Ok(ServiceStatus::Stopped),
        other => Ok(ServiceStatus::Unknown(other.to_string())),
    }
}

#[cfg(target_os = "linux")]
fn run_systemctl(args: &[&str]) -> Result<()> {
    let output = std::process::Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|e| Error::Config(format!("failed to run systemctl: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Config(format!(
            "systemctl {} failed: {stderr}",
            args.join(" ")
        )));
    }

    Ok(())
}
