use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use wake_listener::bridge::CommandResult;
use wake_listener::daemon::open_settings;
use wake_listener::settings::mask;
use wake_listener::{Config, Daemon};

/// Wake listener - background wake word service
#[derive(Parser)]
#[command(name = "wake-listener", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the listener daemon
    Run {
        /// Treat this launch as the boot signal
        #[arg(long)]
        boot: bool,
        /// Port for the local bridge (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Save the engine credential
    SaveKey {
        /// Credential value
        key: String,
    },
    /// Control a running daemon
    Ctl {
        #[command(subcommand)]
        action: CtlAction,
    },
    /// Install as a user service started at login
    Install,
    /// Uninstall the user service
    Uninstall,
    /// Show user service status
    ServiceStatus,
}

#[derive(Subcommand)]
enum CtlAction {
    /// Start listening
    Start {
        /// Credential to start with; defaults to the saved one
        #[arg(long)]
        key: Option<String>,
    },
    /// Stop listening
    Stop,
    /// Show whether the listener is running
    Running,
    /// Read and clear the activation flag
    Activation,
}

#[derive(Deserialize)]
struct RunningResponse {
    running: bool,
}

#[derive(Deserialize)]
struct ActivationResponse {
    activated: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,wake_listener=info",
        1 => "info,wake_listener=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    match cli.command {
        Command::Run { boot, port } => {
            if let Some(port) = port {
                config.api_server.port = port;
            }
            tracing::info!(boot, port = config.api_server.port, "starting wake listener");
            Daemon::new(config)?.run(boot).await?;
            Ok(())
        }
        Command::SaveKey { key } => save_key(&config, key),
        Command::Ctl { action } => ctl(&config, action).await,
        Command::Install => cmd_install(&config),
        Command::Uninstall => cmd_uninstall(),
        Command::ServiceStatus => cmd_status(),
    }
}

/// Persist the credential without a running daemon
fn save_key(config: &Config, key: String) -> anyhow::Result<()> {
    let settings = open_settings(config)?;
    let key = SecretString::from(key);
    settings.set_credential(&key)?;
    println!("Credential saved ({})", mask(&key));
    Ok(())
}

async fn ctl(config: &Config, action: CtlAction) -> anyhow::Result<()> {
    let base = format!(
        "http://{}:{}/wake",
        config.api_server.bind, config.api_server.port
    );
    let client = reqwest::Client::new();

    match action {
        CtlAction::Start { key } => {
            let credential = match key {
                Some(key) => SecretString::from(key),
                None => open_settings(config)?.credential()?,
            };
            let body = serde_json::json!({ "credential": credential.expose_secret() });
            let response: CommandResult = client
                .post(format!("{base}/start"))
                .json(&body)
                .send()
                .await
                .context("daemon not reachable")?
                .json()
                .await?;
            print_command("start", &response);
        }
        CtlAction::Stop => {
            let response: CommandResult = client
                .post(format!("{base}/stop"))
                .send()
                .await
                .context("daemon not reachable")?
                .json()
                .await?;
            print_command("stop", &response);
        }
        CtlAction::Running => {
            let response: RunningResponse = client
                .get(format!("{base}/running"))
                .send()
                .await
                .context("daemon not reachable")?
                .json()
                .await?;
            println!("running: {}", response.running);
        }
        CtlAction::Activation => {
            let response: ActivationResponse = client
                .post(format!("{base}/activation"))
                .send()
                .await
                .context("daemon not reachable")?
                .json()
                .await?;
            println!("activated by wake word: {}", response.activated);
        }
    }

    Ok(())
}

fn print_command(name: &str, result: &CommandResult) {
    match &result.reason {
        _ if result.ok => println!("{name}: ok"),
        Some(reason) => println!("{name}: failed ({reason})"),
        None => println!("{name}: failed"),
    }
}

/// Install the listener as a user service
fn cmd_install(config: &Config) -> anyhow::Result<()> {
    let binary = std::env::current_exe()?;
    let service = wake_listener::lifecycle::ServiceConfig {
        binary_path: binary,
        port: config.api_server.port,
    };

    wake_listener::lifecycle::install_service(&service)?;
    println!("Wake listener installed as user service");
    Ok(())
}

/// Uninstall the user service
fn cmd_uninstall() -> anyhow::Result<()> {
    wake_listener::lifecycle::uninstall_service()?;
    println!("Wake listener user service removed");
    Ok(())
}

/// Show service status
fn cmd_status() -> anyhow::Result<()> {
    let status = wake_listener::lifecycle::service_status()?;
    println!("Wake listener service: {status}");
    Ok(())
}
