//! vmherdd - VirtualBox machine rotation service
//!
//! Runs the rotation scheduler against the machines of one VirtualBox group,
//! or performs a single machine operation and exits.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vmherd_api::StartMode;
use vmherd_config::{Settings, load_config_or_default};
use vmherd_host_api::Hypervisor;
use vmherd_util::{
    MachineName, default_config_path, format_datetime_full, is_mock_time_active, now,
};
use vmherd_vbox::VBoxHost;
use vmherdd::{
    CommandOutcome, RotationService, connect, machine_info, poweroff_machine, render_info,
    render_inventory, render_snapshots, require_name, start_machine, stop_machine,
};

/// vmherdd - Keeps a bounded number of VirtualBox machines cycling
#[derive(Parser, Debug)]
#[command(name = "vmherdd")]
#[command(about = "Keeps a bounded number of VirtualBox machines cycling", long_about = None)]
struct Args {
    /// Configuration file path (default: $VMHERD_CONFIG or ~/.config/vmherd/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the rotation scheduler until interrupted (default)
    Run,
    /// List registered machines
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a machine's info
    Info {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Start a machine
    Start {
        name: String,
        /// Open a window instead of running headless
        #[arg(long)]
        gui: bool,
    },
    /// Save a machine's state and stop it
    Stop { name: String },
    /// Power a machine off
    Poweroff { name: String },
    /// List a machine's snapshots
    Snapshots {
        name: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "vmherdd starting");

    if is_mock_time_active() {
        warn!(now = %format_datetime_full(&now()), "Mock time active, job labels use it");
    }

    let settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        group = %settings.rotation.group,
        running_limit = settings.rotation.running_limit,
        "Configuration loaded"
    );

    let host = connect(&settings.hypervisor).await;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_service(host, settings).await,
        Command::List { json } => {
            let entries = host.list_inventory().await?;
            print!("{}", render_inventory(&entries, json)?);
            Ok(())
        }
        Command::Info { name, json } => {
            let info = machine_info(&host, &require_name(&name)?).await?;
            print!("{}", render_info(&info, json)?);
            Ok(())
        }
        Command::Start { name, gui } => {
            let name = require_name(&name)?;
            let outcome = start_machine(&host, &name, StartMode::from_gui(gui)).await?;
            report(&name, outcome, "started", "already running");
            Ok(())
        }
        Command::Stop { name } => {
            let name = require_name(&name)?;
            let outcome = stop_machine(&host, &name).await?;
            report(&name, outcome, "stopped", "not running");
            Ok(())
        }
        Command::Poweroff { name } => {
            let name = require_name(&name)?;
            let outcome = poweroff_machine(&host, &name).await?;
            report(&name, outcome, "powered off", "not running");
            Ok(())
        }
        Command::Snapshots { name, json } => {
            let list = host.machine(&require_name(&name)?).snapshot_list().await?;
            print!("{}", render_snapshots(&list, json)?);
            Ok(())
        }
    }
}

fn report(name: &MachineName, outcome: CommandOutcome, done: &str, unchanged: &str) {
    match outcome {
        CommandOutcome::Done => println!("{}: {}", name, done),
        CommandOutcome::Unchanged => println!("{}: {}", name, unchanged),
    }
}

async fn run_service(host: VBoxHost, settings: Settings) -> Result<()> {
    let host: Arc<dyn Hypervisor> = Arc::new(host);
    let service = RotationService::spawn(host, settings.rotation);

    info!("Service running");
    wait_for_shutdown(service.as_ref()).await?;

    if let Some(service) = service {
        service.shutdown().await?;
    }

    info!("Service stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(service: Option<&RotationService>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                return Ok(());
            }
            // SIGHUP: rescan now
            _ = sighup.recv() => {
                match service {
                    Some(service) => {
                        info!("Received SIGHUP, running a rotation cycle");
                        service.handle().run_cycle();
                    }
                    None => info!("Received SIGHUP, rotation is disabled"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_service: Option<&RotationService>) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down gracefully");
    Ok(())
}
