//! usb-inspect
//!
//! Discovers attached USB devices, asks for access where needed, and prints
//! each device's interface and endpoint layout.

use anyhow::{Context, Result};
use clap::Parser;
use cli::config::{self, InspectConfig, OutputFormat};
use cli::console;
use cli::filter::DeviceFilter;
use cli::policy::ConsentPolicy;
use cli::render::{self, Renderer};
use cli::usb::{WorkerSettings, spawn_inspector_worker};
use common::{InspectorBridge, InspectorCommand, InspectorEvent, create_inspector_bridge, setup_logging};
use std::io;
use tokio::signal;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};
use types::ScanReport;

#[derive(Parser, Debug)]
#[command(name = "usb-inspect")]
#[command(author, version, about = "Inspect attached USB devices and their descriptors")]
#[command(long_about = "
Lists attached USB devices, requests access where it is not already held,
and prints each device's interfaces and endpoints. Devices plugged in while
running are scanned automatically.

EXAMPLES:
    # Interactive console
    usb-inspect

    # Print one scan and exit
    usb-inspect --list

    # Same, as JSON
    usb-inspect --list --json

    # Headless, log every event
    usb-inspect --service --log-level debug

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usb-inspect/config.toml
    3. /etc/usb-inspect/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run headless and log events until Ctrl+C
    #[arg(long)]
    service: bool,

    /// Print one scan and exit
    #[arg(long)]
    list: bool,

    /// Render output as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = InspectConfig::default();
        let path = InspectConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        InspectConfig::load(Some(config::expand_path(path))).context("Failed to load configuration")?
    } else {
        InspectConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.inspector.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-inspect v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let policy = ConsentPolicy::from_settings(&config.permissions)?;
    let format = if args.json {
        OutputFormat::Json
    } else {
        config.display.format
    };
    let renderer = Renderer::new(format);

    let settings = WorkerSettings {
        filters: DeviceFilter::parse_all(&config.usb.filters).context("Invalid usb.filters")?,
        hotplug: config.inspector.hotplug,
        hotplug_debounce: config.inspector.hotplug_debounce(),
    };

    let (bridge, worker) = create_inspector_bridge();
    let worker_handle = spawn_inspector_worker(worker, settings);

    let result = if args.list {
        list_devices_mode(&bridge, &policy, renderer, &config).await
    } else if args.service || config.inspector.service_mode {
        info!("Running in service mode (headless)");
        run_service(&bridge, &policy).await
    } else {
        console::run(bridge.clone(), policy, renderer).await
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = shutdown_worker(&bridge).await {
        error!("Error shutting down USB worker: {:#}", e);
    }
    drop(bridge);

    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker failed: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

/// Print the startup scan, resolving permission requests by policy
async fn list_devices_mode(
    bridge: &InspectorBridge,
    policy: &ConsentPolicy,
    renderer: Renderer,
    config: &InspectConfig,
) -> Result<()> {
    info!("Listing USB devices...");
    let deadline = Instant::now() + config.permissions.permission_timeout();
    let mut report: Option<ScanReport> = None;

    loop {
        if report.as_ref().is_some_and(|r| r.pending_count() == 0) {
            break;
        }

        let event = match timeout_at(deadline, bridge.recv_event()).await {
            Ok(event) => event.context("USB worker stopped")?,
            Err(_) => {
                warn!("Timed out waiting for permission outcomes");
                break;
            }
        };

        match event {
            InspectorEvent::ScanCompleted(scan) => {
                if report.is_none() {
                    report = Some(scan);
                }
            }
            InspectorEvent::PermissionRequested(identity) => {
                let granted = policy.decide_unattended(&identity);
                bridge
                    .answer_permission(identity, granted)
                    .await
                    .context("Failed to send permission result")?;
            }
            InspectorEvent::DeviceReady(entry) => {
                if let Some(report) = report.as_mut() {
                    report.replace_entry(entry);
                }
            }
            InspectorEvent::DeviceDetached(identity) => {
                info!("Device detached while listing: {}", identity);
            }
        }
    }

    let Some(report) = report else {
        anyhow::bail!("No scan completed before the timeout");
    };
    renderer
        .write_report(&mut io::stdout().lock(), &report)
        .context("Failed to write scan report")
}

/// Run headless, logging every event until Ctrl+C
async fn run_service(bridge: &InspectorBridge, policy: &ConsentPolicy) -> Result<()> {
    info!("Press Ctrl+C to shutdown");

    loop {
        tokio::select! {
            event = bridge.recv_event() => {
                match event.context("USB worker stopped")? {
                    InspectorEvent::ScanCompleted(report) => {
                        for line in render::report_lines(&report) {
                            info!("{}", line);
                        }
                        let failed = report.entries.iter().filter(|e| e.is_error()).count();
                        if failed > 0 {
                            warn!("{} device(s) could not be inspected", failed);
                        }
                    }
                    InspectorEvent::PermissionRequested(identity) => {
                        let granted = policy.decide_unattended(&identity);
                        info!(
                            "Permission for {} {} by policy",
                            identity,
                            if granted { "granted" } else { "denied" }
                        );
                        bridge
                            .answer_permission(identity, granted)
                            .await
                            .context("Failed to send permission result")?;
                    }
                    InspectorEvent::DeviceReady(entry) => {
                        for line in render::entry_lines(&entry) {
                            if entry.is_error() {
                                warn!("{}", line);
                            } else {
                                info!("{}", line);
                            }
                        }
                    }
                    InspectorEvent::DeviceDetached(identity) => {
                        info!("Device detached: {}", identity);
                    }
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                break;
            }
        }
    }

    Ok(())
}

/// Shutdown USB worker thread gracefully
async fn shutdown_worker(bridge: &InspectorBridge) -> Result<()> {
    bridge
        .send_command(InspectorCommand::Shutdown)
        .await
        .context("Failed to send Shutdown command")?;
    Ok(())
}
