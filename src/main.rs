//! Aislebot - aisle-search controller for a shopping-cart robot
//!
//! Drives the cart down store aisles while a vision sidecar streams soda
//! detections; wanted items are checked off with their aisle recorded.
//!
//! Module structure:
//! - `domain/` - Core types (DetectionEvent, SessionState, SearchSummary)
//! - `io/` - External interfaces (vision feed, motor, sonar, command TCP)
//! - `services/` - Search logic (SessionController, Scanner, Navigator)
//! - `infra/` - Infrastructure (Config, Metrics)

use aislebot::infra::{Config, Metrics};
use aislebot::io::{
    create_notifier, start_command_listener, CommandListenerConfig, MotorController, Notification,
    SonarSource, UiCommand, VisionSource,
};
use aislebot::services::SessionController;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Interval between metrics report log lines
const METRICS_REPORT_SECS: u64 = 10;

/// Aislebot - autonomous soda search for the cart robot
#[derive(Parser, Debug)]
#[command(name = "aislebot", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
    /// Items to pre-seed into the cart (comma separated)
    #[arg(long, value_delimiter = ',')]
    items: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("aislebot starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        vision_addr = %config.vision_addr(),
        confidence_threshold = %config.confidence_threshold(),
        motor_device = %config.motor_device(),
        sonar_device = %config.sonar_device(),
        wall_threshold_cm = %config.wall_threshold_cm(),
        max_aisles = %config.max_aisles(),
        command_port = %config.command_listener_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let motor = Arc::new(MotorController::connect(&config));
    let (notifier, mut notif_rx) = create_notifier(config.notify_capacity(), metrics.clone());
    let controller =
        Arc::new(SessionController::new(config.clone(), motor.clone(), notifier, metrics.clone()));

    // Pre-seed the cart from the command line
    for item in &args.items {
        controller.add_item(item);
    }

    // Create command channel (bounded for backpressure)
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<UiCommand>(64);

    // Start command TCP listener
    let listener_config = CommandListenerConfig {
        port: config.command_listener_port(),
        enabled: config.command_listener_enabled(),
    };
    let listener_metrics = metrics.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            start_command_listener(listener_config, cmd_tx, listener_metrics, listener_shutdown)
                .await
        {
            error!(error = %e, "command listener error");
        }
    });

    // Render notifications to the log (the UI boundary for this binary)
    tokio::spawn(async move {
        while let Some(notification) = notif_rx.recv().await {
            match notification {
                Notification::ItemFound(p) => {
                    info!(item = %p.item, aisle = %p.aisle, "ui_item_found");
                }
                Notification::SearchComplete(p) => {
                    info!(
                        run_id = %p.run_id,
                        outcome = %p.outcome.as_str(),
                        summary = %p.summary,
                        "ui_search_complete"
                    );
                }
                Notification::SearchFailed(p) => {
                    error!(run_id = %p.run_id, reason = %p.reason, "ui_search_failed");
                }
                Notification::CartChanged(p) => {
                    info!(items = ?p.items, "ui_cart_changed");
                }
            }
        }
    });

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(METRICS_REPORT_SECS));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Main command loop
    let mut shutdown = shutdown_rx;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            command = cmd_rx.recv() => {
                match command {
                    Some(command) => handle_command(&controller, &config, command).await,
                    None => break,
                }
            }
        }
    }

    // Motion must be stopped before the process reports done
    controller.stop().await;
    motor.cleanup().await;

    info!("aislebot shutdown complete");
    Ok(())
}

async fn handle_command(controller: &SessionController, config: &Config, command: UiCommand) {
    match command {
        UiCommand::Add(item) => {
            controller.add_item(&item);
        }
        UiCommand::Remove(item) => {
            controller.remove_item(&item);
        }
        UiCommand::Start => {
            let vision = VisionSource::tcp(config.vision_addr());
            let sonar = SonarSource::serial(config);
            match controller.start(vision, sonar).await {
                Ok(run_id) => info!(run_id = %run_id, "search_accepted"),
                Err(e) => warn!(reason = %e, "search_rejected"),
            }
        }
        UiCommand::Stop => {
            controller.stop().await;
        }
        UiCommand::Status => {
            info!(
                state = %controller.state().as_str(),
                cart = ?controller.cart(),
                locations = %controller.locations(),
                "status"
            );
        }
    }
}
