//! voicecmd-daemon: Background daemon for hands-free voice commands
//!
//! This daemon provides:
//! - The voice command engine (listening state machine, matcher, retries)
//! - An IPC session adapter driving the speech host's recognizer
//! - IPC server for status queries, control and event notifications
//!
//! The speech host subscribes, receives session commands, and reports
//! recognizer events back. Dispatched actions reach the app UI through
//! the `action_dispatched` engine event.

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

use voicecmd::command::ActionKind;
use voicecmd::config::Config;
use voicecmd::dispatch::{ActionHandlers, TracingFeedback};
use voicecmd::ipc::{relay_engine_events, IpcSessionAdapter, Notification, Server};
use voicecmd::lifecycle::ShutdownSignal;
use voicecmd::{telemetry, VoiceCommandEngine};

fn action_handlers() -> ActionHandlers {
    let mut handlers = ActionHandlers::new();
    for kind in [
        ActionKind::NavigateToScan,
        ActionKind::TriggerSos,
        ActionKind::ShowAlerts,
        ActionKind::NavigateToHome,
        ActionKind::Unknown,
    ] {
        handlers.on(kind, move || info!(action = %kind, "action handled"));
    }
    handlers.on_report_incident(|description| {
        info!(action = "report_incident", description, "action handled")
    });
    handlers
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the format can be chosen
    let config = Config::load().context("failed to load configuration")?;
    telemetry::init(config.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voicecmd-daemon starting"
    );
    info!(?config.socket_path, language = %config.language_tag, "configuration loaded");

    config
        .ensure_dirs()
        .context("failed to create data directory")?;

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Engine + speech host -> IPC subscribers
    let (notify_tx, _) = broadcast::channel::<Notification>(128);
    // IPC server -> engine event loop
    let (adapter_tx, adapter_rx) = mpsc::channel(64);

    let engine = VoiceCommandEngine::builder(IpcSessionAdapter::new(notify_tx.clone()))
        .feedback(TracingFeedback)
        .handlers(action_handlers())
        .config(config.engine_config())
        .build();

    let server = Server::bind(&config.socket_path, engine.clone(), adapter_tx, notify_tx.clone())?;
    let engine_events = engine.subscribe();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the engine (processes recognizer events)
        _ = engine.run(adapter_rx) => {
            info!("engine event loop exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Push engine events to subscribers
        _ = relay_engine_events(engine_events, notify_tx) => {
            info!("engine event relay exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    engine.shutdown();
    server.shutdown().await;

    info!("voicecmd-daemon stopped");

    Ok(())
}
