//! # mipictl — mipirobot operator console
//!
//! Composition root that wires a transport into the session controller and
//! runs the line-oriented operator console on stdin/stdout.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise logging on stderr
//! - Construct the transport adapter selected by configuration
//! - Construct the session controller, injecting the transport and event bus
//! - Read console commands until `quit`, end of input or Ctrl-C
//! - Stop the robot and drop the link on the way out
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;
mod console;

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use mipirobot_adapter_ble::BleTransport;
use mipirobot_adapter_virtual::VirtualTransport;
use mipirobot_app::event_bus::InProcessEventBus;
use mipirobot_app::ports::Transport;
use mipirobot_app::services::SessionController;
use mipirobot_domain::event::{Event, SessionEvent};

use config::{Config, TransportKind};
use console::{Console, HELP, Outcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {:?}: {err}", config.logging.filter);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let event_bus = InProcessEventBus::default();
    tokio::spawn(log_events(event_bus.subscribe()));

    match config.transport.kind {
        TransportKind::Ble => {
            let transport = BleTransport::new(config.ble)
                .await
                .context("opening the bluetooth adapter")?;
            run(SessionController::new(transport, event_bus, config.controller)).await
        }
        TransportKind::Virtual => {
            tracing::info!(robots = config.simulation.robots.len(), "using the virtual radio");
            let transport = VirtualTransport::new(config.simulation);
            run(SessionController::new(transport, event_bus, config.controller)).await
        }
    }
}

async fn run<T: Transport>(
    controller: SessionController<T, InProcessEventBus>,
) -> anyhow::Result<()> {
    let console = Console::new(controller);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout.write_all(format!("{HELP}\n> ").as_bytes()).await?;
    stdout.flush().await?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        match console.handle_line(&line).await {
            Outcome::Quit => break,
            Outcome::Reply(reply) if reply.is_empty() => stdout.write_all(b"> ").await?,
            Outcome::Reply(reply) => stdout.write_all(format!("{reply}\n> ").as_bytes()).await?,
        }
        stdout.flush().await?;
    }

    console.shutdown().await;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Trace every published event until the bus closes.
async fn log_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => match &event.payload {
                SessionEvent::OperationFailed(error) => {
                    tracing::debug!(event = %event.id, %error, "operation failed");
                }
                payload => tracing::debug!(event = %event.id, ?payload, "session event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log lagging behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
