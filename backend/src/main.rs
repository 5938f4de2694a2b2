// main.rs

mod classify;
mod command_dispatch;
mod config;
mod error;
mod orientation;
mod panels;
mod ring_buffer;
#[cfg(feature = "simulator")]
mod sim;
mod state;
mod telemetry_decode;
mod telemetry_router;
mod telemetry_task;
mod transport;
mod watchdog;
mod web;

use crate::command_dispatch::CommandDispatcher;
use crate::config::ConsoleConfig;
use crate::panels::register_panels;
use crate::state::AppState;
use crate::telemetry_router::TelemetryRouter;
use crate::telemetry_task::telemetry_task;
use crate::transport::{InboundMessage, MqttTransport, Transport, publish_task};
use crate::watchdog::{link_monitor_task, staleness_task};
use neobot_shared::LogKind;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

/// Raw messages waiting for the telemetry task. Overflow is dropped, never
/// back-pressured onto the broker I/O loop.
const INBOUND_QUEUE: usize = 512;
const CONTROL_QUEUE: usize = 32;
const COMMAND_QUEUE: usize = 64;
const TASK_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(ConsoleConfig::load()?);
    tracing::info!(broker = %config.broker_label(), http = %config.http_addr, "starting NeoBot console");

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    #[cfg(feature = "simulator")]
    if config.simulate {
        let period = Duration::from_millis(config.simulator_period_ms);
        let (transport, io) = sim::SimTransport::start(period, shutdown_tx.subscribe());
        return run(config, Arc::new(transport), io, shutdown_tx).await;
    }
    #[cfg(not(feature = "simulator"))]
    if config.simulate {
        tracing::warn!("simulation requested but built without the `simulator` feature; using the broker");
    }

    let (transport, io) = MqttTransport::connect(
        &config.broker_host,
        config.broker_port,
        &config,
        shutdown_tx.subscribe(),
    );
    run(config, Arc::new(transport), io, shutdown_tx).await
}

/// `io` is the transport's unspawned I/O loop; it starts only after the
/// inbound handler is in place.
async fn run<T: Transport>(
    config: Arc<ConsoleConfig>,
    transport: Arc<T>,
    io: impl Future<Output = ()> + Send + 'static,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);
    let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);

    transport.on_message(Arc::new(move |topic: &str, payload: &[u8]| {
        let msg = InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        if let Err(e) = inbound_tx.try_send(msg) {
            tracing::warn!(topic, "inbound queue unavailable, dropping message: {e}");
        }
    }));

    let mut router = TelemetryRouter::new();
    let state = Arc::new(AppState::new(
        config.clone(),
        control_tx,
        transport.link(),
        router.watch(),
    ));
    state.record_log(LogKind::System, "NeoBot Controller is Ready");
    register_panels(&mut router, state.clone());
    let dispatcher = CommandDispatcher::new(commands_tx);

    let tasks = vec![
        tokio::spawn(telemetry_task(
            state.clone(),
            router,
            dispatcher,
            inbound_rx,
            control_rx,
            shutdown_tx.subscribe(),
        )),
        tokio::spawn(publish_task(
            state.clone(),
            transport.clone(),
            commands_rx,
            shutdown_tx.subscribe(),
        )),
        tokio::spawn(staleness_task(state.clone(), shutdown_tx.subscribe())),
        tokio::spawn(link_monitor_task(state.clone(), shutdown_tx.subscribe())),
        tokio::spawn(io),
    ];

    // --- Ctrl-C ---
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                let _ = signal_tx.send(());
            }
            Err(e) => tracing::error!("failed to listen for ctrl-c: {e}"),
        }
    });

    // --- Webserver ---
    let app = web::router(state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "renderer surface listening");

    let mut web_shutdown = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = web_shutdown.recv().await;
        })
        .await?;

    let _ = shutdown_tx.send(());
    for task in tasks {
        if tokio::time::timeout(TASK_SHUTDOWN_GRACE, task).await.is_err() {
            tracing::warn!("task did not stop within {TASK_SHUTDOWN_GRACE:?}");
        }
    }
    tracing::info!("console stopped");
    Ok(())
}
