use crate::command_dispatch::CommandDispatcher;
use crate::error::DecodeError;
use crate::state::AppState;
use crate::telemetry_decode::decode_bytes;
use crate::telemetry_router::TelemetryRouter;
use crate::transport::InboundMessage;
use neobot_shared::{ControlEvent, LogKind};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Owns the router and the dispatcher. Everything that mutates telemetry
/// state or emits commands runs here, one message at a time.
pub async fn telemetry_task(
    state: Arc<AppState>,
    mut router: TelemetryRouter,
    mut dispatcher: CommandDispatcher,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    mut control_rx: mpsc::Receiver<ControlEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            Some(msg) = inbound_rx.recv() => {
                handle_inbound(&state, &mut router, msg);
            }
            Some(event) = control_rx.recv() => {
                let token = dispatcher.handle(event);
                tracing::debug!(?event, %token, "control event");
            }
            _ = shutdown_rx.recv() => break,
        }
    }
    tracing::info!("telemetry task stopped");
}

pub fn handle_inbound(state: &AppState, router: &mut TelemetryRouter, msg: InboundMessage) {
    let text = String::from_utf8_lossy(&msg.payload);
    state.record_log(LogKind::Telemetry, format!("[{}] {}", msg.topic, text));

    match decode_bytes(&msg.topic, &msg.payload) {
        Ok(value) => {
            router.ingest(&msg.topic, value);
        }
        Err(DecodeError::UnknownTopic(topic)) => {
            tracing::debug!(%topic, "message on unsubscribed topic");
        }
        Err(e) => {
            tracing::warn!("dropping malformed sample: {e}");
            state.record_log(LogKind::DecodeError, e.to_string());
        }
    }
}

pub fn get_current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
