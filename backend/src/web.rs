use crate::classify::classify;
use crate::config::ConsoleConfig;
use crate::orientation::estimate_scaled;
use crate::state::AppState;
use crate::telemetry_task::get_current_timestamp_ms;
use crate::watchdog::stale_channels;
use axum::http::StatusCode;
use axum::{
    Json, Router,
    extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use neobot_shared::{
    Channel, Classification, ControlRequest, LinkState, LogEntry, LogKind, OrientationBasis,
    TelemetrySample, TelemetryState, Vector3,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;

const DEFAULT_LOG_LIMIT: usize = 100;

/// Public router constructor
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/log", get(get_log))
        .route("/api/status", get(get_status))
        .route("/api/control", post(post_control))
        .route("/ws", get(ws_handler))
        .fallback_service(static_dir)
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Outgoing WebSocket messages to the renderer:
///   { "ty": "telemetry",   "data": { ...ChannelUpdate... } }
///   { "ty": "orientation", "data": { ...OrientationMsg... } }
///   { "ty": "log",         "data": { ...LogEntry... } }
///   { "ty": "warning",     "data": { ...WarningMsg... } }
///   { "ty": "link",        "data": { ...LinkState... } }
#[derive(Serialize)]
#[serde(tag = "ty", content = "data", rename_all = "snake_case")]
pub enum WsOutMsg {
    Telemetry(ChannelUpdate),
    Orientation(OrientationMsg),
    Log(LogEntry),
    Warning(WarningMsg),
    Link(LinkState),
}

/// One channel's fresh sample and how to show it.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelUpdate {
    pub sample: TelemetrySample,
    pub classification: Classification,
    pub glyph: &'static str,
}

impl ChannelUpdate {
    pub fn from_sample(sample: &TelemetrySample) -> Self {
        let classification = classify(sample.channel, &sample.value);
        Self {
            sample: sample.clone(),
            classification,
            glyph: classification.icon.glyph(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrientationMsg {
    pub accel: Vector3,
    pub gyro: Vector3,
    pub basis: OrientationBasis,
}

/// Operator warning (also stored in the event log)
#[derive(Debug, Clone, Serialize)]
pub struct WarningMsg {
    pub timestamp_ms: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChannelView {
    pub channel: Channel,
    pub topic: &'static str,
    #[serde(flatten)]
    pub update: ChannelUpdate,
    pub age_ms: u64,
    pub stale: bool,
}

/// Returned by /api/snapshot
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub timestamp_ms: u64,
    pub channels: Vec<ChannelView>,
    pub orientation: OrientationBasis,
    pub link: LinkState,
}

pub fn build_snapshot(
    telemetry: &TelemetryState,
    link: LinkState,
    now_ms: u64,
    cfg: &ConsoleConfig,
) -> SnapshotResponse {
    let stale = stale_channels(telemetry, now_ms, cfg.stale_after_ms);
    let vector = |channel: Channel| {
        telemetry
            .get(&channel)
            .and_then(|s| s.value.as_vector())
            .unwrap_or(Vector3::ZERO)
    };

    let channels = telemetry
        .values()
        .map(|sample| ChannelView {
            channel: sample.channel,
            topic: sample.channel.topic(),
            update: ChannelUpdate::from_sample(sample),
            age_ms: now_ms.saturating_sub(sample.received_at_ms),
            stale: stale.contains(&sample.channel),
        })
        .collect();

    let orientation = estimate_scaled(
        vector(Channel::Accel),
        vector(Channel::Gyro),
        cfg.axis_length,
    );

    SnapshotResponse {
        timestamp_ms: now_ms,
        channels,
        orientation,
        link,
    }
}

async fn get_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let telemetry = state.telemetry_snapshot();
    Json(build_snapshot(
        &telemetry,
        state.link_state(),
        get_current_timestamp_ms(),
        &state.config,
    ))
}

#[derive(Deserialize)]
struct LogParams {
    // /api/log?limit=50  (defaults to 100 if not provided)
    limit: Option<usize>,
}

async fn get_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Json(state.recent_log(limit))
}

async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.link_state())
}

async fn post_control(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ControlRequest>,
) -> (StatusCode, String) {
    match forward_control(&state, req).await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => (StatusCode::BAD_REQUEST, e),
    }
}

async fn forward_control(state: &AppState, req: ControlRequest) -> Result<(), String> {
    let event = req.into_event()?;
    state
        .control_tx
        .send(event)
        .await
        .map_err(|e| format!("control channel closed: {e}"))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send_ws(sender: &mut SplitSink<WebSocket, Message>, msg: &WsOutMsg) -> bool {
    let text = serde_json::to_string(msg).unwrap_or_default();
    sender.send(Message::Text(Utf8Bytes::from(text))).await.is_ok()
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let mut updates_rx = state.updates_tx.subscribe();
    let mut orientation_rx = state.orientation_tx.subscribe();
    let mut log_rx = state.log_tx.subscribe();
    let mut warnings_rx = state.warnings_tx.subscribe();
    let mut link_rx = state.link.clone();

    let (mut sender, mut receiver) = socket.split();

    // Task: server -> client (all streams multiplexed)
    let send_task = async {
        const FLUSH_MS: u64 = 50;
        let mut latest_by_channel: BTreeMap<Channel, ChannelUpdate> = BTreeMap::new();
        let mut latest_orientation: Option<OrientationMsg> = None;
        let mut flush = tokio::time::interval(std::time::Duration::from_millis(FLUSH_MS));

        let link = link_rx.borrow_and_update().clone();
        if !send_ws(&mut sender, &WsOutMsg::Link(link)).await {
            return;
        }

        loop {
            tokio::select! {
                biased;

                recv = warnings_rx.recv() => match recv {
                    Ok(warn) => {
                        if !send_ws(&mut sender, &WsOutMsg::Warning(warn)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },

                changed = link_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let link = link_rx.borrow_and_update().clone();
                    if !send_ws(&mut sender, &WsOutMsg::Link(link)).await {
                        break;
                    }
                }

                recv = log_rx.recv() => match recv {
                    Ok(entry) => {
                        if !send_ws(&mut sender, &WsOutMsg::Log(entry)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "websocket client lagging on log stream");
                    }
                    Err(RecvError::Closed) => break,
                },

                recv = updates_rx.recv() => match recv {
                    Ok(update) => {
                        latest_by_channel.insert(update.sample.channel, update);
                    }
                    // Only the newest value per channel matters; the next flush catches up.
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },

                recv = orientation_rx.recv() => match recv {
                    Ok(msg) => latest_orientation = Some(msg),
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },

                _ = flush.tick() => {
                    let mut ok = true;
                    for (_, update) in std::mem::take(&mut latest_by_channel) {
                        ok = ok && send_ws(&mut sender, &WsOutMsg::Telemetry(update)).await;
                    }
                    if let Some(msg) = latest_orientation.take() {
                        ok = ok && send_ws(&mut sender, &WsOutMsg::Orientation(msg)).await;
                    }
                    if !ok {
                        break;
                    }
                }
            }
        }
    };

    // Task: client -> server (directional pad)
    let recv_task = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<ControlRequest>(&text) {
                    Ok(req) => {
                        if let Err(e) = forward_control(&state, req).await {
                            tracing::warn!("rejected control message {text:?}: {e}");
                        }
                    }
                    Err(e) => {
                        tracing::warn!("invalid control JSON {text:?}: {e}");
                    }
                }
            }
        }
    };

    // Either side ending closes the session.
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
    tracing::debug!("websocket session closed");
}

/// Can be called from any task that has &AppState:
///     emit_warning(&app_state, "Lost connection to broker");
pub fn emit_warning<S: Into<String>>(state: &AppState, message: S) {
    let message = message.into();
    let _ = state.warnings_tx.send(WarningMsg {
        timestamp_ms: get_current_timestamp_ms(),
        message: message.clone(),
    });
    state.record_log(LogKind::Warning, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use axum::response::IntoResponse;
    use neobot_shared::{
        CommandToken, ControlAction, ControlEvent, Severity, StatusLabel, TelemetryValue,
    };

    fn sample(channel: Channel, value: TelemetryValue, at: u64) -> TelemetrySample {
        TelemetrySample {
            channel,
            value,
            received_at_ms: at,
        }
    }

    #[test]
    fn snapshot_reports_age_staleness_and_orientation() {
        let cfg = ConsoleConfig::default();
        let mut telemetry = TelemetryState::new();
        telemetry.insert(
            Channel::Humidity,
            sample(Channel::Humidity, TelemetryValue::Int(25), 9_000),
        );
        telemetry.insert(
            Channel::AirQuality,
            sample(Channel::AirQuality, TelemetryValue::Text("Good".into()), 1_000),
        );

        let snap = build_snapshot(&telemetry, LinkState::disconnected("b:1883"), 10_000, &cfg);

        assert_eq!(snap.channels.len(), 2);
        let humidity = snap
            .channels
            .iter()
            .find(|c| c.channel == Channel::Humidity)
            .unwrap();
        assert_eq!(humidity.age_ms, 1_000);
        assert!(!humidity.stale);
        assert_eq!(humidity.update.classification.label, StatusLabel::Dry);

        let aq = snap
            .channels
            .iter()
            .find(|c| c.channel == Channel::AirQuality)
            .unwrap();
        assert!(aq.stale);
        assert_eq!(aq.update.classification.severity, Severity::Ok);

        // No IMU data yet: identity basis at display length.
        assert_eq!(snap.orientation.x_axis, Vector3::new(1.5, 0.0, 0.0));
        assert_eq!(snap.orientation.z_axis, Vector3::new(0.0, 0.0, 1.5));
    }

    #[test]
    fn ws_messages_are_tagged_by_ty() {
        let update = ChannelUpdate::from_sample(&sample(
            Channel::Temperature,
            TelemetryValue::Float(12.0),
            5,
        ));
        let json = serde_json::to_value(WsOutMsg::Telemetry(update)).unwrap();
        assert_eq!(json["ty"], "telemetry");
        assert_eq!(json["data"]["sample"]["channel"], "temperature");
        assert_eq!(json["data"]["classification"]["label"], "Cold");
        assert_eq!(json["data"]["glyph"], "🥶");

        let json = serde_json::to_value(WsOutMsg::Warning(WarningMsg {
            timestamp_ms: 1,
            message: "No distance telemetry".into(),
        }))
        .unwrap();
        assert_eq!(json["ty"], "warning");
    }

    #[tokio::test]
    async fn control_endpoint_forwards_events() {
        let (state, mut control_rx) = test_state(ConsoleConfig::default());

        let (status, _) = post_control(
            State(state.clone()),
            Json(ControlRequest {
                action: ControlAction::Press,
                token: Some(CommandToken::Lft),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            control_rx.recv().await,
            Some(ControlEvent::Press(CommandToken::Lft))
        );

        let (status, _) = post_control(
            State(state.clone()),
            Json(ControlRequest {
                action: ControlAction::Press,
                token: None,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(control_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_and_log_endpoints_respond() {
        let (state, _rx) = test_state(ConsoleConfig::default());
        emit_warning(&state, "Lost connection to broker.hivemq.com:1883");

        let response = get_status(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_log(State(state.clone()), Query(LogParams { limit: Some(1) }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.recent_log(1)[0].kind, LogKind::Warning);
    }
}
