use crate::config::ConsoleConfig;
use crate::ring_buffer::RingBuffer;
use crate::telemetry_task::get_current_timestamp_ms;
use crate::web::{ChannelUpdate, OrientationMsg, WarningMsg};
use neobot_shared::{ControlEvent, LinkState, LogEntry, LogKind, TelemetryState};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};

pub struct AppState {
    pub config: Arc<ConsoleConfig>,

    /// What the log panel shows: inbound messages, sent commands, warnings
    pub event_log: Mutex<RingBuffer<LogEntry>>,

    /// Directional-pad events from the renderer → telemetry task
    pub control_tx: mpsc::Sender<ControlEvent>,

    /// The router's state; only the router holds the sender
    pub telemetry: watch::Receiver<TelemetryState>,

    /// Broker link as reported by the transport
    pub link: watch::Receiver<LinkState>,

    /// Per-channel updates → renderer
    pub updates_tx: broadcast::Sender<ChannelUpdate>,

    /// IMU basis updates → renderer
    pub orientation_tx: broadcast::Sender<OrientationMsg>,

    /// Log panel lines → renderer
    pub log_tx: broadcast::Sender<LogEntry>,

    /// Operator warnings → renderer
    pub warnings_tx: broadcast::Sender<WarningMsg>,
}

impl AppState {
    pub fn new(
        config: Arc<ConsoleConfig>,
        control_tx: mpsc::Sender<ControlEvent>,
        link: watch::Receiver<LinkState>,
        telemetry: watch::Receiver<TelemetryState>,
    ) -> Self {
        let event_log = Mutex::new(RingBuffer::new(config.log_capacity));
        Self {
            config,
            event_log,
            control_tx,
            telemetry,
            link,
            updates_tx: broadcast::channel(512).0,
            orientation_tx: broadcast::channel(128).0,
            log_tx: broadcast::channel(512).0,
            warnings_tx: broadcast::channel(64).0,
        }
    }

    pub fn record_log<S: Into<String>>(&self, kind: LogKind, message: S) {
        let entry = LogEntry {
            timestamp_ms: get_current_timestamp_ms(),
            kind,
            message: message.into(),
        };
        self.event_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        let _ = self.log_tx.send(entry);
    }

    /// Newest first.
    pub fn recent_log(&self, n: usize) -> Vec<LogEntry> {
        let log = self
            .event_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.recent(n).into_iter().cloned().collect()
    }

    pub fn telemetry_snapshot(&self) -> TelemetryState {
        self.telemetry.borrow().clone()
    }

    pub fn link_state(&self) -> LinkState {
        self.link.borrow().clone()
    }
}

#[cfg(test)]
pub(crate) fn test_state(config: ConsoleConfig) -> (Arc<AppState>, mpsc::Receiver<ControlEvent>) {
    test_state_with(config, crate::telemetry_router::TelemetryRouter::new().watch())
}

/// State reading telemetry from a router the test drives itself.
#[cfg(test)]
pub(crate) fn test_state_with(
    config: ConsoleConfig,
    telemetry: watch::Receiver<TelemetryState>,
) -> (Arc<AppState>, mpsc::Receiver<ControlEvent>) {
    let (control_tx, control_rx) = mpsc::channel(16);
    let (_link_tx, link_rx) = watch::channel(LinkState::disconnected(config.broker_label()));
    (
        Arc::new(AppState::new(Arc::new(config), control_tx, link_rx, telemetry)),
        control_rx,
    )
}
