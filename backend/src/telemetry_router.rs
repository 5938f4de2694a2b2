use crate::telemetry_task::get_current_timestamp_ms;
use neobot_shared::{Channel, TelemetrySample, TelemetryState, TelemetryValue};
use std::collections::HashMap;
use tokio::sync::watch;

pub type SampleCallback = Box<dyn FnMut(&TelemetrySample) + Send>;

/// Single owner of the latest sample per channel.
///
/// The state lives in a watch channel only the router can write; readers get
/// receivers from [`TelemetryRouter::watch`].
///
/// Callbacks run synchronously inside `ingest`, so updates to one channel are
/// delivered in arrival order. A callback must not call back into the router.
pub struct TelemetryRouter {
    state: watch::Sender<TelemetryState>,
    subscribers: HashMap<Channel, Vec<SampleCallback>>,
}

impl Default for TelemetryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRouter {
    pub fn new() -> Self {
        Self {
            state: watch::channel(TelemetryState::new()).0,
            subscribers: HashMap::new(),
        }
    }

    /// Read-only view of the router's state, updated after every accepted sample.
    pub fn watch(&self) -> watch::Receiver<TelemetryState> {
        self.state.subscribe()
    }

    /// Replace the current sample for the channel that owns `topic`.
    ///
    /// Returns `None` without touching state when the topic is unknown or the
    /// value does not fit the channel's shape.
    pub fn ingest(&mut self, topic: &str, value: TelemetryValue) -> Option<TelemetrySample> {
        self.ingest_at(topic, value, get_current_timestamp_ms())
    }

    pub fn ingest_at(
        &mut self,
        topic: &str,
        value: TelemetryValue,
        received_at_ms: u64,
    ) -> Option<TelemetrySample> {
        let Some(channel) = Channel::from_topic(topic) else {
            tracing::debug!(topic, "ignoring sample for unknown topic");
            return None;
        };
        if !channel.accepts(&value) {
            tracing::warn!(%channel, ?value, "value does not fit channel shape, dropping");
            return None;
        }

        let sample = TelemetrySample {
            channel,
            value,
            received_at_ms,
        };
        self.state.send_modify(|state| {
            state.insert(channel, sample.clone());
        });

        if let Some(callbacks) = self.subscribers.get_mut(&channel) {
            for callback in callbacks.iter_mut() {
                callback(&sample);
            }
        }
        Some(sample)
    }

    pub fn snapshot(&self) -> TelemetryState {
        self.state.borrow().clone()
    }

    pub fn subscribe<F>(&mut self, channel: Channel, callback: F)
    where
        F: FnMut(&TelemetrySample) + Send + 'static,
    {
        self.subscribers
            .entry(channel)
            .or_default()
            .push(Box::new(callback));
    }
}
