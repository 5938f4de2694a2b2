use crate::error::TransportError;
use crate::transport::{HandlerSlot, MessageHandler, Transport, deliver};
use neobot_shared::{Channel, LinkState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const AIR_QUALITY_LEVELS: [&str; 3] = ["Good", "Moderate", "Poor"];

/// Wire payload a healthy vehicle could plausibly publish on `channel`.
pub fn simulated_payload<R: Rng>(channel: Channel, rng: &mut R) -> String {
    match channel {
        // °C
        Channel::Temperature => format!("{:.1}", rng.random_range(10.0_f64..35.0)),
        // %RH
        Channel::Humidity => format!("{:.1}", rng.random_range(20.0_f64..80.0)),
        Channel::AirQuality => {
            AIR_QUALITY_LEVELS[rng.random_range(0..AIR_QUALITY_LEVELS.len())].to_string()
        }
        Channel::Light => rng.random_range(0..2).to_string(),
        // m/s^2
        Channel::Accel => {
            let ax: f64 = rng.random_range(-10.0..10.0);
            let ay: f64 = rng.random_range(-10.0..10.0);
            let az: f64 = rng.random_range(-10.0..10.0);
            format!("{ax:.2},{ay:.2},{az:.2}")
        }
        // rad
        Channel::Gyro => {
            let yaw: f64 = rng.random_range(-0.6..0.6);
            let pitch: f64 = rng.random_range(-0.6..0.6);
            let roll: f64 = rng.random_range(-0.6..0.6);
            format!("{yaw:.3},{pitch:.3},{roll:.3}")
        }
        // cm
        Channel::Distance => rng.random_range(20..=180).to_string(),
    }
}

/// Stand-in vehicle for bench work without a broker. Commands are logged
/// and dropped.
pub struct SimTransport {
    handler: HandlerSlot,
    link_rx: watch::Receiver<LinkState>,
}

impl SimTransport {
    /// Like the broker loop, the generator does nothing until spawned.
    pub fn start(
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, impl Future<Output = ()> + Send + 'static) {
        let handler: HandlerSlot = Arc::new(RwLock::new(None));
        let (link_tx, link_rx) = watch::channel(LinkState {
            connected: true,
            broker: "simulator".to_string(),
            last_error: None,
            changed_at_ms: crate::telemetry_task::get_current_timestamp_ms(),
        });

        let slot = handler.clone();
        let generator = async move {
            // Keep the link sender alive for as long as the simulator runs.
            let _link_tx = link_tx;
            let mut rng = StdRng::from_os_rng();
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            tracing::warn!(?period, "simulator active, no broker traffic");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let channel = Channel::ALL[rng.random_range(0..Channel::ALL.len())];
                        let payload = simulated_payload(channel, &mut rng);
                        deliver(&slot, channel.topic(), payload.as_bytes());
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::info!("simulator stopped");
        };

        (Self { handler, link_rx }, generator)
    }
}

impl Transport for SimTransport {
    fn on_message(&self, handler: MessageHandler) {
        *self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        tracing::info!(topic, payload, "simulator: command not forwarded");
        Ok(())
    }

    fn link(&self) -> watch::Receiver<LinkState> {
        self.link_rx.clone()
    }
}
