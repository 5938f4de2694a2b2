use crate::state::AppState;
use crate::telemetry_task::get_current_timestamp_ms;
use crate::web::emit_warning;
use neobot_shared::{Channel, LogKind, TelemetryState};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, interval};

const CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Channels whose latest sample is older than `stale_after_ms`.
///
/// Channels that never reported are not stale, just absent.
pub fn stale_channels(telemetry: &TelemetryState, now_ms: u64, stale_after_ms: u64) -> BTreeSet<Channel> {
    telemetry
        .values()
        .filter(|s| now_ms.saturating_sub(s.received_at_ms) > stale_after_ms)
        .map(|s| s.channel)
        .collect()
}

/// Warn once when a channel goes quiet, note once when it comes back.
pub async fn staleness_task(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let stale_after_ms = state.config.stale_after_ms;
    let mut ticker = interval(CHECK_INTERVAL);
    let mut stale: BTreeSet<Channel> = BTreeSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = get_current_timestamp_ms();
                let current = stale_channels(&state.telemetry.borrow(), now, stale_after_ms);

                for channel in current.difference(&stale) {
                    emit_warning(
                        &state,
                        format!("No {channel} telemetry for over {} s", stale_after_ms / 1000),
                    );
                }
                for channel in stale.difference(&current) {
                    tracing::info!(%channel, "telemetry resumed");
                    state.record_log(LogKind::System, format!("{channel} telemetry resumed"));
                }
                stale = current;
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Surface broker link transitions to the operator.
pub async fn link_monitor_task(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut link_rx = state.link.clone();
    let mut was_connected = link_rx.borrow_and_update().connected;

    loop {
        tokio::select! {
            changed = link_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let link = link_rx.borrow_and_update().clone();
                if link.connected && !was_connected {
                    state.record_log(LogKind::System, format!("Connected to {}", link.broker));
                } else if !link.connected && was_connected {
                    let reason = link.last_error.as_deref().unwrap_or("link closed");
                    emit_warning(&state, format!("Lost connection to {}: {reason}", link.broker));
                } else if let Some(err) = &link.last_error {
                    tracing::debug!(broker = %link.broker, "still disconnected: {err}");
                }
                was_connected = link.connected;
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsoleConfig;
    use crate::state::test_state_with;
    use crate::telemetry_router::TelemetryRouter;
    use neobot_shared::{LinkState, TelemetrySample, TelemetryValue};
    use tokio::sync::{mpsc, watch};

    fn sample(channel: Channel, at: u64) -> TelemetrySample {
        TelemetrySample {
            channel,
            value: TelemetryValue::Int(1),
            received_at_ms: at,
        }
    }

    #[test]
    fn only_old_samples_are_stale() {
        let mut telemetry = TelemetryState::new();
        telemetry.insert(Channel::Distance, sample(Channel::Distance, 1_000));
        telemetry.insert(Channel::Humidity, sample(Channel::Humidity, 9_000));

        let stale = stale_channels(&telemetry, 10_000, 5_000);
        assert_eq!(stale, BTreeSet::from([Channel::Distance]));
        assert!(!stale.contains(&Channel::Temperature));
    }

    #[test]
    fn boundary_and_clock_skew_are_not_stale() {
        let mut telemetry = TelemetryState::new();
        telemetry.insert(Channel::Light, sample(Channel::Light, 5_000));
        telemetry.insert(Channel::Gyro, sample(Channel::Gyro, 20_000));

        assert!(stale_channels(&telemetry, 10_000, 5_000).is_empty());
    }

    #[tokio::test]
    async fn stale_channel_warns_once() {
        let mut router = TelemetryRouter::new();
        let config = ConsoleConfig {
            stale_after_ms: 1_000,
            ..ConsoleConfig::default()
        };
        let (state, _rx) = test_state_with(config, router.watch());
        router.ingest_at(Channel::Temperature.topic(), TelemetryValue::Float(21.0), 0);
        let mut warnings = state.warnings_tx.subscribe();
        let (shutdown_tx, _) = broadcast::channel(1);

        let task = tokio::spawn(staleness_task(state.clone(), shutdown_tx.subscribe()));
        let first = warnings.recv().await.unwrap();
        assert!(first.message.contains("temperature"));

        tokio::time::sleep(CHECK_INTERVAL * 2).await;
        assert!(warnings.try_recv().is_err());

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn link_loss_is_reported() {
        let config = ConsoleConfig::default();
        let (link_tx, link_rx) = watch::channel(LinkState::disconnected(config.broker_label()));
        let (control_tx, _control_rx) = mpsc::channel(1);
        let telemetry = TelemetryRouter::new().watch();
        let state = Arc::new(AppState::new(Arc::new(config), control_tx, link_rx, telemetry));
        let mut warnings = state.warnings_tx.subscribe();
        let mut log = state.log_tx.subscribe();
        let (shutdown_tx, _) = broadcast::channel(1);
        let task = tokio::spawn(link_monitor_task(state.clone(), shutdown_tx.subscribe()));
        tokio::task::yield_now().await;

        link_tx.send_modify(|l| l.connected = true);
        let connected = log.recv().await.unwrap();
        assert!(connected.message.starts_with("Connected to"));

        link_tx.send_modify(|l| {
            l.connected = false;
            l.last_error = Some("connection refused".into());
        });

        let warning = warnings.recv().await.unwrap();
        assert!(warning.message.contains("connection refused"));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
