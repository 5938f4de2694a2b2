use crate::orientation::estimate_scaled;
use crate::state::AppState;
use crate::telemetry_router::TelemetryRouter;
use crate::web::{ChannelUpdate, OrientationMsg};
use neobot_shared::{Channel, TelemetrySample, Vector3};
use std::sync::{Arc, Mutex};

pub const SENSOR_PANEL: [Channel; 4] = [
    Channel::Temperature,
    Channel::Humidity,
    Channel::AirQuality,
    Channel::Light,
];

pub const IMU_PANEL: [Channel; 2] = [Channel::Accel, Channel::Gyro];

pub const RADAR_PANEL: [Channel; 1] = [Channel::Distance];

/// Latest IMU pair. Both start at zero until the first sample arrives.
#[derive(Debug, Clone)]
pub struct ImuPanel {
    accel: Vector3,
    gyro: Vector3,
    axis_length: f64,
}

impl ImuPanel {
    pub fn new(axis_length: f64) -> Self {
        Self {
            accel: Vector3::ZERO,
            gyro: Vector3::ZERO,
            axis_length,
        }
    }

    /// Fold one IMU sample in and recompute the basis.
    pub fn update(&mut self, sample: &TelemetrySample) -> Option<OrientationMsg> {
        let v = sample.value.as_vector()?;
        match sample.channel {
            Channel::Accel => self.accel = v,
            Channel::Gyro => self.gyro = v,
            _ => return None,
        }
        Some(OrientationMsg {
            accel: self.accel,
            gyro: self.gyro,
            basis: estimate_scaled(self.accel, self.gyro, self.axis_length),
        })
    }
}

/// Subscribe every display panel to the channels it renders.
pub fn register_panels(router: &mut TelemetryRouter, state: Arc<AppState>) {
    for channel in SENSOR_PANEL.into_iter().chain(RADAR_PANEL) {
        let updates_tx = state.updates_tx.clone();
        router.subscribe(channel, move |sample| {
            let _ = updates_tx.send(ChannelUpdate::from_sample(sample));
        });
    }

    let imu = Arc::new(Mutex::new(ImuPanel::new(state.config.axis_length)));
    for channel in IMU_PANEL {
        let imu = imu.clone();
        let updates_tx = state.updates_tx.clone();
        let orientation_tx = state.orientation_tx.clone();
        router.subscribe(channel, move |sample| {
            let _ = updates_tx.send(ChannelUpdate::from_sample(sample));
            let update = imu
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .update(sample);
            if let Some(msg) = update {
                let _ = orientation_tx.send(msg);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsoleConfig;
    use crate::state::test_state;
    use neobot_shared::{Severity, TelemetryValue};
    use std::f64::consts::FRAC_PI_2;

    fn sample(channel: Channel, value: TelemetryValue) -> TelemetrySample {
        TelemetrySample {
            channel,
            value,
            received_at_ms: 0,
        }
    }

    #[test]
    fn every_channel_has_exactly_one_panel() {
        let mut all: Vec<Channel> = SENSOR_PANEL
            .into_iter()
            .chain(IMU_PANEL)
            .chain(RADAR_PANEL)
            .collect();
        all.sort();
        assert_eq!(all, Channel::ALL.to_vec());
    }

    #[test]
    fn imu_panel_keeps_the_other_vector() {
        let mut panel = ImuPanel::new(1.5);
        let accel = Vector3::new(0.0, 0.0, 9.8);

        let first = panel
            .update(&sample(Channel::Accel, TelemetryValue::Vector(accel)))
            .unwrap();
        assert_eq!(first.gyro, Vector3::ZERO);
        assert!((first.basis.x_axis.x - 1.5).abs() < 1e-9);

        let second = panel
            .update(&sample(
                Channel::Gyro,
                TelemetryValue::Vector(Vector3::new(FRAC_PI_2, 0.0, 0.0)),
            ))
            .unwrap();
        assert_eq!(second.accel, accel);
        assert!(second.basis.x_axis.x.abs() < 1e-9);
        assert!((second.basis.x_axis.y - 1.5).abs() < 1e-9);
    }

    #[test]
    fn imu_panel_ignores_non_vector_samples() {
        let mut panel = ImuPanel::new(1.5);
        assert!(panel
            .update(&sample(Channel::Temperature, TelemetryValue::Float(20.0)))
            .is_none());
    }

    #[test]
    fn registered_panels_broadcast_updates() {
        let (state, _rx) = test_state(ConsoleConfig::default());
        let mut updates = state.updates_tx.subscribe();
        let mut orientation = state.orientation_tx.subscribe();
        let mut router = TelemetryRouter::new();
        register_panels(&mut router, state.clone());

        router.ingest_at(Channel::Temperature.topic(), TelemetryValue::Float(31.0), 1);
        let update = updates.try_recv().unwrap();
        assert_eq!(update.sample.channel, Channel::Temperature);
        assert_eq!(update.classification.severity, Severity::Warn);
        assert!(orientation.try_recv().is_err());

        router.ingest_at(
            Channel::Gyro.topic(),
            TelemetryValue::Vector(Vector3::new(0.1, 0.0, 0.0)),
            2,
        );
        assert_eq!(updates.try_recv().unwrap().sample.channel, Channel::Gyro);
        let msg = orientation.try_recv().unwrap();
        assert_eq!(msg.gyro, Vector3::new(0.1, 0.0, 0.0));
    }
}
