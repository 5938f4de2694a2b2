use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Topic the vehicle listens on for drive commands.
pub const COMMAND_TOPIC: &str = "roboai/neobot/command";

/// One named telemetry stream published by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    Humidity,
    AirQuality,
    Light,
    Accel,
    Gyro,
    Distance,
}

/// What a channel's payload is expected to look like on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Number,
    Text,
    NumberOrText,
    Vector3,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::AirQuality,
        Channel::Light,
        Channel::Accel,
        Channel::Gyro,
        Channel::Distance,
    ];

    pub fn topic(&self) -> &'static str {
        match self {
            Channel::Temperature => "roboai/neobot/sensor/dht/temperature",
            Channel::Humidity => "roboai/neobot/sensor/dht/humidity",
            Channel::AirQuality => "roboai/neobot/sensor/mq2",
            Channel::Light => "roboai/neobot/sensor/ldr",
            Channel::Accel => "roboai/neobot/sensor/imu/accel",
            Channel::Gyro => "roboai/neobot/sensor/imu/gyro",
            Channel::Distance => "roboai/neobot/sensor/distance",
        }
    }

    /// Exact match against the fixed topic table.
    pub fn from_topic(topic: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.topic() == topic)
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            Channel::Temperature | Channel::Humidity | Channel::Distance => PayloadShape::Number,
            Channel::AirQuality => PayloadShape::Text,
            Channel::Light => PayloadShape::NumberOrText,
            Channel::Accel | Channel::Gyro => PayloadShape::Vector3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::AirQuality => "air_quality",
            Channel::Light => "light",
            Channel::Accel => "accel",
            Channel::Gyro => "gyro",
            Channel::Distance => "distance",
        }
    }

    /// Whether `value` has a shape this channel can hold.
    pub fn accepts(&self, value: &TelemetryValue) -> bool {
        use TelemetryValue as V;
        matches!(
            (self.shape(), value),
            (PayloadShape::Number, V::Int(_) | V::Float(_))
                | (PayloadShape::Text, V::Text(_))
                | (PayloadShape::NumberOrText, V::Int(_) | V::Float(_) | V::Text(_))
                | (PayloadShape::Vector3, V::Vector(_))
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x: {:.2}, y: {:.2}, z: {:.2}", self.x, self.y, self.z)
    }
}

/// A decoded payload. Which variants are valid depends on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TelemetryValue {
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vector3),
}

impl TelemetryValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Int(v) => Some(*v as f64),
            TelemetryValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector3> {
        match self {
            TelemetryValue::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Int(v) => write!(f, "{v}"),
            TelemetryValue::Float(v) => write!(f, "{v}"),
            TelemetryValue::Text(s) => f.write_str(s),
            TelemetryValue::Vector(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub channel: Channel,
    pub value: TelemetryValue,
    pub received_at_ms: u64,
}

/// Latest sample per channel. Channels appear once their first sample arrives.
pub type TelemetryState = BTreeMap<Channel, TelemetrySample>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Cold,
    Mild,
    Hot,
    Dry,
    Droplet,
    Wave,
    Leaf,
    Fog,
    Smoke,
    Sun,
    Moon,
    Unknown,
}

impl Icon {
    pub fn glyph(&self) -> &'static str {
        match self {
            Icon::Cold => "🥶",
            Icon::Mild => "🌤️",
            Icon::Hot => "🔥",
            Icon::Dry | Icon::Smoke => "💨",
            Icon::Droplet => "💧",
            Icon::Wave => "🌊",
            Icon::Leaf => "🍃",
            Icon::Fog => "🌫️",
            Icon::Sun => "🌞",
            Icon::Moon => "🌙",
            Icon::Unknown => "❓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLabel {
    Cold,
    Moderate,
    High,
    Dry,
    Good,
    Poor,
    Safe,
    Risk,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Ok,
    Warn,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTag {
    Blue,
    Green,
    Yellow,
    Red,
    Grey,
}

/// Display-facing status of a telemetry value. Always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub icon: Icon,
    pub label: StatusLabel,
    pub severity: Severity,
    pub color: ColorTag,
}

impl Classification {
    pub const UNKNOWN: Classification = Classification {
        icon: Icon::Unknown,
        label: StatusLabel::Unknown,
        severity: Severity::Unknown,
        color: ColorTag::Grey,
    };

    pub const fn new(icon: Icon, label: StatusLabel, severity: Severity, color: ColorTag) -> Self {
        Self {
            icon,
            label,
            severity,
            color,
        }
    }
}

/// Basis vectors of the vehicle frame, already scaled for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationBasis {
    pub x_axis: Vector3,
    pub y_axis: Vector3,
    pub z_axis: Vector3,
}

/// Drive directive sent to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandToken {
    Fwd,
    Bwd,
    Lft,
    Rht,
    Stp,
}

impl CommandToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandToken::Fwd => "FWD",
            CommandToken::Bwd => "BWD",
            CommandToken::Lft => "LFT",
            CommandToken::Rht => "RHT",
            CommandToken::Stp => "STP",
        }
    }
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator intent coming from the directional pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Press(CommandToken),
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Press,
    Release,
}

/// Wire form of a control event:
///   { "action": "press", "token": "FWD" }
///   { "action": "release" }
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
    #[serde(default)]
    pub token: Option<CommandToken>,
}

impl ControlRequest {
    /// Releases ignore `token`: any release stops the vehicle.
    pub fn into_event(self) -> Result<ControlEvent, String> {
        match (self.action, self.token) {
            (ControlAction::Press, Some(token)) => Ok(ControlEvent::Press(token)),
            (ControlAction::Press, None) => Err("press requires a token".to_string()),
            (ControlAction::Release, _) => Ok(ControlEvent::Release),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    System,
    Telemetry,
    Command,
    DecodeError,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub kind: LogKind,
    pub message: String,
}

/// Broker connection as seen by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    pub connected: bool,
    pub broker: String,
    pub last_error: Option<String>,
    pub changed_at_ms: u64,
}

impl LinkState {
    pub fn disconnected(broker: impl Into<String>) -> Self {
        Self {
            connected: false,
            broker: broker.into(),
            last_error: None,
            changed_at_ms: 0,
        }
    }
}
