use neobot_shared::{
    Channel, Classification, ColorTag, Icon, Severity, StatusLabel, TelemetryValue,
};

/// Map a channel's value to its display status. Total: anything it does not
/// recognise comes back as `Classification::UNKNOWN`.
pub fn classify(channel: Channel, value: &TelemetryValue) -> Classification {
    match channel {
        Channel::Temperature => numeric(value).map_or(Classification::UNKNOWN, temperature),
        Channel::Humidity => numeric(value).map_or(Classification::UNKNOWN, humidity),
        Channel::AirQuality => air_quality(value),
        Channel::Light => numeric(value).map_or(Classification::UNKNOWN, light),
        Channel::Accel | Channel::Gyro | Channel::Distance => Classification::UNKNOWN,
    }
}

/// Numbers as-is, numeric text coerced. Non-finite values are not usable.
fn numeric(value: &TelemetryValue) -> Option<f64> {
    let v = match value {
        TelemetryValue::Int(_) | TelemetryValue::Float(_) => value.as_f64(),
        TelemetryValue::Text(s) => s.trim().parse::<f64>().ok(),
        TelemetryValue::Vector(_) => None,
    }?;
    v.is_finite().then_some(v)
}

fn temperature(v: f64) -> Classification {
    if v < 15.0 {
        Classification::new(Icon::Cold, StatusLabel::Cold, Severity::Info, ColorTag::Blue)
    } else if v < 30.0 {
        Classification::new(Icon::Mild, StatusLabel::Moderate, Severity::Ok, ColorTag::Green)
    } else {
        Classification::new(Icon::Hot, StatusLabel::High, Severity::Warn, ColorTag::Red)
    }
}

fn humidity(v: f64) -> Classification {
    if v < 30.0 {
        Classification::new(Icon::Dry, StatusLabel::Dry, Severity::Warn, ColorTag::Yellow)
    } else if v <= 60.0 {
        Classification::new(Icon::Droplet, StatusLabel::Moderate, Severity::Ok, ColorTag::Green)
    } else {
        Classification::new(Icon::Wave, StatusLabel::High, Severity::Warn, ColorTag::Red)
    }
}

/// Any text other than the two known levels reads as Poor; a non-text value
/// is a shape mismatch, not a reading.
fn air_quality(value: &TelemetryValue) -> Classification {
    let Some(level) = value.as_text() else {
        return Classification::UNKNOWN;
    };
    match level {
        "Good" => {
            Classification::new(Icon::Leaf, StatusLabel::Good, Severity::Ok, ColorTag::Green)
        }
        "Moderate" => {
            Classification::new(Icon::Fog, StatusLabel::Moderate, Severity::Warn, ColorTag::Yellow)
        }
        _ => Classification::new(Icon::Smoke, StatusLabel::Poor, Severity::Warn, ColorTag::Red),
    }
}

fn light(v: f64) -> Classification {
    if v == 0.0 {
        Classification::new(Icon::Sun, StatusLabel::Safe, Severity::Ok, ColorTag::Green)
    } else if v == 1.0 {
        Classification::new(Icon::Moon, StatusLabel::Risk, Severity::Info, ColorTag::Blue)
    } else {
        Classification::UNKNOWN
    }
}
