use crate::error::DecodeError;
use neobot_shared::{Channel, PayloadShape, TelemetryValue, Vector3};

/// Decode a raw MQTT payload for `topic`.
pub fn decode_bytes(topic: &str, payload: &[u8]) -> Result<TelemetryValue, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8 {
        topic: topic.to_string(),
    })?;
    decode(topic, text)
}

/// Decode `payload` according to the shape of the channel that owns `topic`.
pub fn decode(topic: &str, payload: &str) -> Result<TelemetryValue, DecodeError> {
    let channel =
        Channel::from_topic(topic).ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

    match channel.shape() {
        PayloadShape::Number => decode_number(payload).ok_or_else(|| DecodeError::InvalidNumber {
            topic: topic.to_string(),
            payload: payload.to_string(),
        }),
        PayloadShape::Text => Ok(TelemetryValue::Text(payload.to_string())),
        PayloadShape::NumberOrText => {
            Ok(decode_number(payload).unwrap_or_else(|| TelemetryValue::Text(payload.to_string())))
        }
        PayloadShape::Vector3 => decode_vector(topic, payload).map(TelemetryValue::Vector),
    }
}

/// Float when the payload has a decimal point, integer otherwise.
fn decode_number(payload: &str) -> Option<TelemetryValue> {
    let trimmed = payload.trim();
    if trimmed.contains('.') {
        trimmed.parse::<f64>().ok().map(TelemetryValue::Float)
    } else {
        trimmed.parse::<i64>().ok().map(TelemetryValue::Int)
    }
}

fn decode_vector(topic: &str, payload: &str) -> Result<Vector3, DecodeError> {
    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() != 3 {
        return Err(DecodeError::FieldCount {
            topic: topic.to_string(),
            payload: payload.to_string(),
            found: fields.len(),
        });
    }

    let mut out = [0.0f64; 3];
    for (index, field) in fields.iter().enumerate() {
        out[index] = field
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::InvalidField {
                topic: topic.to_string(),
                payload: payload.to_string(),
                index,
            })?;
    }
    Ok(Vector3::new(out[0], out[1], out[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(channel: Channel) -> &'static str {
        channel.topic()
    }

    #[test]
    fn scalar_payloads_pick_float_or_int_by_decimal_point() {
        assert_eq!(
            decode(topic(Channel::Temperature), "23.5"),
            Ok(TelemetryValue::Float(23.5))
        );
        assert_eq!(
            decode(topic(Channel::Humidity), "48"),
            Ok(TelemetryValue::Int(48))
        );
        assert_eq!(
            decode(topic(Channel::Distance), " 112 "),
            Ok(TelemetryValue::Int(112))
        );
    }

    #[test]
    fn bad_scalar_payload_is_a_decode_error() {
        assert!(matches!(
            decode(topic(Channel::Temperature), "hot"),
            Err(DecodeError::InvalidNumber { .. })
        ));
        // "1e3" has no decimal point so the integer rule applies.
        assert!(decode(topic(Channel::Distance), "1e3").is_err());
        assert!(decode(topic(Channel::Humidity), "").is_err());
        assert!(decode(topic(Channel::Temperature), "nan").is_err());
    }

    #[test]
    fn vector_payloads_parse_three_floats() {
        assert_eq!(
            decode(topic(Channel::Accel), "0.12,-9.81,0.5"),
            Ok(TelemetryValue::Vector(Vector3::new(0.12, -9.81, 0.5)))
        );
        assert_eq!(
            decode(topic(Channel::Gyro), "1, 2 ,3"),
            Ok(TelemetryValue::Vector(Vector3::new(1.0, 2.0, 3.0)))
        );
    }

    #[test]
    fn vector_payloads_need_exactly_three_numeric_fields() {
        assert!(matches!(
            decode(topic(Channel::Accel), "1.0,2.0"),
            Err(DecodeError::FieldCount { found: 2, .. })
        ));
        assert!(matches!(
            decode(topic(Channel::Gyro), "1,2,3,4"),
            Err(DecodeError::FieldCount { found: 4, .. })
        ));
        assert!(matches!(
            decode(topic(Channel::Gyro), "1.0,abc,3.0"),
            Err(DecodeError::InvalidField { index: 1, .. })
        ));
        assert!(matches!(
            decode(topic(Channel::Accel), "1.0,2.0,"),
            Err(DecodeError::InvalidField { index: 2, .. })
        ));
    }

    #[test]
    fn text_channels_pass_payload_through() {
        assert_eq!(
            decode(topic(Channel::AirQuality), "Good"),
            Ok(TelemetryValue::Text("Good".into()))
        );
        assert_eq!(
            decode(topic(Channel::AirQuality), "4.2"),
            Ok(TelemetryValue::Text("4.2".into()))
        );
    }

    #[test]
    fn light_prefers_numbers_and_falls_back_to_text() {
        assert_eq!(decode(topic(Channel::Light), "0"), Ok(TelemetryValue::Int(0)));
        assert_eq!(
            decode(topic(Channel::Light), "Day"),
            Ok(TelemetryValue::Text("Day".into()))
        );
    }

    #[test]
    fn unknown_topics_and_bad_utf8_are_rejected() {
        assert_eq!(
            decode("foo/bar", "1"),
            Err(DecodeError::UnknownTopic("foo/bar".into()))
        );
        assert!(matches!(
            decode_bytes(topic(Channel::Temperature), &[0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8 { .. })
        ));
        assert_eq!(
            decode_bytes(topic(Channel::Temperature), b"19.0"),
            Ok(TelemetryValue::Float(19.0))
        );
    }
}
