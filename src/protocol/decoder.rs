//! # Telemetry Line Decoder
//!
//! Decodes one raw telemetry line into a [`RawRecord`].
//!
//! Decoding never fails. Each malformed token is dropped on its own so that a
//! garbled byte in one field cannot take the rest of the line with it.

use super::keys::*;

/// Decode a telemetry line using the default state-name field
///
/// # Arguments
///
/// * `line` - One line of text, without its terminating newline
///
/// # Returns
///
/// * `RawRecord` - Salvaged timestamp, fields and device event (possibly empty)
///
/// # Examples
///
/// ```
/// use flight_telemetry::protocol::{decode, FieldValue};
///
/// let record = decode("ts_ms:100, bad_token, vbat_v:4.1,");
/// assert_eq!(record.timestamp_ms, Some(100.0));
/// assert_eq!(record.fields.get("vbat_v"), Some(&FieldValue::Number(4.1)));
/// assert_eq!(record.fields.len(), 1);
/// ```
pub fn decode(line: &str) -> RawRecord {
    decode_with_state_field(line, DEFAULT_STATE_FIELD)
}

/// Decode a telemetry line, treating `state_field` as the text-only state name
pub fn decode_with_state_field(line: &str, state_field: &str) -> RawRecord {
    let mut record = RawRecord::default();

    let segments = line
        .split(FIELD_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty());

    for segment in segments {
        // Tokens without a separator are noise
        let Some((key, value)) = segment.split_once(KEY_VALUE_SEPARATOR) else {
            continue;
        };

        let key = key.trim();
        let key = key.strip_prefix(FIELD_MARKER).map(str::trim).unwrap_or(key);
        if key.is_empty() {
            continue;
        }
        let value = value.trim();

        match KnownKey::classify(key, state_field) {
            KnownKey::Timestamp => {
                // Last timestamp token wins; a garbled one leaves the line untimed
                record.timestamp_ms = parse_number(value).filter(|ts| ts.is_finite());
            }
            KnownKey::StateName => {
                record
                    .fields
                    .insert(key.to_string(), FieldValue::Text(value.to_string()));
            }
            KnownKey::DeviceEvent => {
                record.device_event = Some(DeviceEvent::from_value(value));
            }
            KnownKey::Other => {
                let parsed = match parse_number(value) {
                    Some(v) => FieldValue::Number(v),
                    None => FieldValue::Text(value.to_string()),
                };
                record.fields.insert(key.to_string(), parsed);
            }
        }
    }

    record
}

/// Parse a numeric token, `None` if it is not a number
fn parse_number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok()
}
