//! # Telemetry Protocol Constants and Types
//!
//! Core definitions shared by the decoder and the session state.

use serde::Serialize;
use std::collections::BTreeMap;

/// Primary timestamp key (device milliseconds since its own boot)
pub const TIMESTAMP_KEY: &str = "ts_ms";

/// Short alias accepted for the timestamp key
pub const TIMESTAMP_KEY_SHORT: &str = "ts";

/// Key carrying out-of-band device events (`evt:soft_reset`)
pub const DEVICE_EVENT_KEY: &str = "evt";

/// Keys consumed by the decoder itself, never stored as fields
pub const RESERVED_KEYS: &[&str] = &[TIMESTAMP_KEY, TIMESTAMP_KEY_SHORT, DEVICE_EVENT_KEY];

/// Default state-name field (operating mode, always text)
pub const DEFAULT_STATE_FIELD: &str = "fc_state_str";

/// Default name of the lockout flag
pub const DEFAULT_LOCKOUT_FLAG: &str = "lockout";

/// State name that implies lockout when no explicit flag is sent
pub const DEFAULT_LOCKOUT_STATE: &str = "ABORT_LOCKOUT";

/// Optional marker prefix allowed on every key (teleplot style)
pub const FIELD_MARKER: char = '>';

/// Token separator within a line
pub const FIELD_SEPARATOR: char = ',';

/// Separator between key and value
pub const KEY_VALUE_SEPARATOR: char = ':';

/// Command line asking the flight computer to soft-reset itself
pub const SOFT_RESET_COMMAND: &[u8] = b"!cmd:soft_reset\n";

/// Field name to value mapping for one line
pub type Fields = BTreeMap<String, FieldValue>;

/// A single decoded field value
///
/// The protocol is open-ended: anything that parses as a number is a number,
/// everything else is kept verbatim as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric value
    Number(f64),
    /// Opaque text value
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value, `None` for text
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    /// Text view of the value, `None` for numbers
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => Some(s),
        }
    }
}

/// Out-of-band event announced by the device itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// `evt:soft_reset`
    SoftReset,
    /// `evt:hard_reset`
    HardReset,
    /// Any other `evt` value, carried for logging only
    Other(String),
}

impl DeviceEvent {
    /// Parse the value of an `evt` token (case-insensitive)
    pub fn from_value(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "soft_reset" => DeviceEvent::SoftReset,
            "hard_reset" => DeviceEvent::HardReset,
            _ => DeviceEvent::Other(value.to_string()),
        }
    }

    /// Whether this event means the device restarted and history is stale
    pub fn is_reset(&self) -> bool {
        matches!(self, DeviceEvent::SoftReset | DeviceEvent::HardReset)
    }
}

/// Classification of a key into the handful the decoder treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownKey {
    /// `ts_ms` / `ts`
    Timestamp,
    /// The configured state-name field
    StateName,
    /// `evt`
    DeviceEvent,
    /// Everything else: numeric channel or opaque text
    Other,
}

impl KnownKey {
    /// Classify `key` given the configured state-name field
    pub fn classify(key: &str, state_field: &str) -> Self {
        match key {
            TIMESTAMP_KEY | TIMESTAMP_KEY_SHORT => KnownKey::Timestamp,
            DEVICE_EVENT_KEY => KnownKey::DeviceEvent,
            k if k == state_field => KnownKey::StateName,
            _ => KnownKey::Other,
        }
    }
}

/// One decoded telemetry line
///
/// Produced fresh per line and consumed immediately by the session state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// Device timestamp in milliseconds, if the line carried a valid one
    pub timestamp_ms: Option<f64>,
    /// Every other salvageable field
    pub fields: Fields,
    /// Device event announced on this line, if any
    pub device_event: Option<DeviceEvent>,
}

impl RawRecord {
    /// True when nothing at all could be salvaged from the line
    pub fn is_empty(&self) -> bool {
        self.timestamp_ms.is_none() && self.fields.is_empty() && self.device_event.is_none()
    }
}
