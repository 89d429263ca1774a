//! Immutable copies of session state handed to renderers.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;

use super::events::Event;
use super::flags::TriState;
use crate::protocol::{FieldValue, Fields};

/// Health of the link to the device, for the status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Transport open, lines flowing (or merely quiet)
    Connected,
    /// Transport failed, reopen pending
    Reconnecting,
    /// Session closed; terminal
    Closed,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkStatus::Connected => "connected",
            LinkStatus::Reconnecting => "reconnecting",
            LinkStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One line as received, for the raw monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawLine {
    pub received_at: DateTime<Local>,
    pub text: String,
}

/// Internally consistent copy of the whole session
///
/// `time_seconds` and every entry of `channels` always have the same length.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: LinkStatus,
    pub time_seconds: Vec<f64>,
    pub channels: BTreeMap<String, Vec<f64>>,
    pub flags: BTreeMap<String, TriState>,
    pub last_values: Fields,
    pub events: BTreeMap<String, Vec<Event>>,
    pub raw_lines: Vec<RawLine>,
}

impl SessionSnapshot {
    /// Elapsed seconds of the newest sample
    pub fn elapsed(&self) -> Option<f64> {
        self.time_seconds.last().copied()
    }

    /// Latest numeric value of a field, `None` if unseen, text or NaN
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.last_values
            .get(name)
            .and_then(FieldValue::as_number)
            .filter(|v| !v.is_nan())
    }

    /// Latest text value of a field
    pub fn latest_text(&self, name: &str) -> Option<&str> {
        self.last_values.get(name).and_then(FieldValue::as_text)
    }

    /// Flag value; untracked names read as unknown
    pub fn flag(&self, name: &str) -> TriState {
        self.flags.get(name).copied().unwrap_or_default()
    }

    /// Number of samples in the time window
    pub fn sample_count(&self) -> usize {
        self.time_seconds.len()
    }
}
