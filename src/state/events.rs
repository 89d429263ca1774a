//! # Event Detector
//!
//! Turns rising edges of selected flags into timestamped annotation events.
//!
//! Each event kind keeps its own bounded history: rare one-shot events such as
//! liftoff keep only a couple of entries while chatty ones keep many. When a
//! kind is over its cap its own oldest entry is dropped.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::flags::TriState;
use super::ring::RingBuffer;
use crate::config::EventConfig;

/// Short plot labels for the well-known event kinds
const EVENT_CODES: &[(&str, &str)] = &[
    ("liftoff_det", "LIF"),
    ("burnout_det", "BO"),
    ("tilt_latch", "TLT"),
    ("baro_agree", "BAR"),
];

/// A detected rising edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Flag name that rose
    pub kind: String,
    /// Short annotation label
    pub code: String,
    /// Elapsed seconds of the sample that carried the edge
    pub at: f64,
}

/// Annotation label for an event kind
///
/// Known kinds map to their fixed code, anything else to its first three
/// characters upper-cased.
pub fn event_code(kind: &str) -> String {
    EVENT_CODES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| kind.chars().take(3).collect::<String>().to_uppercase())
}

/// Per-kind bounded event history
#[derive(Debug, Clone)]
pub struct EventDetector {
    events: BTreeMap<String, RingBuffer<Event>>,
}

impl EventDetector {
    /// Create an empty history for each configured event kind
    pub fn new(config: &EventConfig) -> Self {
        Self {
            events: config
                .tracked
                .iter()
                .map(|kind| (kind.clone(), RingBuffer::new(config.limit_for(kind))))
                .collect(),
        }
    }

    /// Observe one flag value change
    ///
    /// Records an event only for a known-false to known-true transition of a
    /// tracked kind.
    ///
    /// # Returns
    ///
    /// * `Option<&Event>` - The event just recorded, if any
    pub fn observe(
        &mut self,
        flag_name: &str,
        previous: TriState,
        current: TriState,
        at: f64,
    ) -> Option<&Event> {
        if previous != TriState::False || current != TriState::True {
            return None;
        }

        let history = self.events.get_mut(flag_name)?;
        history.push(Event {
            kind: flag_name.to_string(),
            code: event_code(flag_name),
            at,
        });
        debug!("Event {} at {:.3}s", flag_name, at);
        history.back()
    }

    /// Events of one kind, oldest first
    pub fn events_of(&self, kind: &str) -> Vec<Event> {
        self.events.get(kind).map(|h| h.to_vec()).unwrap_or_default()
    }

    /// Copy of every kind's history
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Event>> {
        self.events
            .iter()
            .map(|(kind, history)| (kind.clone(), history.to_vec()))
            .collect()
    }

    /// Total number of retained events
    pub fn len(&self) -> usize {
        self.events.values().map(|h| h.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every event, keeping the kinds and their caps
    pub fn clear(&mut self) {
        for history in self.events.values_mut() {
            history.clear();
        }
    }
}
