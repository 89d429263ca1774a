//! # Session State
//!
//! Aggregate owner of everything derived from the telemetry stream and the
//! per-line pipeline that updates it:
//!
//! ```text
//! decode -> device reset? -> time base (reboot?) -> last values -> flags -> channels -> events
//! ```
//!
//! A reset (device reboot, device reset event, or operator request) returns
//! the state to exactly what [`SessionState::new`] builds.

use chrono::Local;
use tracing::{debug, info};

use super::channels::ChannelStore;
use super::events::EventDetector;
use super::flags::FlagEngine;
use super::ring::RingBuffer;
use super::snapshot::{LinkStatus, RawLine, SessionSnapshot};
use super::timebase::TimeBase;
use crate::config::Config;
use crate::protocol::decoder::decode_with_state_field;
use crate::protocol::{DeviceEvent, Fields};

/// What one ingested line did to the session
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Elapsed seconds assigned to the line
    pub elapsed: f64,
    /// The session was reset before the line was admitted
    pub reset: bool,
    /// Number of events recorded for this line
    pub events: usize,
}

/// All state derived from one telemetry stream
#[derive(Debug, Clone)]
pub struct SessionState {
    state_field: String,
    timebase: TimeBase,
    channels: ChannelStore,
    flags: FlagEngine,
    last_values: Fields,
    events: EventDetector,
    raw_lines: RingBuffer<RawLine>,
}

impl SessionState {
    /// Build empty state sized and named from the configuration
    pub fn new(config: &Config) -> Self {
        Self {
            state_field: config.flags.state_field.clone(),
            timebase: TimeBase::new(config.session.dt_guess_s, config.session.reboot_tolerance_ms),
            channels: ChannelStore::new(config.session.window, &config.channels.tracked),
            flags: FlagEngine::new(&config.flags),
            last_values: Fields::new(),
            events: EventDetector::new(&config.events),
            raw_lines: RingBuffer::new(config.session.raw_buffer),
        }
    }

    /// Run the full pipeline for one raw line
    pub fn ingest(&mut self, line: &str) -> IngestOutcome {
        let record = decode_with_state_field(line, &self.state_field);
        let mut reset = false;

        match &record.device_event {
            Some(event) if event.is_reset() => {
                info!("Device reported {:?}, clearing session", event);
                self.reset();
                reset = true;
            }
            Some(DeviceEvent::Other(value)) => debug!("Device event: {}", value),
            _ => {}
        }

        self.raw_lines.push(RawLine {
            received_at: Local::now(),
            text: line.to_string(),
        });

        let mut step = self
            .timebase
            .next_elapsed(record.timestamp_ms, self.channels.last_elapsed());
        if step.reboot_detected {
            info!(
                "Device timestamp rolled back ({:?} ms -> {:?} ms), starting new epoch",
                self.timebase.last_raw_ms(),
                record.timestamp_ms
            );
            self.reset();
            reset = true;
            // Keep the triggering line in the monitor
            self.raw_lines.push(RawLine {
                received_at: Local::now(),
                text: line.to_string(),
            });
            step = self.timebase.next_elapsed(record.timestamp_ms, None);
        }
        let elapsed = step.elapsed;

        self.last_values
            .extend(record.fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        let transitions = self.flags.update(&record.fields, &self.last_values);

        self.channels.append(elapsed, &record.fields);

        let events = transitions
            .iter()
            .filter(|t| {
                self.events
                    .observe(&t.name, t.previous, t.current, elapsed)
                    .is_some()
            })
            .count();

        IngestOutcome {
            elapsed,
            reset,
            events,
        }
    }

    /// Clear every buffer, flag, value, event and the time origin
    pub fn reset(&mut self) {
        self.timebase.reset();
        self.channels.clear();
        self.flags.reset();
        self.last_values.clear();
        self.events.clear();
        self.raw_lines.clear();
    }

    /// Copy the state out for a renderer
    pub fn snapshot(&self, status: LinkStatus) -> SessionSnapshot {
        let channels = self.channels.snapshot();
        SessionSnapshot {
            status,
            time_seconds: channels.time,
            channels: channels.channels,
            flags: self.flags.states(),
            last_values: self.last_values.clone(),
            events: self.events.snapshot(),
            raw_lines: self.raw_lines.to_vec(),
        }
    }

    pub fn channels(&self) -> &ChannelStore {
        &self.channels
    }

    pub fn flags(&self) -> &FlagEngine {
        &self.flags
    }

    pub fn events(&self) -> &EventDetector {
        &self.events
    }

    pub fn last_values(&self) -> &Fields {
        &self.last_values
    }

    pub fn timebase(&self) -> &TimeBase {
        &self.timebase
    }

    /// True when nothing has been admitted since construction or the last reset
    #[cfg(test)]
    pub fn is_pristine(&self) -> bool {
        self.channels.is_empty()
            && self.last_values.is_empty()
            && self.events.is_empty()
            && self.raw_lines.is_empty()
            && self.timebase.origin_ms().is_none()
            && self.timebase.last_raw_ms().is_none()
            && self.flags.states().values().all(|s| !s.is_known())
    }
}
