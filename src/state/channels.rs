//! # Channel Store
//!
//! Fixed-capacity time axis plus one buffer per tracked numeric channel.
//!
//! Every accepted line appends exactly one value to the time buffer and to
//! every channel buffer, so all buffers always have the same length and the
//! same eviction point.

use serde::Serialize;
use std::collections::BTreeMap;

use super::ring::RingBuffer;
use crate::protocol::Fields;

/// Placeholder for a sample that was absent, non-numeric or non-finite
pub const MISSING_VALUE: f64 = f64::NAN;

/// One named channel buffer
#[derive(Debug, Clone)]
struct ChannelBuffer {
    name: String,
    samples: RingBuffer<f64>,
}

/// Copy of the time axis and every channel, oldest sample first
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelSnapshot {
    pub time: Vec<f64>,
    pub channels: BTreeMap<String, Vec<f64>>,
}

/// Index-aligned time and channel buffers
#[derive(Debug, Clone)]
pub struct ChannelStore {
    time: RingBuffer<f64>,
    channels: Vec<ChannelBuffer>,
}

impl ChannelStore {
    /// Create empty buffers of `window` samples for each named channel
    pub fn new<S: AsRef<str>>(window: usize, names: &[S]) -> Self {
        let channels = names
            .iter()
            .map(|name| ChannelBuffer {
                name: name.as_ref().to_string(),
                samples: RingBuffer::new(window),
            })
            .collect();

        Self {
            time: RingBuffer::new(window),
            channels,
        }
    }

    /// Append one sample to the time axis and every channel
    ///
    /// Channels missing from `fields`, or carrying text or a non-finite number,
    /// receive [`MISSING_VALUE`].
    pub fn append(&mut self, elapsed_seconds: f64, fields: &Fields) {
        self.time.push(elapsed_seconds);
        for channel in &mut self.channels {
            let value = fields
                .get(&channel.name)
                .and_then(|v| v.as_number())
                .filter(|v| v.is_finite())
                .unwrap_or(MISSING_VALUE);
            channel.samples.push(value);
        }
    }

    /// Copy out the current contents
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            time: self.time.to_vec(),
            channels: self
                .channels
                .iter()
                .map(|c| (c.name.clone(), c.samples.to_vec()))
                .collect(),
        }
    }

    /// Empty every buffer; the set of channels and the window are kept
    pub fn clear(&mut self) {
        self.time.clear();
        for channel in &mut self.channels {
            channel.samples.clear();
        }
    }

    /// Elapsed time of the newest sample
    pub fn last_elapsed(&self) -> Option<f64> {
        self.time.back().copied()
    }

    /// Number of samples currently held (same for every buffer)
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn window(&self) -> usize {
        self.time.capacity()
    }

    /// Tracked channel names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Length of one channel buffer, `None` if it is not tracked
    pub fn channel_len(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.samples.len())
    }
}
