//! # Session State Module
//!
//! Live state derived from the telemetry stream.
//!
//! This module handles:
//! - Reconstructing elapsed time from the device millisecond counter
//! - Fixed-window, index-aligned channel buffers
//! - Tri-state status flags, including the derived lockout flag
//! - Rising-edge event markers with per-kind retention
//! - Total, idempotent reset and renderer snapshots

pub mod ring;
pub mod timebase;
pub mod channels;
pub mod flags;
pub mod events;
pub mod snapshot;
pub mod session_state;

pub use channels::{ChannelStore, MISSING_VALUE};
pub use events::{Event, EventDetector};
pub use flags::{FlagEngine, FlagTransition, TriState};
pub use session_state::{IngestOutcome, SessionState};
pub use snapshot::{LinkStatus, RawLine, SessionSnapshot};
pub use timebase::{TimeBase, TimeStep};
