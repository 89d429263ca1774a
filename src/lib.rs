//! # Flight Telemetry Library
//!
//! Live ingestion of flight computer telemetry over a serial link.
//!
//! This library provides the core shared by every dashboard front-end: a tolerant
//! `key:value` line decoder, a reboot-aware time base, index-aligned channel
//! buffers, tri-state status flags, rising-edge event markers, and a session
//! controller that owns the transport and survives disconnects. Renderers only
//! ever see immutable [`state::SessionSnapshot`] copies.

pub mod config;
pub mod error;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod state;
