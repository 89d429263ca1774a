//! # Telemetry Line Protocol Module
//!
//! Implementation of the flight computer's ASCII telemetry line protocol.
//!
//! This module handles:
//! - Recognized keys (timestamp, state name, device events) and wire constants
//! - Typed field values (number or opaque text)
//! - Error-tolerant decoding of one `key:value,key:value` line into a record

pub mod keys;
pub mod decoder;

pub use decoder::decode;
pub use keys::{DeviceEvent, FieldValue, Fields, KnownKey, RawRecord};
