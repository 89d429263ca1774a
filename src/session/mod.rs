//! # Session Module
//!
//! Connection lifecycle: one producer task per connection generation, snapshot
//! readers on any thread, and a fixed-backoff reconnect that keeps history.

pub mod cancel;
pub mod controller;

pub use cancel::{CancelToken, ProducerControl};
pub use controller::SessionController;
