//! Trait abstraction for the telemetry link to enable testing

use async_trait::async_trait;

use crate::error::Result;

/// A line-oriented, bidirectional link to the flight computer
#[async_trait]
pub trait LineTransport: Send {
    /// Wait for the next complete line (without its terminator)
    ///
    /// Returns `Ok(None)` once the stream has ended. Must be cancel-safe:
    /// dropping the future never loses bytes of a partially received line.
    async fn read_line(&mut self) -> Result<Option<String>>;

    /// Write raw bytes upstream and flush
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Human-readable name of the link (device path)
    fn describe(&self) -> String;
}

/// Opens fresh transports, used for the first connect and every reconnect
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Open a new link
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    fn connect(&self) -> Result<Box<dyn LineTransport>>;
}
