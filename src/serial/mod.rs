//! # Serial Communication Module
//!
//! Handles the serial link to the flight computer.
//!
//! This module handles:
//! - Opening the USB/UART port (8N1) from a list of candidate paths
//! - Framing the incoming byte stream into text lines
//! - Writing upstream commands (soft reset)
//! - Reopening the port for the session controller's reconnect path

pub mod port_trait;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{Result, TelemetryError};
pub use port_trait::{Connector, LineTransport};

/// Longest partial line kept while waiting for a newline
pub const MAX_LINE_BYTES: usize = 4096;

/// Initial receive buffer size
const READ_CHUNK: usize = 1024;

/// Line-framed link over any async byte stream
///
/// Bytes are accumulated until a `\n`; a trailing `\r` is stripped and
/// invalid UTF-8 is replaced rather than rejected.
pub struct SerialLink<S = tokio_serial::SerialStream> {
    stream: S,
    buffer: BytesMut,
    device_path: String,
}

impl<S> std::fmt::Debug for SerialLink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl<S> SerialLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream
    pub fn new(stream: S, device_path: impl Into<String>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            device_path: device_path.into(),
        }
    }

    /// Get the device path of the link
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split the next complete line off the buffer, if there is one
    fn take_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw = self.buffer.split_to(newline + 1);
        Some(Self::to_text(&raw))
    }

    fn to_text(raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        text.trim_end_matches(['\r', '\n']).to_string()
    }
}

#[async_trait]
impl<S> LineTransport for SerialLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            if self.buffer.len() > MAX_LINE_BYTES {
                warn!(
                    "Discarding {} bytes without a newline from {}",
                    self.buffer.len(),
                    self.device_path
                );
                self.buffer.clear();
            }

            self.buffer.reserve(READ_CHUNK);
            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| TelemetryError::Transport(format!("Failed to read {}: {}", self.device_path, e)))?;

            if read == 0 {
                // Flush an unterminated final line before reporting the end
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = self.buffer.split();
                return Ok(Some(Self::to_text(&rest)));
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| TelemetryError::Transport(format!("Failed to write {}: {}", self.device_path, e)))?;

        self.stream
            .flush()
            .await
            .map_err(|e| TelemetryError::Transport(format!("Failed to flush {}: {}", self.device_path, e)))?;

        debug!("Sent {} bytes to {}", data.len(), self.device_path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}

/// Opens the flight computer's serial port, trying each candidate path in order
#[derive(Debug, Clone)]
pub struct SerialConnector {
    paths: Vec<String>,
    baud_rate: u32,
}

impl SerialConnector {
    /// Create a connector for explicit paths
    pub fn new(paths: Vec<String>, baud_rate: u32) -> Self {
        Self { paths, baud_rate }
    }

    /// Create a connector from the `[serial]` configuration section
    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(config.candidate_paths(), config.baud_rate)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Open the first path that works
    ///
    /// # Returns
    ///
    /// * `Result<SerialLink>` - Connected link or error
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path tried
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_telemetry::serial::SerialConnector;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let connector = SerialConnector::new(vec!["/dev/ttyACM0".to_string()], 115200);
    ///     let link = connector.open()?;
    ///     println!("Connected to: {}", link.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(&self) -> Result<SerialLink> {
        for path in &self.paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, self.baud_rate) {
                Ok(port) => {
                    info!("Opened flight computer link at {} ({} baud)", path, self.baud_rate);
                    return Ok(SerialLink::new(port, path.as_str()));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(TelemetryError::SerialPortNotFound(self.paths.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

        // Stale bytes from before the open are never a whole line
        if let Err(e) = port.clear(tokio_serial::ClearBuffer::Input) {
            debug!("Could not clear input buffer on {}: {}", path, e);
        }

        Ok(port)
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<Box<dyn LineTransport>> {
        Ok(Box::new(self.open()?))
    }
}

/// List the serial ports present on this machine
///
/// # Returns
///
/// * `Result<Vec<String>>` - Port names with a short description where known
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TelemetryError::Serial(format!("Failed to list ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => format!(
                "{} (USB {:04x}:{:04x}{})",
                p.port_name,
                usb.vid,
                usb.pid,
                usb.product.map(|s| format!(" {}", s)).unwrap_or_default()
            ),
            _ => p.port_name,
        })
        .collect())
}
