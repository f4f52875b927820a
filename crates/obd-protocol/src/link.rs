//! Serial link to the adapter
//!
//! The session only needs a byte stream it can flush stale input from, so the
//! physical port sits behind [`SerialLink`]. Real hardware goes through the
//! `serialport` builder re-exported by `tokio-serial`, opened in blocking mode
//! because the acquisition loop runs on its own thread.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;
use tokio_serial::{ClearBuffer, SerialPort};
use tracing::info;

/// Byte stream to an AT-command adapter
pub trait SerialLink: Read + Write + Send {
    /// Throw away anything the adapter sent that nobody asked for
    fn discard_input(&mut self) -> std::io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(std::io::Error::from)
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,
    /// Baud rate for serial communication
    pub baud_rate: u32,
    /// Hard limit for one command/response round trip
    pub response_timeout_ms: u64,
    /// Read timeout of the port itself; bounds each poll for the prompt
    pub read_poll_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
            response_timeout_ms: 5000,
            read_poll_ms: 100,
        }
    }
}

impl LinkConfig {
    /// Response timeout as a duration
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Open the configured serial device
    pub fn open_serial(&self) -> Result<Box<dyn SerialLink>, ObdError> {
        info!(
            "Opening serial link {} at {} baud",
            self.device, self.baud_rate
        );
        let port = tokio_serial::new(&self.device, self.baud_rate)
            .timeout(Duration::from_millis(self.read_poll_ms))
            .open()?;
        Ok(Box::new(port))
    }
}
