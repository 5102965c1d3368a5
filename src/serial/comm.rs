// Serial port transport
// Wraps the serialport crate behind the async ByteChannel interface

use super::channel::ByteChannel;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::trace;

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Port not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (e.g., 9600, 19200, 38400)
    pub baud_rate: u32,

    pub data_bits: serialport::DataBits,

    pub stop_bits: serialport::StopBits,

    pub parity: serialport::Parity,

    pub flow_control: serialport::FlowControl,

    /// How long a read waits for the requested bytes
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: serialport::DataBits::Eight,
            stop_bits: serialport::StopBits::One,
            parity: serialport::Parity::None,
            flow_control: serialport::FlowControl::None,
            timeout: Duration::from_secs(2),
        }
    }
}

impl SerialConfig {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set hardware flow control (RTS/CTS)
    pub fn with_hardware_flow(mut self) -> Self {
        self.flow_control = serialport::FlowControl::Hardware;
        self
    }
}

/// Poll interval of the underlying blocking port
const POLL: Duration = Duration::from_millis(10);

/// Async serial port wrapper
pub struct SerialPort {
    port: Option<Box<dyn serialport::SerialPort>>,
    config: SerialConfig,
    port_name: String,
}

impl SerialPort {
    pub fn open(port_name: &str, config: SerialConfig) -> Result<Self> {
        let mut port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .timeout(POLL)
            .open()?;

        // Most programming cables power their level shifter from DTR/RTS
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);

        Ok(Self {
            port: Some(port),
            config,
            port_name: port_name.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Discard anything buffered in either direction
    pub fn clear_all(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;
        port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    pub fn close(mut self) {
        self.port.take();
    }
}

impl ByteChannel for SerialPort {
    async fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.timeout;
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;
        let mut buf = vec![0u8; n];
        let mut total = 0;

        while total < n {
            match port.read(&mut buf[total..]) {
                Ok(0) => {
                    return Err(SerialError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Port closed",
                    )))
                }
                Ok(count) => total += count,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    sleep(POLL).await;
                }
                Err(e) => return Err(SerialError::Io(e)),
            }
        }

        buf.truncate(total);
        trace!("{}: read {} of {} bytes", self.port_name, total, n);
        Ok(buf)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;
        port.write_all(data)?;
        port.flush()?;
        trace!("{}: wrote {} bytes", self.port_name, data.len());
        Ok(())
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
