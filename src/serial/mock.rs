// Mock serial port for testing without hardware

use super::channel::ByteChannel;
use super::comm::{Result, SerialConfig};
use std::collections::VecDeque;

/// Produces the radio's reply to each chunk the host writes
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Scripted stand-in for a serial port.
///
/// Bytes queued with [`push_read_data`](Self::push_read_data) or produced by
/// the responder are handed out by `read`. A read that cannot be satisfied
/// waits out the configured timeout (instantly under a paused tokio clock)
/// and returns what is available.
pub struct MockSerialPort {
    read_buffer: VecDeque<u8>,
    written: Vec<u8>,
    responder: Option<Responder>,
    config: SerialConfig,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self {
            read_buffer: VecDeque::new(),
            written: Vec::new(),
            responder: None,
            config: SerialConfig::default(),
        }
    }

    /// Answer every write with `responder`
    pub fn with_responder(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    pub fn push_read_data(&mut self, data: &[u8]) {
        self.read_buffer.extend(data);
    }

    /// Everything the host has written so far
    pub fn get_written_data(&self) -> &[u8] {
        &self.written
    }

    pub fn was_written(&self, expected: &[u8]) -> bool {
        self.written
            .windows(expected.len())
            .any(|window| window == expected)
    }

    pub fn bytes_available(&self) -> usize {
        self.read_buffer.len()
    }
}

impl Default for MockSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteChannel for MockSerialPort {
    async fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.read_buffer.len() < n {
            tokio::time::sleep(self.config.timeout).await;
        }
        let count = n.min(self.read_buffer.len());
        Ok(self.read_buffer.drain(..count).collect())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.extend_from_slice(data);
        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(data);
            self.read_buffer.extend(reply);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::SerialError;

    #[tokio::test(start_paused = true)]
    async fn test_mock_serial_basic() {
        let mut port = MockSerialPort::new();
        port.push_read_data(b"Hello");

        assert_eq!(port.read_exact(5).await.unwrap(), b"Hello");

        port.write(b"World").await.unwrap();
        assert_eq!(port.get_written_data(), b"World");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_serial_timeout() {
        let mut port = MockSerialPort::new();
        let start = tokio::time::Instant::now();

        assert!(port.read(5).await.unwrap().is_empty());
        assert!(start.elapsed() >= SerialConfig::default().timeout);
        assert!(matches!(
            port.read_exact(5).await,
            Err(SerialError::ShortRead { expected: 5, actual: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_serial_partial_read() {
        let mut port = MockSerialPort::new();
        port.push_read_data(b"Hi");

        assert_eq!(port.read(5).await.unwrap(), b"Hi");
        assert_eq!(port.bytes_available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_responder() {
        let mut port = MockSerialPort::with_responder(|data| {
            if data == b"PING" {
                b"PONG".to_vec()
            } else {
                Vec::new()
            }
        });

        port.write(b"NOISE").await.unwrap();
        assert_eq!(port.bytes_available(), 0);

        port.write(b"PING").await.unwrap();
        assert_eq!(port.read(4).await.unwrap(), b"PONG");
        assert!(port.was_written(b"NOISEPING"));
        assert!(!port.was_written(b"NOTFOUND"));
    }
}
