// Byte-level transport used by clone-mode drivers

use super::comm::{Result, SerialError};

/// A bidirectional byte stream to a radio.
///
/// `read` behaves like a serial read with a timeout: it returns as soon as
/// `n` bytes have arrived, or whatever arrived before the timeout expired
/// (possibly nothing).
#[allow(async_fn_in_trait)]
pub trait ByteChannel {
    async fn read(&mut self, n: usize) -> Result<Vec<u8>>;

    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `n` bytes, failing with [`SerialError::ShortRead`] on timeout
    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let data = self.read(n).await?;
        if data.len() != n {
            return Err(SerialError::ShortRead {
                expected: n,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}
