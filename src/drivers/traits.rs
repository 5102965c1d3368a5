// Radio driver traits

use crate::bitwise::BitwiseError;
use crate::core::{Memory, MemoryError};
use crate::memmap::{MemoryMap, MemoryMapError};
use crate::serial::{ByteChannel, SerialError};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadioError {
    #[error("Communication error: {source}")]
    Communication {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Bitwise(#[from] BitwiseError),

    #[error(transparent)]
    MemoryMap(#[from] MemoryMapError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Invalid memory location: {0}")]
    InvalidMemory(u32),

    #[error("Radio did not respond")]
    NoResponse,

    #[error("Invalid response from radio: {0}")]
    InvalidResponse(String),

    #[error("Timeout waiting for radio")]
    Timeout,

    #[error("No memory image loaded")]
    NoImage,

    #[error("Radio error: {0}")]
    Radio(String),
}

impl From<SerialError> for RadioError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::Timeout(_) | SerialError::ShortRead { .. } => RadioError::Timeout,
            other => RadioError::Communication {
                source: Box::new(other),
            },
        }
    }
}

pub type RadioResult<T> = std::result::Result<T, RadioError>;

/// Progress callback for download/upload operations
pub type StatusCallback = Box<dyn Fn(&Status) + Send + Sync>;

/// Base trait for all radio drivers
pub trait Radio {
    fn vendor(&self) -> &str;

    fn model(&self) -> &str;

    /// Get a printable name for this radio
    fn get_name(&self) -> String {
        format!("{} {}", self.vendor(), self.model())
    }

    /// Lowest and highest channel number, inclusive
    fn memory_bounds(&self) -> (u32, u32);

    /// Get a memory from the radio
    /// Returns None if the memory is empty
    fn get_memory(&self, number: u32) -> RadioResult<Option<Memory>>;

    fn set_memory(&mut self, memory: &Memory) -> RadioResult<()>;

    /// Delete a memory (mark as empty)
    fn delete_memory(&mut self, number: u32) -> RadioResult<()> {
        self.set_memory(&Memory::new_empty(number))
    }

    /// All non-empty memories in channel order
    fn get_memories(&self) -> RadioResult<Vec<Memory>> {
        let (start, end) = self.memory_bounds();
        let mut memories = Vec::new();

        for i in start..=end {
            if let Some(mem) = self.get_memory(i)? {
                memories.push(mem);
            }
        }

        Ok(memories)
    }
}

/// Trait for radios that transfer their whole memory image at once
#[allow(async_fn_in_trait)]
pub trait CloneModeRadio: Radio {
    /// Size of the radio's image in bytes
    fn get_memsize(&self) -> usize;

    /// Download the radio's image (radio-to-PC clone)
    async fn sync_in<C: ByteChannel>(
        &mut self,
        port: &mut C,
        status_fn: Option<StatusCallback>,
    ) -> RadioResult<MemoryMap>;

    /// Upload an image to the radio (PC-to-radio clone)
    async fn sync_out<C: ByteChannel>(
        &mut self,
        port: &mut C,
        mmap: &MemoryMap,
        status_fn: Option<StatusCallback>,
    ) -> RadioResult<()>;

    /// Adopt an image loaded from a file or a download
    fn process_mmap(&mut self, mmap: MemoryMap) -> RadioResult<()>;

    /// Check if this driver matches a given file
    fn match_model(data: &[u8], filename: &str) -> bool
    where
        Self: Sized;
}

/// Status information for progress reporting
#[derive(Debug, Clone)]
pub struct Status {
    pub current: usize,
    pub max: usize,
    pub message: String,
}

impl Status {
    pub fn new(current: usize, max: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            max,
            message: message.into(),
        }
    }

    pub fn percent(&self) -> f32 {
        if self.max == 0 {
            return 100.0;
        }
        (self.current as f32 / self.max as f32) * 100.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} - {:.1}%)",
            self.message,
            self.current,
            self.max,
            self.percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_status() {
        let status = Status::new(50, 100, "Downloading");
        assert_eq!(status.percent(), 50.0);
        assert_eq!(status.to_string(), "Downloading (50/100 - 50.0%)");
        assert_eq!(Status::new(0, 0, "Idle").percent(), 100.0);
    }

    #[test]
    fn test_serial_errors_keep_their_cause() {
        let err = RadioError::from(SerialError::NotOpen);
        assert!(matches!(err, RadioError::Communication { .. }));
        assert_eq!(err.source().map(|s| s.to_string()), Some("Port not open".to_string()));

        let err = RadioError::from(SerialError::ShortRead {
            expected: 4,
            actual: 0,
        });
        assert!(matches!(err, RadioError::Timeout));
    }

    #[test]
    fn test_bitwise_errors_convert() {
        let err: RadioError = BitwiseError::InvalidBcd {
            path: "memory[0].rxfreq".to_string(),
            byte: 0xAB,
        }
        .into();
        assert!(matches!(err, RadioError::Bitwise(_)));
    }
}
