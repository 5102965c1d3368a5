// Memory map holding a radio's binary image

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryMapError {
    #[error("Index out of bounds: {index} (size {size})")]
    IndexOutOfBounds { index: usize, size: usize },
}

pub type Result<T> = std::result::Result<T, MemoryMapError>;

/// A fixed-size byte image.
///
/// Writes go through a shared reference so that any number of schema views
/// can be bound to one image at the same time. The map is owned by one
/// driver and is not meant to be shared across threads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryMap {
    data: RefCell<Vec<u8>>,
}

impl MemoryMap {
    /// Create a new memory map from bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: RefCell::new(data),
        }
    }

    /// Create a new memory map with a specific size, filled with zeros
    pub fn new_with_size(size: usize) -> Self {
        Self::filled(size, 0x00)
    }

    /// Create a new memory map of `size` copies of `byte`
    pub fn filled(size: usize, byte: u8) -> Self {
        Self::new(vec![byte; size])
    }

    /// Create a new empty memory map
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }

    fn check(&self, end: usize) -> Result<()> {
        let size = self.len();
        if end > size {
            return Err(MemoryMapError::IndexOutOfBounds { index: end, size });
        }
        Ok(())
    }

    /// Copy `length` bytes from `start`, or everything from `start` when `length` is None
    pub fn get(&self, start: usize, length: Option<usize>) -> Result<Vec<u8>> {
        self.check(start)?;
        let data = self.data.borrow();
        match length {
            Some(len) => {
                self.check(start + len)?;
                Ok(data[start..start + len].to_vec())
            }
            None => Ok(data[start..].to_vec()),
        }
    }

    pub fn get_byte(&self, pos: usize) -> Result<u8> {
        self.data
            .borrow()
            .get(pos)
            .copied()
            .ok_or(MemoryMapError::IndexOutOfBounds {
                index: pos,
                size: self.len(),
            })
    }

    /// Set a byte at position @pos to @value
    pub fn set_byte(&self, pos: usize, value: u8) -> Result<()> {
        self.check(pos + 1)?;
        self.data.borrow_mut()[pos] = value;
        Ok(())
    }

    /// Overwrite `bytes.len()` bytes starting at `pos`
    pub fn set_bytes(&self, pos: usize, bytes: &[u8]) -> Result<()> {
        let end = pos + bytes.len();
        self.check(end)?;
        self.data.borrow_mut()[pos..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Slice assignment: writes all of `value` at `range.start`, whatever the range's length
    pub fn set_range(&self, range: Range<usize>, value: &[u8]) -> Result<()> {
        if range.len() != value.len() {
            debug!(
                "Writing {} bytes into a {}-byte range at {:#06x}",
                value.len(),
                range.len(),
                range.start
            );
        }
        self.set_bytes(range.start, value)
    }

    /// Set every byte to `byte`
    pub fn fill(&self, byte: u8) {
        self.data.borrow_mut().fill(byte);
    }

    pub fn fill_range(&self, start: usize, len: usize, byte: u8) -> Result<()> {
        self.check(start + len)?;
        self.data.borrow_mut()[start..start + len].fill(byte);
        Ok(())
    }

    /// Get the entire memory map as raw bytes
    pub fn get_packed(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data.into_inner()
    }

    /// Truncate the memory map to @size bytes
    pub fn truncate(&mut self, size: usize) {
        self.data.get_mut().truncate(size);
    }

    /// Get a printable hex representation of the memory map
    pub fn printable(&self, start: Option<usize>, end: Option<usize>) -> String {
        let data = self.data.borrow();
        let end = end.unwrap_or(data.len()).min(data.len());
        let start = start.unwrap_or(0).min(end);
        hexdump(&data[start..end], start)
    }
}

impl From<Vec<u8>> for MemoryMap {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for MemoryMap {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl fmt::Display for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryMap({} bytes)", self.len())
    }
}

/// Create a hex dump of bytes (similar to hexdump -C)
fn hexdump(data: &[u8], base: usize) -> String {
    let mut output = String::new();

    for (i, chunk) in data.chunks(16).enumerate() {
        output.push_str(&format!("{:08x}  ", base + i * 16));

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                output.push(' ');
            }
            output.push_str(&format!("{:02x} ", byte));
        }

        for j in chunk.len()..16 {
            if j == 8 {
                output.push(' ');
            }
            output.push_str("   ");
        }

        output.push_str(" |");
        output.extend(chunk.iter().map(|&b| {
            if (0x20..=0x7e).contains(&b) {
                b as char
            } else {
                '.'
            }
        }));
        output.push_str("|\n");
    }

    output
}
