// Shared reference tables and the channel record drivers exchange
pub mod constants;
pub mod memory;

pub use constants::*;
pub use memory::{Duplex, Memory, MemoryError, ToneMode};
