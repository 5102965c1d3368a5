// chirp-bitwise: schema-driven memory images for radio clone-mode drivers
// Copyright 2024 - Licensed under GPLv3

pub mod bitwise;
pub mod core;
pub mod drivers;
pub mod formats;
pub mod memmap;
pub mod serial;

// Re-export commonly used types
pub use bitwise::{BitwiseError, FieldLayout, FieldView, Schema, StringCodec, StructView, View};
pub use core::{
    constants::*,
    memory::{Duplex, Memory, ToneMode},
};
pub use drivers::{list_drivers, CloneModeRadio, Radio, RadioError};
pub use formats::{load_img, save_img, Metadata};
pub use memmap::MemoryMap;
pub use serial::{ByteChannel, SerialConfig, SerialPort};

/// Crate version, written into `.img` metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
