// Serial communication module for radio I/O
pub mod channel;
pub mod comm;

#[cfg(test)]
pub mod mock;

pub use channel::ByteChannel;
pub use comm::{list_ports, SerialConfig, SerialError, SerialPort};
