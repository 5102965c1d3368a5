// Schema-driven access to radio memory images
//
// A layout written in a small C-like language is compiled into a `Schema`,
// which is then bound to a `MemoryMap` to read and write named fields.

pub mod bcd;
pub mod charset;
pub mod elements;
pub mod error;
pub mod layout;
pub mod parser;
pub mod path;
pub mod types;
pub mod view;

pub use charset::{Charset, StringCodec};
pub use error::{BitwiseError, ErrorKind, Result};
pub use layout::{FieldLayout, Schema};
pub use path::{parse_path, resolve_path, Segment};
pub use types::{BcdOrder, BitOrder, Endianness, IntKind, Primitive};
pub use view::{
    ArrayView, BcdArrayView, BcdView, BitView, CharArrayView, CharView, FieldView, IntView,
    StructView, View,
};
