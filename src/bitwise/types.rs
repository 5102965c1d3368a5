// Primitive type definitions for the layout language

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order of a multi-byte integer primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    pub fn is_big(&self) -> bool {
        matches!(self, Endianness::Big)
    }

    pub fn is_little(&self) -> bool {
        matches!(self, Endianness::Little)
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Big
    }
}

/// A fixed-width integer primitive (`u8`, `ul16`, `il24`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntKind {
    pub bytes: u8,
    pub signed: bool,
    pub endianness: Endianness,
}

impl IntKind {
    pub const U8: IntKind = IntKind::new(1, false, Endianness::Big);

    pub const fn new(bytes: u8, signed: bool, endianness: Endianness) -> Self {
        Self {
            bytes,
            signed,
            endianness,
        }
    }

    /// Width in bits
    pub fn bits(&self) -> u32 {
        self.bytes as u32 * 8
    }

    /// Smallest value representable by this primitive
    pub fn min(&self) -> i64 {
        if self.signed {
            -(1i64 << (self.bits() - 1))
        } else {
            0
        }
    }

    /// Largest value representable by this primitive
    pub fn max(&self) -> i64 {
        if self.signed {
            (1i64 << (self.bits() - 1)) - 1
        } else {
            (1i64 << self.bits()) - 1
        }
    }
}

/// Digit order for an array of packed BCD bytes.
///
/// `Big` (`bbcd`) puts the most significant digit pair in the first byte,
/// `Little` (`lbcd`) puts it in the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BcdOrder {
    Big,
    Little,
}

/// Bit numbering inside a byte for `bit`/`lbit` arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitOrder {
    /// `bit`: element 0 is the most significant bit of the first byte
    MsbFirst,
    /// `lbit`: element 0 is the least significant bit of the first byte
    LsbFirst,
}

impl BitOrder {
    /// Shift of element `index` within its byte
    pub fn shift(&self, index: usize) -> u32 {
        match self {
            BitOrder::MsbFirst => 7 - (index % 8) as u32,
            BitOrder::LsbFirst => (index % 8) as u32,
        }
    }
}

/// Every primitive keyword the layout language understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int(IntKind),
    Char,
    Bcd(BcdOrder),
    Bit(BitOrder),
}

impl Primitive {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        use Endianness::{Big, Little};

        let int = |bytes, signed, endianness| Some(Primitive::Int(IntKind::new(bytes, signed, endianness)));
        match keyword {
            "u8" => int(1, false, Big),
            "u16" => int(2, false, Big),
            "ul16" => int(2, false, Little),
            "u24" => int(3, false, Big),
            "ul24" => int(3, false, Little),
            "u32" => int(4, false, Big),
            "ul32" => int(4, false, Little),
            "i8" => int(1, true, Big),
            "i16" => int(2, true, Big),
            "il16" => int(2, true, Little),
            "i24" => int(3, true, Big),
            "il24" => int(3, true, Little),
            "i32" => int(4, true, Big),
            "il32" => int(4, true, Little),
            "char" => Some(Primitive::Char),
            "lbcd" => Some(Primitive::Bcd(BcdOrder::Little)),
            "bbcd" => Some(Primitive::Bcd(BcdOrder::Big)),
            "bit" => Some(Primitive::Bit(BitOrder::MsbFirst)),
            "lbit" => Some(Primitive::Bit(BitOrder::LsbFirst)),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Primitive::Int(kind) => match (kind.signed, kind.bytes, kind.endianness) {
                (false, 1, _) => "u8",
                (false, 2, Endianness::Big) => "u16",
                (false, 2, Endianness::Little) => "ul16",
                (false, 3, Endianness::Big) => "u24",
                (false, 3, Endianness::Little) => "ul24",
                (false, _, Endianness::Big) => "u32",
                (false, _, Endianness::Little) => "ul32",
                (true, 1, _) => "i8",
                (true, 2, Endianness::Big) => "i16",
                (true, 2, Endianness::Little) => "il16",
                (true, 3, Endianness::Big) => "i24",
                (true, 3, Endianness::Little) => "il24",
                (true, _, Endianness::Big) => "i32",
                (true, _, Endianness::Little) => "il32",
            },
            Primitive::Char => "char",
            Primitive::Bcd(BcdOrder::Little) => "lbcd",
            Primitive::Bcd(BcdOrder::Big) => "bbcd",
            Primitive::Bit(BitOrder::MsbFirst) => "bit",
            Primitive::Bit(BitOrder::LsbFirst) => "lbit",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
