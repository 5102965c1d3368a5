// Integer element codecs shared by every fixed-width primitive

use super::types::{Endianness, IntKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unsupported integer width: {0} bytes")]
    UnsupportedWidth(usize),
}

pub type Result<T> = std::result::Result<T, ElementError>;

/// Mask covering the low `bits` bits
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Read an unsigned integer of `data.len()` bytes
pub fn read_uint(data: &[u8], endianness: Endianness) -> Result<u64> {
    if data.is_empty() || data.len() > 8 {
        return Err(ElementError::UnsupportedWidth(data.len()));
    }

    let fold = |acc: u64, &byte: &u8| (acc << 8) | byte as u64;
    Ok(match endianness {
        Endianness::Big => data.iter().fold(0, fold),
        Endianness::Little => data.iter().rev().fold(0, fold),
    })
}

/// Write the low `dest.len()` bytes of `value` into `dest`
pub fn write_uint(value: u64, dest: &mut [u8], endianness: Endianness) {
    let len = dest.len();
    for (i, slot) in dest.iter_mut().enumerate() {
        let shift = match endianness {
            Endianness::Big => (len - 1 - i) * 8,
            Endianness::Little => i * 8,
        };
        *slot = (value >> shift) as u8;
    }
}

/// Interpret the low `bits` bits of `raw` as a two's complement number
pub fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let unused = 64 - bits;
    ((raw << unused) as i64) >> unused
}

/// Decode an integer primitive from the start of `data`
pub fn decode_int(kind: IntKind, data: &[u8]) -> Result<i64> {
    let width = kind.bytes as usize;
    if data.len() < width {
        return Err(ElementError::InsufficientData {
            expected: width,
            actual: data.len(),
        });
    }

    let raw = read_uint(&data[..width], kind.endianness)?;
    Ok(if kind.signed {
        sign_extend(raw, kind.bits())
    } else {
        raw as i64
    })
}

/// Encode an integer primitive, keeping only the low bits that fit
pub fn encode_int(kind: IntKind, value: i64) -> Vec<u8> {
    let mut out = vec![0u8; kind.bytes as usize];
    write_uint(value as u64 & mask(kind.bits()), &mut out, kind.endianness);
    out
}
