// Binary-Coded Decimal (BCD) encoding/decoding for `lbcd`/`bbcd` data

use super::types::BcdOrder;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BcdError {
    #[error("Invalid BCD byte: {0:#04x}")]
    InvalidDigit(u8),

    #[error("Value {value} does not fit in {digits} BCD digits")]
    ValueTooLarge { value: u64, digits: usize },

    #[error("{digits}-digit BCD value does not fit in 64 bits")]
    Overflow { digits: usize },
}

pub type Result<T> = std::result::Result<T, BcdError>;

/// Convert a BCD byte to its two decimal digits (tens, ones)
/// Example: 0x12 -> (1, 2), 0x95 -> (9, 5)
pub fn bcd_byte_to_digits(byte: u8) -> Result<(u8, u8)> {
    let tens = (byte & 0xF0) >> 4;
    let ones = byte & 0x0F;

    if tens > 9 || ones > 9 {
        return Err(BcdError::InvalidDigit(byte));
    }

    Ok((tens, ones))
}

/// Pack a value 0..=99 into one BCD byte
pub fn byte_from_value(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Decode one BCD byte to 0..=99
pub fn byte_to_value(byte: u8) -> Result<u8> {
    let (tens, ones) = bcd_byte_to_digits(byte)?;
    Ok(tens * 10 + ones)
}

/// Largest value storable in `num_bytes` BCD bytes, saturating at `u64::MAX`
pub fn max_value(num_bytes: usize) -> u64 {
    10u64
        .checked_pow(2 * num_bytes as u32)
        .map(|limit| limit - 1)
        .unwrap_or(u64::MAX)
}

/// Convert a BCD array to an integer
/// Example: [0x12, 0x34] -> 1234 (Big) or 3412 (Little)
pub fn bcd_to_int(bcd_array: &[u8], order: BcdOrder) -> Result<u64> {
    let mut value: u64 = 0;
    let mut push = |byte: u8| -> Result<()> {
        let pair = byte_to_value(byte)? as u64;
        value = value
            .checked_mul(100)
            .and_then(|v| v.checked_add(pair))
            .ok_or(BcdError::Overflow {
                digits: bcd_array.len() * 2,
            })?;
        Ok(())
    };

    match order {
        BcdOrder::Big => bcd_array.iter().try_for_each(|&b| push(b))?,
        BcdOrder::Little => bcd_array.iter().rev().try_for_each(|&b| push(b))?,
    }

    Ok(value)
}

/// Convert an integer to a BCD array of `num_bytes`
/// Example: 1234 -> [0x12, 0x34] (Big) or [0x34, 0x12] (Little)
pub fn int_to_bcd(value: u64, num_bytes: usize, order: BcdOrder) -> Result<Vec<u8>> {
    if value > max_value(num_bytes) {
        return Err(BcdError::ValueTooLarge {
            value,
            digits: num_bytes * 2,
        });
    }

    // Least significant pair first, then arrange by order
    let mut remaining = value;
    let mut pairs: Vec<u8> = (0..num_bytes)
        .map(|_| {
            let pair = (remaining % 100) as u8;
            remaining /= 100;
            byte_from_value(pair)
        })
        .collect();

    if order == BcdOrder::Big {
        pairs.reverse();
    }

    Ok(pairs)
}

/// Reduce `value` modulo 10^(2 * num_bytes)
pub fn truncate_to_digits(value: i64, num_bytes: usize) -> u64 {
    match 10i128.checked_pow(2 * num_bytes as u32) {
        Some(limit) if limit <= u64::MAX as i128 => (value as i128).rem_euclid(limit) as u64,
        _ => value.max(0) as u64,
    }
}
