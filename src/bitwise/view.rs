// Typed views of a compiled layout bound to a memory image
//
// Views hold no data of their own. Every read decodes the bytes currently
// in the image and every write goes straight back to it, so two views of
// the same location (for example two union members) always agree.

use super::bcd;
use super::charset::StringCodec;
use super::elements::{decode_int, encode_int, mask, read_uint, write_uint};
use super::error::{BitwiseError, Result};
use super::layout::{ArrayNode, Node, NodeKind, StructNode};
use super::path::resolve_path;
use super::types::{BcdOrder, IntKind};
use crate::memmap::MemoryMap;
use std::fmt;
use tracing::trace;

pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

pub(crate) fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

fn check_region(map: &MemoryMap, path: &str, offset: usize, len: usize) -> Result<()> {
    let end = offset + len;
    if end > map.len() {
        return Err(BitwiseError::Range {
            path: display_path(path),
            start: offset,
            end,
            len: map.len(),
        });
    }
    Ok(())
}

fn read_region(map: &MemoryMap, path: &str, offset: usize, len: usize) -> Result<Vec<u8>> {
    check_region(map, path, offset, len)?;
    map.get(offset, Some(len)).map_err(|_| BitwiseError::Range {
        path: display_path(path),
        start: offset,
        end: offset + len,
        len: map.len(),
    })
}

fn write_region(map: &MemoryMap, path: &str, offset: usize, data: &[u8]) -> Result<()> {
    check_region(map, path, offset, data.len())?;
    trace!("{}: writing {} bytes at {:#06x}", display_path(path), data.len(), offset);
    map.set_bytes(offset, data).map_err(|_| BitwiseError::Range {
        path: display_path(path),
        start: offset,
        end: offset + data.len(),
        len: map.len(),
    })
}

fn out_of_range(path: &str, value: i64, min: i64, max: i64) -> BitwiseError {
    BitwiseError::ValueOutOfRange {
        path: display_path(path),
        value,
        min,
        max,
    }
}

/// Operations shared by every bound field
pub trait FieldView {
    /// Dotted path from the layout root, e.g. `memory[3].rxfreq`
    fn path(&self) -> &str;

    /// Absolute byte offset in the image
    fn offset(&self) -> usize;

    /// Size in bits
    fn size(&self) -> usize;

    fn memory(&self) -> &MemoryMap;

    /// Bytes covered by raw access. Bitfields cover their whole container.
    fn raw_len(&self) -> usize {
        self.size().div_ceil(8)
    }

    fn get_raw(&self) -> Result<Vec<u8>> {
        read_region(self.memory(), self.path(), self.offset(), self.raw_len())
    }

    /// Overwrite the field's bytes; `data` must cover the field exactly
    fn set_raw(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.raw_len() {
            return Err(BitwiseError::InvalidLength {
                path: display_path(self.path()),
                expected: self.raw_len(),
                actual: data.len(),
            });
        }
        write_region(self.memory(), self.path(), self.offset(), data)
    }

    fn fill_raw(&self, byte: u8) -> Result<()> {
        self.set_raw(&vec![byte; self.raw_len()])
    }
}

/// Location shared by all view types
#[derive(Debug, Clone)]
struct Loc<'a> {
    map: &'a MemoryMap,
    offset: usize,
    path: String,
}

macro_rules! located {
    ($view:ident, |$v:ident| $bits:expr) => {
        impl FieldView for $view<'_> {
            fn path(&self) -> &str {
                &self.loc.path
            }

            fn offset(&self) -> usize {
                self.loc.offset
            }

            fn size(&self) -> usize {
                let $v = self;
                $bits
            }

            fn memory(&self) -> &MemoryMap {
                self.loc.map
            }
        }
    };
}

/// A fixed-width integer
#[derive(Debug, Clone)]
pub struct IntView<'a> {
    loc: Loc<'a>,
    kind: IntKind,
}

located!(IntView, |v| v.kind.bits() as usize);

impl<'a> IntView<'a> {
    pub fn kind(&self) -> IntKind {
        self.kind
    }

    pub fn get(&self) -> Result<i64> {
        let bytes = self.get_raw()?;
        decode_int(self.kind, &bytes).map_err(|_| BitwiseError::InvalidLength {
            path: display_path(self.path()),
            expected: self.kind.bytes as usize,
            actual: bytes.len(),
        })
    }

    pub fn set(&self, value: i64) -> Result<()> {
        let (min, max) = (self.kind.min(), self.kind.max());
        if value < min || value > max {
            return Err(out_of_range(self.path(), value, min, max));
        }
        self.set_raw(&encode_int(self.kind, value))
    }

    /// Store the low bits of `value`, discarding the rest
    pub fn set_truncating(&self, value: i64) -> Result<()> {
        self.set_raw(&encode_int(self.kind, value))
    }
}

/// A bitfield, or one element of a `bit`/`lbit` array
#[derive(Debug, Clone)]
pub struct BitView<'a> {
    loc: Loc<'a>,
    container: IntKind,
    shift: u32,
    width: u32,
}

impl FieldView for BitView<'_> {
    fn path(&self) -> &str {
        &self.loc.path
    }

    fn offset(&self) -> usize {
        self.loc.offset
    }

    fn size(&self) -> usize {
        self.width as usize
    }

    fn memory(&self) -> &MemoryMap {
        self.loc.map
    }

    fn raw_len(&self) -> usize {
        self.container.bytes as usize
    }
}

impl<'a> BitView<'a> {
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Position of the least significant bit within the container value
    pub fn shift(&self) -> u32 {
        self.shift
    }

    fn container_value(&self) -> Result<u64> {
        let bytes = self.get_raw()?;
        read_uint(&bytes, self.container.endianness).map_err(|_| BitwiseError::InvalidLength {
            path: display_path(self.path()),
            expected: self.container.bytes as usize,
            actual: bytes.len(),
        })
    }

    pub fn get(&self) -> Result<i64> {
        Ok(((self.container_value()? >> self.shift) & mask(self.width)) as i64)
    }

    pub fn get_bool(&self) -> Result<bool> {
        Ok(self.get()? != 0)
    }

    fn store(&self, bits: u64) -> Result<()> {
        let field_mask = mask(self.width) << self.shift;
        let merged = (self.container_value()? & !field_mask) | ((bits << self.shift) & field_mask);
        let mut out = vec![0u8; self.raw_len()];
        write_uint(merged, &mut out, self.container.endianness);
        self.set_raw(&out)
    }

    pub fn set(&self, value: i64) -> Result<()> {
        let max = mask(self.width) as i64;
        if !(0..=max).contains(&value) {
            return Err(out_of_range(self.path(), value, 0, max));
        }
        self.store(value as u64)
    }

    pub fn set_truncating(&self, value: i64) -> Result<()> {
        self.store(value as u64 & mask(self.width))
    }

    pub fn set_bool(&self, flag: bool) -> Result<()> {
        self.set(flag as i64)
    }
}

/// A single packed BCD byte holding 0..=99
#[derive(Debug, Clone)]
pub struct BcdView<'a> {
    loc: Loc<'a>,
}

located!(BcdView, |_v| 8);

impl<'a> BcdView<'a> {
    pub fn get(&self) -> Result<i64> {
        let byte = self.get_raw()?[0];
        bcd::byte_to_value(byte)
            .map(i64::from)
            .map_err(|_| BitwiseError::InvalidBcd {
                path: display_path(self.path()),
                byte,
            })
    }

    pub fn set(&self, value: i64) -> Result<()> {
        if !(0..=99).contains(&value) {
            return Err(out_of_range(self.path(), value, 0, 99));
        }
        self.set_raw(&[bcd::byte_from_value(value as u8)])
    }

    pub fn set_truncating(&self, value: i64) -> Result<()> {
        self.set_raw(&[bcd::byte_from_value(value.rem_euclid(100) as u8)])
    }
}

/// A single `char`
#[derive(Debug, Clone)]
pub struct CharView<'a> {
    loc: Loc<'a>,
}

located!(CharView, |_v| 8);

impl<'a> CharView<'a> {
    pub fn get_byte(&self) -> Result<u8> {
        Ok(self.get_raw()?[0])
    }

    pub fn set_byte(&self, byte: u8) -> Result<()> {
        self.set_raw(&[byte])
    }

    pub fn get(&self) -> Result<char> {
        Ok(self.get_byte()? as char)
    }

    pub fn set(&self, ch: char) -> Result<()> {
        let byte = u8::try_from(ch as u32).map_err(|_| BitwiseError::InvalidCharacter {
            path: display_path(self.path()),
            ch,
        })?;
        self.set_byte(byte)
    }
}

/// An array of BCD bytes read as one decimal number
#[derive(Debug, Clone)]
pub struct BcdArrayView<'a> {
    loc: Loc<'a>,
    count: usize,
    order: BcdOrder,
}

located!(BcdArrayView, |v| v.count * 8);

/// Largest all-nines value that fits an `i64`
const MAX_BCD_VALUE: i64 = 999_999_999_999_999_999;

impl<'a> BcdArrayView<'a> {
    pub fn order(&self) -> BcdOrder {
        self.order
    }

    /// Largest value readable and storable: 10^(2n) - 1, capped at 18 digits
    pub fn max(&self) -> i64 {
        i64::try_from(bcd::max_value(self.count)).map_or(MAX_BCD_VALUE, |max| max.min(MAX_BCD_VALUE))
    }

    pub fn get(&self) -> Result<i64> {
        let bytes = self.get_raw()?;
        let value = match bcd::bcd_to_int(&bytes, self.order) {
            Ok(value) => i64::try_from(value).unwrap_or(i64::MAX),
            Err(bcd::BcdError::InvalidDigit(byte)) => {
                return Err(BitwiseError::InvalidBcd {
                    path: display_path(self.path()),
                    byte,
                })
            }
            // Saturate; the range check below reports it
            Err(_) => i64::MAX,
        };
        if value > self.max() {
            return Err(out_of_range(self.path(), value, 0, self.max()));
        }
        Ok(value)
    }

    fn store(&self, value: u64) -> Result<()> {
        let bytes = bcd::int_to_bcd(value, self.count, self.order)
            .map_err(|_| out_of_range(self.path(), value as i64, 0, self.max()))?;
        self.set_raw(&bytes)
    }

    pub fn set(&self, value: i64) -> Result<()> {
        if value < 0 || value > self.max() {
            return Err(out_of_range(self.path(), value, 0, self.max()));
        }
        self.store(value as u64)
    }

    /// Store `value` modulo `max() + 1`
    pub fn set_truncating(&self, value: i64) -> Result<()> {
        let limit = self.max() as u64 + 1;
        self.store(bcd::truncate_to_digits(value, self.count) % limit)
    }
}

/// An array of `char` read as text
#[derive(Debug, Clone)]
pub struct CharArrayView<'a> {
    loc: Loc<'a>,
    len: usize,
}

located!(CharArrayView, |v| v.len * 8);

impl<'a> CharArrayView<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All N bytes as ISO-8859-1 characters, padding included
    pub fn get_string(&self) -> Result<String> {
        Ok(self.get_raw()?.into_iter().map(char::from).collect())
    }

    /// Decode with `codec`, trimming trailing pad bytes
    pub fn get_string_with(&self, codec: &StringCodec) -> Result<String> {
        Ok(codec.decode(&self.get_raw()?))
    }

    /// Store `text` as ISO-8859-1, NUL padded or truncated to N
    pub fn set_string(&self, text: &str) -> Result<()> {
        self.set_string_with(text, &StringCodec::default())
    }

    pub fn set_string_with(&self, text: &str, codec: &StringCodec) -> Result<()> {
        let bytes = codec
            .encode(text, self.len)
            .map_err(|ch| BitwiseError::InvalidCharacter {
                path: display_path(self.path()),
                ch,
            })?;
        self.set_raw(&bytes)
    }
}

/// A struct or union
#[derive(Debug, Clone)]
pub struct StructView<'a> {
    loc: Loc<'a>,
    node: &'a StructNode,
}

impl FieldView for StructView<'_> {
    fn path(&self) -> &str {
        &self.loc.path
    }

    fn offset(&self) -> usize {
        self.loc.offset
    }

    fn size(&self) -> usize {
        self.node.size * 8
    }

    fn memory(&self) -> &MemoryMap {
        self.loc.map
    }
}

impl<'a> StructView<'a> {
    pub(crate) fn new(map: &'a MemoryMap, node: &'a StructNode, offset: usize, path: String) -> Self {
        StructView {
            loc: Loc { map, offset, path },
            node,
        }
    }

    pub fn is_union(&self) -> bool {
        self.node.union
    }

    pub fn len(&self) -> usize {
        self.node.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node.contains(name)
    }

    /// Field names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &'a str> + 'a {
        let node: &'a StructNode = self.node;
        node.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field(&self, name: &str) -> Result<View<'a>> {
        let node: &'a StructNode = self.node;
        let field = node.get(name).ok_or_else(|| BitwiseError::NoSuchField {
            path: display_path(&self.loc.path),
            name: name.to_string(),
        })?;
        Ok(View::new(
            self.loc.map,
            &field.node,
            field.at(self.loc.offset),
            child_path(&self.loc.path, name),
        ))
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&'a str, View<'a>)> + '_ {
        let node: &'a StructNode = self.node;
        node.fields.iter().map(move |field| {
            (
                field.name.as_str(),
                View::new(
                    self.loc.map,
                    &field.node,
                    field.at(self.loc.offset),
                    child_path(&self.loc.path, &field.name),
                ),
            )
        })
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.field(name)?.get_int()
    }

    pub fn set_int(&self, name: &str, value: i64) -> Result<()> {
        self.field(name)?.set_int(value)
    }

    pub fn set_int_truncating(&self, name: &str, value: i64) -> Result<()> {
        self.field(name)?.set_int_truncating(value)
    }

    pub fn array(&self, name: &str) -> Result<ArrayView<'a>> {
        self.field(name)?.into_array()
    }

    pub fn child(&self, name: &str) -> Result<StructView<'a>> {
        self.field(name)?.into_struct()
    }

    /// Resolve a path such as `memory[3].rxfreq` relative to this struct
    pub fn lookup(&self, expr: &str) -> Result<View<'a>> {
        resolve_path(&View::Struct(self.clone()), expr)
    }
}

/// A fixed-length array
#[derive(Debug, Clone)]
pub struct ArrayView<'a> {
    loc: Loc<'a>,
    node: &'a ArrayNode,
}

located!(ArrayView, |v| v.node.bits());

impl<'a> ArrayView<'a> {
    pub fn len(&self) -> usize {
        self.node.count
    }

    pub fn is_empty(&self) -> bool {
        self.node.count == 0
    }

    fn element(&self, index: usize) -> View<'a> {
        let node: &'a ArrayNode = self.node;
        let offset = self.loc.offset + node.byte_offset(index);
        let path = index_path(&self.loc.path, index);
        match node.element.kind {
            NodeKind::Bit(order) => View::Bits(BitView {
                loc: Loc {
                    map: self.loc.map,
                    offset,
                    path,
                },
                container: IntKind::U8,
                shift: order.shift(index),
                width: 1,
            }),
            _ => View::new(self.loc.map, node.element_at(index), offset, path),
        }
    }

    pub fn get(&self, index: usize) -> Result<View<'a>> {
        if index >= self.node.count {
            return Err(BitwiseError::IndexOutOfBounds {
                path: display_path(&self.loc.path),
                index,
                len: self.node.count,
            });
        }
        Ok(self.element(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = View<'a>> + '_ {
        (0..self.node.count).map(move |i| self.element(i))
    }

    fn mismatch(&self, expected: &'static str) -> BitwiseError {
        BitwiseError::TypeMismatch {
            path: display_path(&self.loc.path),
            expected,
            actual: "array",
        }
    }

    /// View a `lbcd`/`bbcd` array as one number
    pub fn into_bcd(self) -> Result<BcdArrayView<'a>> {
        match self.node.element.kind {
            NodeKind::Bcd(order) => Ok(BcdArrayView {
                count: self.node.count,
                order,
                loc: self.loc,
            }),
            _ => Err(self.mismatch("bcd array")),
        }
    }

    /// View a `char` array as text
    pub fn into_chars(self) -> Result<CharArrayView<'a>> {
        match self.node.element.kind {
            NodeKind::Char => Ok(CharArrayView {
                len: self.node.count,
                loc: self.loc,
            }),
            _ => Err(self.mismatch("char array")),
        }
    }
}

/// Any bound node
#[derive(Debug, Clone)]
pub enum View<'a> {
    Int(IntView<'a>),
    Bits(BitView<'a>),
    Bcd(BcdView<'a>),
    Char(CharView<'a>),
    Struct(StructView<'a>),
    Array(ArrayView<'a>),
}

impl<'a> View<'a> {
    pub(crate) fn new(map: &'a MemoryMap, node: &'a Node, offset: usize, path: String) -> Self {
        let loc = Loc { map, offset, path };
        match &node.kind {
            NodeKind::Int(kind) => View::Int(IntView { loc, kind: *kind }),
            NodeKind::Bitfield {
                container,
                shift,
                width,
            } => View::Bits(BitView {
                loc,
                container: *container,
                shift: *shift,
                width: *width,
            }),
            NodeKind::Bit(order) => View::Bits(BitView {
                loc,
                container: IntKind::U8,
                shift: order.shift(0),
                width: 1,
            }),
            NodeKind::Bcd(_) => View::Bcd(BcdView { loc }),
            NodeKind::Char => View::Char(CharView { loc }),
            NodeKind::Struct(node) => View::Struct(StructView { loc, node }),
            NodeKind::Array(node) => View::Array(ArrayView { loc, node }),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            View::Int(_) => "integer",
            View::Bits(_) => "bitfield",
            View::Bcd(_) => "bcd",
            View::Char(_) => "char",
            View::Struct(s) if s.is_union() => "union",
            View::Struct(_) => "struct",
            View::Array(_) => "array",
        }
    }

    fn mismatch(&self, expected: &'static str) -> BitwiseError {
        BitwiseError::TypeMismatch {
            path: display_path(self.path()),
            expected,
            actual: self.kind_name(),
        }
    }

    pub fn into_struct(self) -> Result<StructView<'a>> {
        match self {
            View::Struct(view) => Ok(view),
            other => Err(other.mismatch("struct")),
        }
    }

    pub fn into_array(self) -> Result<ArrayView<'a>> {
        match self {
            View::Array(view) => Ok(view),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn into_int(self) -> Result<IntView<'a>> {
        match self {
            View::Int(view) => Ok(view),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn into_bits(self) -> Result<BitView<'a>> {
        match self {
            View::Bits(view) => Ok(view),
            other => Err(other.mismatch("bitfield")),
        }
    }

    pub fn into_char(self) -> Result<CharView<'a>> {
        match self {
            View::Char(view) => Ok(view),
            other => Err(other.mismatch("char")),
        }
    }

    pub fn into_bcd_array(self) -> Result<BcdArrayView<'a>> {
        match self {
            View::Array(view) => view.into_bcd(),
            other => Err(other.mismatch("bcd array")),
        }
    }

    pub fn into_chars(self) -> Result<CharArrayView<'a>> {
        match self {
            View::Array(view) => view.into_chars(),
            other => Err(other.mismatch("char array")),
        }
    }

    /// Numeric value of any scalar, a char's byte value, or a BCD array's number
    pub fn get_int(&self) -> Result<i64> {
        match self {
            View::Int(v) => v.get(),
            View::Bits(v) => v.get(),
            View::Bcd(v) => v.get(),
            View::Char(v) => v.get_byte().map(i64::from),
            View::Array(v) => v.clone().into_bcd().map_err(|_| self.mismatch("integer"))?.get(),
            View::Struct(_) => Err(self.mismatch("integer")),
        }
    }

    /// Store a number, rejecting values the field cannot hold
    pub fn set_int(&self, value: i64) -> Result<()> {
        match self {
            View::Int(v) => v.set(value),
            View::Bits(v) => v.set(value),
            View::Bcd(v) => v.set(value),
            View::Char(v) => {
                let byte = u8::try_from(value).map_err(|_| out_of_range(v.path(), value, 0, 255))?;
                v.set_byte(byte)
            }
            View::Array(v) => v.clone().into_bcd().map_err(|_| self.mismatch("integer"))?.set(value),
            View::Struct(_) => Err(self.mismatch("integer")),
        }
    }

    /// Store a number, keeping only what fits
    pub fn set_int_truncating(&self, value: i64) -> Result<()> {
        match self {
            View::Int(v) => v.set_truncating(value),
            View::Bits(v) => v.set_truncating(value),
            View::Bcd(v) => v.set_truncating(value),
            View::Char(v) => v.set_byte(value as u8),
            View::Array(v) => v
                .clone()
                .into_bcd()
                .map_err(|_| self.mismatch("integer"))?
                .set_truncating(value),
            View::Struct(_) => Err(self.mismatch("integer")),
        }
    }

    pub fn lookup(&self, expr: &str) -> Result<View<'a>> {
        resolve_path(self, expr)
    }

    fn as_field(&self) -> &dyn FieldView {
        match self {
            View::Int(v) => v,
            View::Bits(v) => v,
            View::Bcd(v) => v,
            View::Char(v) => v,
            View::Struct(v) => v,
            View::Array(v) => v,
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let scalar = |f: &mut fmt::Formatter<'_>, value: Result<i64>| match value {
            Ok(n) => write!(f, "{}", n),
            Err(e) => write!(f, "<{}>", e),
        };

        match self {
            View::Int(v) => scalar(f, v.get()),
            View::Bits(v) => scalar(f, v.get()),
            View::Bcd(v) => scalar(f, v.get()),
            View::Char(v) => match v.get() {
                Ok(ch) => write!(f, "{:?}", ch),
                Err(e) => write!(f, "<{}>", e),
            },
            View::Array(array) => {
                if let Ok(chars) = array.clone().into_chars() {
                    return match chars.get_string() {
                        Ok(text) => write!(f, "{:?}", text),
                        Err(e) => write!(f, "<{}>", e),
                    };
                }
                if let Ok(number) = array.clone().into_bcd() {
                    return scalar(f, number.get());
                }
                if matches!(array.node.element.kind, NodeKind::Struct(_)) {
                    writeln!(f, "[")?;
                    for (i, element) in array.iter().enumerate() {
                        write!(f, "{:indent$}[{}] ", "", i, indent = (depth + 1) * 2)?;
                        element.write_tree(f, depth + 1)?;
                        writeln!(f)?;
                    }
                    write!(f, "{:indent$}]", "", indent = depth * 2)
                } else {
                    write!(f, "[")?;
                    for (i, element) in array.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        element.write_tree(f, depth)?;
                    }
                    write!(f, "]")
                }
            }
            View::Struct(st) => {
                writeln!(f, "{} {{", if st.is_union() { "union" } else { "struct" })?;
                for (name, field) in st.fields() {
                    write!(f, "{:indent$}{}: ", "", name, indent = (depth + 1) * 2)?;
                    field.write_tree(f, depth + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{:indent$}}}", "", indent = depth * 2)
            }
        }
    }
}

impl FieldView for View<'_> {
    fn path(&self) -> &str {
        self.as_field().path()
    }

    fn offset(&self) -> usize {
        self.as_field().offset()
    }

    fn size(&self) -> usize {
        self.as_field().size()
    }

    fn memory(&self) -> &MemoryMap {
        self.as_field().memory()
    }

    fn raw_len(&self) -> usize {
        self.as_field().raw_len()
    }
}

impl fmt::Display for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

impl fmt::Display for StructView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        View::Struct(self.clone()).write_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitwise::{ErrorKind, Schema};

    fn bind_test<F>(schema: &str, data: &[u8], check: F)
    where
        F: FnOnce(StructView<'_>, &MemoryMap),
    {
        let schema = Schema::compile(schema).unwrap();
        let map = MemoryMap::new(data.to_vec());
        check(schema.bind(&map), &map);
    }

    #[test]
    fn test_integers() {
        bind_test("u8 a; ul16 b; i16 c; il24 d;", &[0x01, 0x34, 0x12, 0xFF, 0xFE, 0xFF, 0xFF, 0xFF], |root, map| {
            assert_eq!(root.get_int("a").unwrap(), 1);
            assert_eq!(root.get_int("b").unwrap(), 0x1234);
            assert_eq!(root.get_int("c").unwrap(), -2);
            assert_eq!(root.get_int("d").unwrap(), -1);

            root.set_int("b", 0xBEEF).unwrap();
            root.set_int("c", -32768).unwrap();
            assert_eq!(map.get(1, Some(4)).unwrap(), vec![0xEF, 0xBE, 0x80, 0x00]);

            let err = root.set_int("a", 256).unwrap_err();
            assert_eq!(
                err,
                BitwiseError::ValueOutOfRange {
                    path: "a".to_string(),
                    value: 256,
                    min: 0,
                    max: 255
                }
            );
            root.set_int_truncating("a", 0x1FF).unwrap();
            assert_eq!(root.get_int("a").unwrap(), 0xFF);
        });
    }

    #[test]
    fn test_bitfields_keep_neighbours() {
        bind_test("u8 foo:4, bar:4;", &[0x12], |root, map| {
            assert_eq!(root.get_int("foo").unwrap(), 1);
            assert_eq!(root.get_int("bar").unwrap(), 2);
            root.set_int("bar", 0xF).unwrap();
            assert_eq!(map.get_byte(0).unwrap(), 0x1F);
            assert_eq!(root.set_int("foo", 16).unwrap_err().kind(), ErrorKind::ValueOutOfRange);

            let bar = root.field("bar").unwrap();
            assert_eq!(bar.size(), 4);
            assert_eq!(bar.get_raw().unwrap(), vec![0x1F]);
        });
    }

    #[test]
    fn test_bit_arrays() {
        bind_test("bit foo[16];", &[0x00, 0x80], |root, map| {
            let foo = root.array("foo").unwrap();
            assert_eq!(foo.len(), 16);
            assert!(foo.get(8).unwrap().into_bits().unwrap().get_bool().unwrap());
            assert!(!foo.get(7).unwrap().into_bits().unwrap().get_bool().unwrap());
            foo.get(0).unwrap().set_int(1).unwrap();
            assert_eq!(map.get_byte(0).unwrap(), 0x80);
        });
    }

    #[test]
    fn test_bcd_and_chars() {
        bind_test("lbcd freq[4]; bbcd one; char name[6];", b"\x00\x20\x65\x14\x42ABC\0\0\0", |root, map| {
            let freq = root.field("freq").unwrap();
            assert_eq!(freq.get_int().unwrap(), 14652000);
            freq.set_int(44500000).unwrap();
            assert_eq!(map.get(0, Some(4)).unwrap(), vec![0x00, 0x00, 0x50, 0x44]);
            assert_eq!(root.get_int("one").unwrap(), 42);

            let name = root.field("name").unwrap().into_chars().unwrap();
            assert_eq!(name.get_string().unwrap(), "ABC\0\0\0");
            assert_eq!(name.get_string_with(&StringCodec::default()).unwrap(), "ABC");
            name.set_string("LONGNAME").unwrap();
            assert_eq!(name.get_string().unwrap(), "LONGNA");
        });
    }

    #[test]
    fn test_wide_bcd_range() {
        let mut data = vec![0x01];
        data.extend([0x00; 9]);
        data.extend([0x99; 10]);
        bind_test("bbcd big[10]; bbcd huge[10];", &data, |root, _| {
            let big = root.field("big").unwrap().into_bcd_array().unwrap();
            assert_eq!(big.max(), 999_999_999_999_999_999);
            assert_eq!(
                big.get().unwrap_err(),
                BitwiseError::ValueOutOfRange {
                    path: "big".to_string(),
                    value: 1_000_000_000_000_000_000,
                    min: 0,
                    max: 999_999_999_999_999_999
                }
            );
            assert_eq!(
                root.get_int("huge").unwrap_err().kind(),
                ErrorKind::ValueOutOfRange
            );

            big.set(1234).unwrap();
            assert_eq!(big.get().unwrap(), 1234);
            assert_eq!(big.set(i64::MAX).unwrap_err().kind(), ErrorKind::ValueOutOfRange);
        });
    }

    #[test]
    fn test_invalid_bcd() {
        bind_test("bbcd v[2];", &[0x1A, 0x00], |root, _| {
            assert_eq!(
                root.get_int("v").unwrap_err(),
                BitwiseError::InvalidBcd {
                    path: "v".to_string(),
                    byte: 0x1A
                }
            );
        });
    }

    #[test]
    fn test_range_is_checked_on_access() {
        // Binding succeeds even though the image is too short
        bind_test("u8 a; #seekto 0x10; u16 b;", &[0x01, 0x02], |root, _| {
            assert_eq!(root.get_int("a").unwrap(), 1);
            let err = root.get_int("b").unwrap_err();
            assert_eq!(
                err,
                BitwiseError::Range {
                    path: "b".to_string(),
                    start: 0x10,
                    end: 0x12,
                    len: 2
                }
            );
        });
    }

    #[test]
    fn test_raw_access() {
        bind_test("struct { u8 a; u8 b; } s; u8 tail;", &[1, 2, 3], |root, map| {
            let s = root.field("s").unwrap();
            assert_eq!(s.size(), 16);
            assert_eq!(s.get_raw().unwrap(), vec![1, 2]);
            assert_eq!(s.set_raw(&[9]).unwrap_err().kind(), ErrorKind::InvalidLength);
            s.fill_raw(0xFF).unwrap();
            assert_eq!(map.get_packed(), vec![0xFF, 0xFF, 3]);
        });
    }

    #[test]
    fn test_type_mismatch_and_missing() {
        bind_test("u8 a; struct { u8 x; } s[1];", &[0, 0], |root, _| {
            assert_eq!(root.field("zzz").unwrap_err().kind(), ErrorKind::NoSuchField);
            assert_eq!(root.array("a").unwrap_err().kind(), ErrorKind::TypeMismatch);
            assert_eq!(root.get_int("s").unwrap_err().kind(), ErrorKind::TypeMismatch);
            assert_eq!(
                root.array("s").unwrap().get(1).unwrap_err().kind(),
                ErrorKind::IndexOutOfBounds
            );
        });
    }

    #[test]
    fn test_display() {
        bind_test("u8 a; char n[2]; struct { u8 x; } s[1];", b"\x05HI\x07", |root, _| {
            let text = root.to_string();
            assert!(text.contains("a: 5"));
            assert!(text.contains("n: \"HI\""));
            assert!(text.contains("x: 7"));
        });
    }
}
