// Compiled memory layouts: node tree, offsets and sizes
//
// A layout is compiled once from text and can then be bound to any number
// of memory images. Offsets inside a struct are relative to the start of
// that struct, so one compiled element serves every entry of an array.

use super::error::{BitwiseError, Result};
use super::parser::{parse_schema, Declarator, Item, ItemKind, StructSource};
use super::path::{parse_path, Segment};
use super::types::{BcdOrder, BitOrder, IntKind, Primitive};
use super::view::{child_path, display_path, index_path, StructView};
use crate::memmap::MemoryMap;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// A node of the compiled layout tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) kind: NodeKind,
    /// Size in bits
    pub(crate) bits: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Int(IntKind),
    /// A sub-range of an integer container, `shift` counted from its least significant bit
    Bitfield {
        container: IntKind,
        shift: u32,
        width: u32,
    },
    Bcd(BcdOrder),
    Char,
    /// Element of a `bit`/`lbit` array
    Bit(BitOrder),
    Struct(StructNode),
    Array(ArrayNode),
}

impl Node {
    fn scalar(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Int(kind) => Node {
                kind: NodeKind::Int(kind),
                bits: kind.bits() as usize,
            },
            Primitive::Char => Node {
                kind: NodeKind::Char,
                bits: 8,
            },
            Primitive::Bcd(order) => Node {
                kind: NodeKind::Bcd(order),
                bits: 8,
            },
            Primitive::Bit(order) => Node {
                kind: NodeKind::Bit(order),
                bits: 1,
            },
        }
    }

    fn array(element: Node, count: usize, line: usize) -> Result<Self> {
        let bits = element
            .bits
            .checked_mul(count)
            .ok_or_else(|| too_large(line, count))?;
        Ok(Node {
            kind: NodeKind::Array(ArrayNode {
                element: Box::new(element),
                count,
                placed: Vec::new(),
            }),
            bits,
        })
    }

    /// An array whose elements were laid out one at a time, `placed` holding
    /// each element's offset from the start of the array
    fn placed_array(placed: Vec<(usize, Node)>, bytes: usize, line: usize) -> Result<Self> {
        let element = match placed.first() {
            Some((_, node)) => node.clone(),
            None => return Err(BitwiseError::syntax(line, "array has no elements")),
        };
        Ok(Node {
            kind: NodeKind::Array(ArrayNode {
                element: Box::new(element),
                count: placed.len(),
                placed,
            }),
            bits: bytes.checked_mul(8).ok_or_else(|| too_large(line, bytes))?,
        })
    }

    fn structure(node: StructNode, line: usize) -> Result<Self> {
        Ok(Node {
            bits: node.size.checked_mul(8).ok_or_else(|| too_large(line, node.size))?,
            kind: NodeKind::Struct(node),
        })
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Size in bits
    pub fn size(&self) -> usize {
        self.bits
    }

    /// Bytes occupied in the image; bitfields occupy their whole container
    pub fn footprint(&self) -> usize {
        match &self.kind {
            NodeKind::Bitfield { container, .. } => container.bytes as usize,
            _ => self.bits.div_ceil(8),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Int(_) => "integer",
            NodeKind::Bitfield { .. } | NodeKind::Bit(_) => "bitfield",
            NodeKind::Bcd(_) => "bcd",
            NodeKind::Char => "char",
            NodeKind::Struct(s) if s.union => "union",
            NodeKind::Struct(_) => "struct",
            NodeKind::Array(_) => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub(crate) name: String,
    /// Byte offset from the start of the enclosing struct, negative when a
    /// `#seekto` moved back past that start
    pub(crate) offset: isize,
    pub(crate) node: Node,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    /// Absolute offset of the field inside a struct that starts at `base`.
    ///
    /// Layouts are resolved against the same absolute bases that views are
    /// bound at, so the result never goes below zero.
    pub(crate) fn at(&self, base: usize) -> usize {
        base.wrapping_add_signed(self.offset)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

/// Members of a struct or union in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructNode {
    pub(crate) fields: Vec<Field>,
    index: HashMap<String, usize>,
    pub(crate) union: bool,
    /// Size in bytes, trailing padding included
    pub(crate) size: usize,
}

impl StructNode {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_union(&self) -> bool {
        self.union
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    pub(crate) element: Box<Node>,
    pub(crate) count: usize,
    /// Offset and layout of every element, for struct elements containing
    /// `#seekto`. Empty when all elements share `element`.
    pub(crate) placed: Vec<(usize, Node)>,
}

impl ArrayNode {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn element(&self) -> &Node {
        &self.element
    }

    /// Layout of element `index`
    pub fn element_at(&self, index: usize) -> &Node {
        self.placed.get(index).map_or(&*self.element, |(_, node)| node)
    }

    /// Byte offset of element `index` from the start of the array
    pub(crate) fn byte_offset(&self, index: usize) -> usize {
        match self.placed.get(index) {
            Some((offset, _)) => *offset,
            None => index * self.element.bits / 8,
        }
    }

    /// Size of the whole array in bits
    pub(crate) fn bits(&self) -> usize {
        match self.placed.last() {
            Some((offset, node)) => offset * 8 + node.bits,
            None => self.count * self.element.bits,
        }
    }
}

/// Where a field lives in the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub path: String,
    /// Byte offset of the field, or of its container for bitfields
    pub offset: usize,
    /// Position of the field's least significant bit within its container (0 for whole-byte fields)
    pub bit_offset: u32,
    /// Width in bits
    pub bits: usize,
}

fn too_large(line: usize, what: usize) -> BitwiseError {
    BitwiseError::syntax(line, format!("layout overflows the address space at {:#x}", what))
}

/// Elements containing `#seekto` are laid out one by one, up to this many
const MAX_PLACED_ELEMENTS: usize = 0x10000;

/// Accumulates the members of one struct or union body.
/// All positions are absolute image offsets.
struct Block {
    node: StructNode,
    base: usize,
    cursor: usize,
    extent: usize,
    member_size: Option<usize>,
    /// A `#seekto` was seen in this block or a nested one
    anchored: bool,
}

impl Block {
    fn new(union: bool, base: usize) -> Self {
        Block {
            node: StructNode {
                union,
                ..StructNode::default()
            },
            base,
            cursor: base,
            extent: base,
            member_size: None,
            anchored: false,
        }
    }

    fn relative_cursor(&self, line: usize) -> Result<isize> {
        match (isize::try_from(self.cursor), isize::try_from(self.base)) {
            (Ok(cursor), Ok(base)) => Ok(cursor - base),
            _ => Err(too_large(line, self.cursor)),
        }
    }

    /// Add the fields declared by one statement, all starting at the cursor
    fn add(&mut self, members: Vec<(String, Node)>, footprint: usize, line: usize) -> Result<()> {
        let offset = self.relative_cursor(line)?;
        let end = self
            .cursor
            .checked_add(footprint)
            .ok_or_else(|| too_large(line, self.cursor))?;

        for (name, node) in members {
            if self.node.index.contains_key(&name) {
                return Err(BitwiseError::syntax(
                    line,
                    format!("duplicate field `{}`", name),
                ));
            }
            self.node.index.insert(name.clone(), self.node.fields.len());
            self.node.fields.push(Field { name, offset, node });
        }

        self.extent = self.extent.max(end);
        if self.node.union {
            match self.member_size {
                Some(size) if size != footprint => {
                    return Err(BitwiseError::syntax(
                        line,
                        format!(
                            "union members must share one size: {} bytes here, {} before",
                            footprint, size
                        ),
                    ));
                }
                _ => self.member_size = Some(footprint),
            }
        } else {
            self.cursor = end;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Resolver<'a> {
    types: HashMap<&'a str, &'a [Item]>,
}

impl<'a> Resolver<'a> {
    fn primitive(type_name: &str, line: usize) -> Result<Primitive> {
        Primitive::from_keyword(type_name)
            .ok_or_else(|| BitwiseError::syntax(line, format!("unknown type `{}`", type_name)))
    }

    fn field_node(primitive: Primitive, decl: &Declarator, line: usize) -> Result<Node> {
        match (primitive, decl.count) {
            (Primitive::Bit(_), Some(count)) if count % 8 != 0 => Err(BitwiseError::syntax(
                line,
                format!(
                    "bit array `{}` has {} elements, which is not a multiple of 8",
                    decl.name, count
                ),
            )),
            (Primitive::Bit(_), None) => Err(BitwiseError::syntax(
                line,
                format!("`{}` must be declared as an array of bits", decl.name),
            )),
            (primitive, Some(count)) => Node::array(Node::scalar(primitive), count, line),
            (primitive, None) => Ok(Node::scalar(primitive)),
        }
    }

    fn bitfield_members(
        type_name: &str,
        fields: &[(String, u32)],
        line: usize,
    ) -> Result<(Vec<(String, Node)>, usize)> {
        let container = match Self::primitive(type_name, line)? {
            Primitive::Int(kind) => kind,
            other => {
                return Err(BitwiseError::syntax(
                    line,
                    format!("bitfields need an integer type, not `{}`", other),
                ))
            }
        };

        if let Some((name, _)) = fields.iter().find(|(_, width)| *width == 0) {
            return Err(BitwiseError::syntax(
                line,
                format!("bitfield `{}` has zero width", name),
            ));
        }
        let total: u64 = fields.iter().map(|(_, width)| *width as u64).sum();
        if total != container.bits() as u64 {
            return Err(BitwiseError::syntax(
                line,
                format!(
                    "bitfield widths add up to {} bits, but `{}` holds {}",
                    total,
                    type_name,
                    container.bits()
                ),
            ));
        }

        // The first declared field takes the most significant bits
        let mut remaining = container.bits();
        let members = fields
            .iter()
            .map(|(name, width)| {
                remaining -= width;
                let node = Node {
                    kind: NodeKind::Bitfield {
                        container,
                        shift: remaining,
                        width: *width,
                    },
                    bits: *width as usize,
                };
                (name.clone(), node)
            })
            .collect();

        Ok((members, container.bytes as usize))
    }

    fn struct_body(&self, source: &'a StructSource, line: usize) -> Result<&'a [Item]> {
        match source {
            StructSource::Inline(body) => Ok(body.as_slice()),
            StructSource::Named(name) => self.types.get(name.as_str()).copied().ok_or_else(|| {
                BitwiseError::syntax(line, format!("undefined struct type `{}`", name))
            }),
        }
    }

    /// Lay out one struct or union body starting at absolute offset `base`.
    /// Returns the struct and whether its placement depends on `base`.
    fn resolve_block(
        &mut self,
        items: &'a [Item],
        union: bool,
        line: usize,
        base: usize,
    ) -> Result<(StructNode, bool)> {
        if items.is_empty() {
            let what = if union { "union" } else { "struct" };
            return Err(BitwiseError::syntax(line, format!("empty {} body", what)));
        }

        let mut block = Block::new(union, base);
        for item in items {
            match &item.kind {
                ItemKind::Seekto(address) => {
                    if *address < block.cursor {
                        debug!(
                            "line {}: seeking backwards from {:#06x} to {:#06x}",
                            item.line, block.cursor, address
                        );
                    }
                    block.cursor = *address;
                    block.anchored = true;
                }
                ItemKind::Seek(delta) => {
                    block.cursor = block
                        .cursor
                        .checked_add(*delta)
                        .ok_or_else(|| too_large(item.line, block.cursor))?;
                }
                ItemKind::PrintOffset(label) => {
                    debug!("{}: {} (0x{:08X})", label, block.cursor, block.cursor);
                }
                ItemKind::Field { type_name, decl } => {
                    let primitive = Self::primitive(type_name, item.line)?;
                    let node = Self::field_node(primitive, decl, item.line)?;
                    let footprint = node.footprint();
                    block.add(vec![(decl.name.clone(), node)], footprint, item.line)?;
                }
                ItemKind::Bitfield { type_name, fields } => {
                    let (members, footprint) = Self::bitfield_members(type_name, fields, item.line)?;
                    block.add(members, footprint, item.line)?;
                }
                ItemKind::StructDef { name, body } => {
                    // Bodies laid out once per element may define the same type again
                    match self.types.insert(name.as_str(), body.as_slice()) {
                        Some(previous) if !std::ptr::eq(previous, body.as_slice()) => {
                            return Err(BitwiseError::syntax(
                                item.line,
                                format!("struct type `{}` is already defined", name),
                            ));
                        }
                        _ => {}
                    }
                }
                ItemKind::StructDecl { source, decl } => {
                    let body = self.struct_body(source, item.line)?;
                    let (node, anchored) = self.compound(body, false, decl, item.line, block.cursor)?;
                    block.anchored |= anchored;
                    let footprint = node.footprint();
                    block.add(vec![(decl.name.clone(), node)], footprint, item.line)?;
                }
                ItemKind::Union { body, decl } => {
                    let (node, anchored) = self.compound(body, true, decl, item.line, block.cursor)?;
                    block.anchored |= anchored;
                    let footprint = node.footprint();
                    block.add(vec![(decl.name.clone(), node)], footprint, item.line)?;
                }
            }
        }

        block.node.size = match (union, block.member_size) {
            (true, Some(size)) => size,
            (true, None) => return Err(BitwiseError::syntax(line, "union has no members")),
            // Trailing #seek padding counts toward the size
            (false, _) => block.extent.max(block.cursor).saturating_sub(base),
        };
        Ok((block.node, block.anchored))
    }

    fn compound(
        &mut self,
        body: &'a [Item],
        union: bool,
        decl: &Declarator,
        line: usize,
        base: usize,
    ) -> Result<(Node, bool)> {
        let (first, anchored) = self.resolve_block(body, union, line, base)?;
        let element = Node::structure(first, line)?;

        let node = match decl.count {
            None => element,
            Some(count) if anchored && count > 1 => {
                if count > MAX_PLACED_ELEMENTS {
                    return Err(BitwiseError::syntax(
                        line,
                        format!(
                            "`{}` repeats a struct containing #seekto {} times, at most {} allowed",
                            decl.name, count, MAX_PLACED_ELEMENTS
                        ),
                    ));
                }
                let mut next = base
                    .checked_add(element.footprint())
                    .ok_or_else(|| too_large(line, base))?;
                let mut placed = vec![(0, element)];
                for _ in 1..count {
                    let (strukt, _) = self.resolve_block(body, union, line, next)?;
                    let node = Node::structure(strukt, line)?;
                    let end = next
                        .checked_add(node.footprint())
                        .ok_or_else(|| too_large(line, next))?;
                    placed.push((next - base, node));
                    next = end;
                }
                Node::placed_array(placed, next - base, line)?
            }
            Some(count) => Node::array(element, count, line)?,
        };
        Ok((node, anchored))
    }
}

/// A compiled memory layout
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    root: StructNode,
    size: usize,
}

impl Schema {
    /// Compile layout text
    pub fn compile(source: &str) -> Result<Self> {
        let items = parse_schema(source)?;
        let mut resolver = Resolver::default();
        let (root, _) = resolver.resolve_block(&items, false, 1, 0)?;
        debug!(
            "Compiled layout: {} top-level fields, {} bytes",
            root.fields.len(),
            root.size
        );
        Ok(Schema {
            size: root.size,
            root,
        })
    }

    /// Bind the layout to an image. Fields are read and written through the returned view.
    pub fn bind<'a>(&'a self, map: &'a MemoryMap) -> StructView<'a> {
        StructView::new(map, &self.root, 0, String::new())
    }

    pub fn root(&self) -> &StructNode {
        &self.root
    }

    /// Bytes spanned by the layout, from offset 0 to the end of the last field
    pub fn size(&self) -> usize {
        self.size
    }

    /// Resolve a path against the layout alone, without an image
    pub fn locate(&self, expr: &str) -> Result<FieldLayout> {
        let mut node_kind_name = "struct";
        let mut current: Option<&Node> = None;
        let mut strukt = Some(&self.root);
        let mut offset = 0;
        let mut path = String::new();
        let mut bit_offset = 0;
        let mut bits = self.size * 8;

        for segment in parse_path(expr)? {
            match (segment, strukt, current.map(|n| &n.kind)) {
                (Segment::Field(name), Some(st), _) => {
                    let field = st.get(&name).ok_or_else(|| BitwiseError::NoSuchField {
                        path: display_path(&path),
                        name: name.clone(),
                    })?;
                    offset = field.at(offset);
                    path = child_path(&path, &name);
                    current = Some(&field.node);
                }
                (Segment::Index(index), _, Some(NodeKind::Array(array))) => {
                    if index >= array.count {
                        return Err(BitwiseError::IndexOutOfBounds {
                            path: display_path(&path),
                            index,
                            len: array.count,
                        });
                    }
                    offset += array.byte_offset(index);
                    if let NodeKind::Bit(order) = array.element.kind {
                        bit_offset = order.shift(index);
                    }
                    path = index_path(&path, index);
                    current = Some(array.element_at(index));
                }
                (segment, _, _) => {
                    return Err(BitwiseError::TypeMismatch {
                        path: display_path(&path),
                        expected: match segment {
                            Segment::Field(_) => "struct",
                            Segment::Index(_) => "array",
                        },
                        actual: node_kind_name,
                    });
                }
            }

            if let Some(node) = current {
                node_kind_name = node.kind_name();
                bits = node.bits;
                strukt = match &node.kind {
                    NodeKind::Struct(s) => Some(s),
                    _ => None,
                };
                if let NodeKind::Bitfield { shift, .. } = node.kind {
                    bit_offset = shift;
                }
            }
        }

        Ok(FieldLayout {
            path,
            offset,
            bit_offset,
            bits,
        })
    }

    /// Every leaf field with its location, in declaration order
    pub fn layout(&self) -> Vec<FieldLayout> {
        let mut out = Vec::new();
        for field in &self.root.fields {
            collect(&field.node, field.at(0), field.name.clone(), &mut out);
        }
        out
    }
}

fn collect(node: &Node, offset: usize, path: String, out: &mut Vec<FieldLayout>) {
    match &node.kind {
        NodeKind::Struct(st) => {
            for field in &st.fields {
                collect(
                    &field.node,
                    field.at(offset),
                    child_path(&path, &field.name),
                    out,
                );
            }
        }
        NodeKind::Array(array) => {
            for index in 0..array.count {
                let element_path = index_path(&path, index);
                let element_offset = offset + array.byte_offset(index);
                match array.element.kind {
                    NodeKind::Bit(order) => out.push(FieldLayout {
                        path: element_path,
                        offset: element_offset,
                        bit_offset: order.shift(index),
                        bits: 1,
                    }),
                    _ => collect(array.element_at(index), element_offset, element_path, out),
                }
            }
        }
        NodeKind::Bitfield { shift, width, .. } => out.push(FieldLayout {
            path,
            offset,
            bit_offset: *shift,
            bits: *width as usize,
        }),
        _ => out.push(FieldLayout {
            path,
            offset,
            bit_offset: 0,
            bits: node.bits,
        }),
    }
}

impl FromStr for Schema {
    type Err = BitwiseError;

    fn from_str(source: &str) -> Result<Self> {
        Schema::compile(source)
    }
}
