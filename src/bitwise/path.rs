// Path expressions such as `memory[3].rxfreq` or `.limits.vhf.lower`

use super::error::{BitwiseError, Result};
use super::view::View;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SEGMENT: Regex =
        Regex::new(r"^(?:(\.)?(\w+)|\[\s*(0[xX][0-9a-fA-F]+|\d+)\s*\])").unwrap();
}

/// One step of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

fn invalid(expr: &str, message: impl Into<String>) -> BitwiseError {
    BitwiseError::InvalidPath {
        expr: expr.to_string(),
        message: message.into(),
    }
}

/// Split a path expression into segments. An empty expression yields no segments.
pub fn parse_path(expr: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = expr.trim();
    while !rest.is_empty() {
        let caps = SEGMENT
            .captures(rest)
            .ok_or_else(|| invalid(expr, format!("unexpected {:?}", rest)))?;

        if let Some(name) = caps.get(2) {
            let dotted = caps.get(1).is_some();
            if !dotted && matches!(segments.last(), Some(Segment::Index(_))) {
                return Err(invalid(expr, format!("expected '.' before {:?}", name.as_str())));
            }
            segments.push(Segment::Field(name.as_str().to_string()));
        } else if let Some(index) = caps.get(3) {
            let text = index.as_str();
            let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => usize::from_str_radix(hex, 16),
                None => text.parse(),
            };
            segments.push(Segment::Index(
                parsed.map_err(|e| invalid(expr, e.to_string()))?,
            ));
        }

        // Group 0 always matches when captures() succeeds
        let consumed = caps.get(0).map_or(rest.len(), |m| m.end());
        rest = &rest[consumed..];
    }

    Ok(segments)
}

/// Walk `expr` starting from `view`
pub fn resolve_path<'a>(view: &View<'a>, expr: &str) -> Result<View<'a>> {
    let mut current = view.clone();
    for segment in parse_path(expr)? {
        current = match segment {
            Segment::Field(name) => current.into_struct()?.field(&name)?,
            Segment::Index(index) => current.into_array()?.get(index)?,
        };
    }
    Ok(current)
}
