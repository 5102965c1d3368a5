// Errors raised while compiling a layout or accessing bound fields

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitwiseError {
    #[error("Schema syntax error on line {line}: {message}")]
    SchemaSyntax { line: usize, message: String },

    #[error("{path}: bytes {start:#06x}..{end:#06x} are outside the {len}-byte image")]
    Range {
        path: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("{path}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: value {value} outside {min}..={max}")]
    ValueOutOfRange {
        path: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{path}: invalid BCD byte {byte:#04x}")]
    InvalidBcd { path: String, byte: u8 },

    #[error("{path}: character {ch:?} cannot be encoded")]
    InvalidCharacter { path: String, ch: char },

    #[error("{path}: no such field `{name}`")]
    NoSuchField { path: String, name: String },

    #[error("{path}: index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("{path}: expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid path expression {expr:?}: {message}")]
    InvalidPath { expr: String, message: String },
}

/// Coarse classification of [`BitwiseError`], for callers that only branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaSyntax,
    Range,
    InvalidLength,
    ValueOutOfRange,
    InvalidBcd,
    InvalidCharacter,
    NoSuchField,
    IndexOutOfBounds,
    TypeMismatch,
    InvalidPath,
}

impl BitwiseError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        BitwiseError::SchemaSyntax {
            line,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BitwiseError::SchemaSyntax { .. } => ErrorKind::SchemaSyntax,
            BitwiseError::Range { .. } => ErrorKind::Range,
            BitwiseError::InvalidLength { .. } => ErrorKind::InvalidLength,
            BitwiseError::ValueOutOfRange { .. } => ErrorKind::ValueOutOfRange,
            BitwiseError::InvalidBcd { .. } => ErrorKind::InvalidBcd,
            BitwiseError::InvalidCharacter { .. } => ErrorKind::InvalidCharacter,
            BitwiseError::NoSuchField { .. } => ErrorKind::NoSuchField,
            BitwiseError::IndexOutOfBounds { .. } => ErrorKind::IndexOutOfBounds,
            BitwiseError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            BitwiseError::InvalidPath { .. } => ErrorKind::InvalidPath,
        }
    }

    /// Path of the field the error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            BitwiseError::SchemaSyntax { .. } | BitwiseError::InvalidPath { .. } => None,
            BitwiseError::Range { path, .. }
            | BitwiseError::InvalidLength { path, .. }
            | BitwiseError::ValueOutOfRange { path, .. }
            | BitwiseError::InvalidBcd { path, .. }
            | BitwiseError::InvalidCharacter { path, .. }
            | BitwiseError::NoSuchField { path, .. }
            | BitwiseError::IndexOutOfBounds { path, .. }
            | BitwiseError::TypeMismatch { path, .. } => Some(path),
        }
    }
}

pub type Result<T> = std::result::Result<T, BitwiseError>;
