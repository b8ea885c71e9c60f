// src/error.rs

//! Error taxonomy for CSV ingestion.
//!
//! Every failure aborts the whole read; no partial table is ever returned.
//! Messages carry enough context (column index, offending literal, row byte
//! offset) to locate the problem in the source.

use arrow::error::ArrowError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CsvError>;

/// Broad category of a [`CsvError`], used by callers that only need to decide
/// whether to skip, retry or fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed structural input.
    Format,
    /// A field could not be converted to its column type.
    Conversion,
    /// An option value was rejected before any I/O started.
    Configuration,
    /// The compression format has no decompressor.
    UnsupportedFormat,
    Io,
    Arrow,
}

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Empty CSV file")]
    EmptyFile,

    #[error("CSV parse error: Expected {expected} columns, got {actual} (row at byte offset {offset})")]
    ColumnCount {
        expected: usize,
        actual: usize,
        offset: u64,
    },

    #[error("CSV parse error: not enough rows: needed {requested}, input has {available}")]
    NotEnoughRows { requested: usize, available: usize },

    #[error("In CSV column #{column}: CSV conversion error to {target}: invalid value '{value}'")]
    Conversion {
        column: usize,
        target: String,
        value: String,
    },

    #[error("invalid option: {0}")]
    Configuration(String),

    #[error("compression format not implemented: {0}")]
    UnsupportedFormat(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl CsvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CsvError::EmptyFile | CsvError::ColumnCount { .. } | CsvError::NotEnoughRows { .. } => {
                ErrorKind::Format
            }
            CsvError::Conversion { .. } => ErrorKind::Conversion,
            CsvError::Configuration(_) => ErrorKind::Configuration,
            CsvError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            CsvError::Io(_) => ErrorKind::Io,
            CsvError::Arrow(_) => ErrorKind::Arrow,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CsvError::Configuration(message.into())
    }

    /// Build a conversion error; the literal is decoded lossily so binary
    /// garbage still shows up in the message.
    pub(crate) fn conversion(column: usize, target: impl Into<String>, raw: &[u8]) -> Self {
        CsvError::Conversion {
            column,
            target: target.into(),
            value: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}
