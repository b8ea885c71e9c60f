// src/options.rs

//! Read, parse and convert options.
//!
//! Options are plain structs with defaults, chainable `with_*` builders and
//! validating `set_*` setters. A read validates all three bundles before it
//! touches the source.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::column_types::ColumnTypes;
use crate::error::{CsvError, Result};

/// Default target block size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

/// Literals read as null unless the caller overrides `null_values`.
pub const DEFAULT_NULL_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "N/A", "NA", "NULL", "NaN", "n/a", "nan", "null",
];

pub const DEFAULT_TRUE_VALUES: &[&str] = &["1", "True", "TRUE", "true"];

pub const DEFAULT_FALSE_VALUES: &[&str] = &["0", "False", "FALSE", "false"];

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Target size in bytes of each block handed to the tokenizer.
    pub block_size: usize,
    pub use_threads: bool,
    /// Leading rows dropped before header or data resolution.
    pub skip_rows: usize,
    /// When non-empty, no row is consumed as a header.
    pub column_names: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            use_threads: true,
            skip_rows: 0,
            column_names: Vec::new(),
        }
    }
}

impl ReadOptions {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_use_threads(mut self, use_threads: bool) -> Self {
        self.use_threads = use_threads;
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: usize) -> Self {
        self.skip_rows = skip_rows;
        self
    }

    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        check_block_size(block_size)?;
        self.block_size = block_size;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_block_size(self.block_size)
    }
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(CsvError::configuration("block_size must be positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    #[serde(with = "byte_char")]
    pub delimiter: u8,
    #[serde(with = "opt_byte_char")]
    pub quote_char: Option<u8>,
    /// `""` inside a quoted field is one literal quote.
    pub double_quote: bool,
    #[serde(with = "opt_byte_char")]
    pub escape_char: Option<u8>,
    /// When false, a raw newline ends the row even inside quotes.
    pub newlines_in_values: bool,
    pub ignore_empty_lines: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: Some(b'"'),
            double_quote: true,
            escape_char: None,
            newlines_in_values: false,
            ignore_empty_lines: true,
        }
    }
}

impl ParseOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote_char(mut self, quote_char: Option<u8>) -> Self {
        self.quote_char = quote_char;
        self
    }

    pub fn with_double_quote(mut self, double_quote: bool) -> Self {
        self.double_quote = double_quote;
        self
    }

    pub fn with_escape_char(mut self, escape_char: Option<u8>) -> Self {
        self.escape_char = escape_char;
        self
    }

    pub fn with_newlines_in_values(mut self, newlines_in_values: bool) -> Self {
        self.newlines_in_values = newlines_in_values;
        self
    }

    pub fn with_ignore_empty_lines(mut self, ignore_empty_lines: bool) -> Self {
        self.ignore_empty_lines = ignore_empty_lines;
        self
    }

    pub fn set_delimiter(&mut self, delimiter: u8) -> Result<()> {
        let candidate = Self {
            delimiter,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_quote_char(&mut self, quote_char: Option<u8>) -> Result<()> {
        let candidate = Self {
            quote_char,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_escape_char(&mut self, escape_char: Option<u8>) -> Result<()> {
        let candidate = Self {
            escape_char,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let is_newline = |b: u8| b == b'\n' || b == b'\r';
        if is_newline(self.delimiter) {
            return Err(CsvError::configuration("delimiter cannot be a line terminator"));
        }
        if let Some(q) = self.quote_char {
            if is_newline(q) || q == self.delimiter {
                return Err(CsvError::configuration(format!(
                    "quote_char {:?} clashes with the delimiter or a line terminator",
                    q as char
                )));
            }
        }
        if let Some(e) = self.escape_char {
            if is_newline(e) || e == self.delimiter || Some(e) == self.quote_char {
                return Err(CsvError::configuration(format!(
                    "escape_char {:?} clashes with the delimiter, quote_char or a line terminator",
                    e as char
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Invalid UTF-8 demotes a column to binary when set.
    pub check_utf8: bool,
    /// Null literals also null out string and binary columns.
    pub strings_can_be_null: bool,
    pub column_types: ColumnTypes,
    pub null_values: Vec<String>,
    pub true_values: Vec<String>,
    pub false_values: Vec<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            check_utf8: true,
            strings_can_be_null: false,
            column_types: ColumnTypes::default(),
            null_values: owned(DEFAULT_NULL_VALUES),
            true_values: owned(DEFAULT_TRUE_VALUES),
            false_values: owned(DEFAULT_FALSE_VALUES),
        }
    }
}

impl ConvertOptions {
    pub fn with_check_utf8(mut self, check_utf8: bool) -> Self {
        self.check_utf8 = check_utf8;
        self
    }

    pub fn with_strings_can_be_null(mut self, strings_can_be_null: bool) -> Self {
        self.strings_can_be_null = strings_can_be_null;
        self
    }

    pub fn with_column_types(mut self, column_types: ColumnTypes) -> Self {
        self.column_types = column_types;
        self
    }

    pub fn with_null_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_true_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.true_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_false_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.false_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (_, dt) in self.column_types.iter() {
            crate::column_types::ensure_supported(dt)?;
        }
        Ok(())
    }
}

/// Exact-match literal sets, compiled once per read and shared read-only by
/// every worker.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValueSets {
    nulls: HashSet<Vec<u8>>,
    trues: HashSet<Vec<u8>>,
    falses: HashSet<Vec<u8>>,
}

impl ValueSets {
    pub(crate) fn new(opts: &ConvertOptions) -> Self {
        let compile = |values: &[String]| values.iter().map(|v| v.as_bytes().to_vec()).collect();
        Self {
            nulls: compile(&opts.null_values),
            trues: compile(&opts.true_values),
            falses: compile(&opts.false_values),
        }
    }

    #[inline]
    pub(crate) fn is_null(&self, raw: &[u8]) -> bool {
        self.nulls.contains(raw)
    }

    #[inline]
    pub(crate) fn parse_bool(&self, raw: &[u8]) -> Option<bool> {
        if self.trues.contains(raw) {
            Some(true)
        } else if self.falses.contains(raw) {
            Some(false)
        } else {
            None
        }
    }
}

/// All three option bundles, loadable from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub read: ReadOptions,
    pub parse: ParseOptions,
    pub convert: ConvertOptions,
}

impl CsvOptions {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let opts: CsvOptions = serde_json::from_str(text)
            .map_err(|e| CsvError::configuration(format!("options JSON: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.read.validate()?;
        self.parse.validate()?;
        self.convert.validate()
    }
}

/// Single-byte options travel as one-character strings; bytes outside
/// ASCII are written as `\xNN`.
mod byte_char {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &u8, s: S) -> Result<S::Ok, S::Error> {
        if b.is_ascii() {
            s.serialize_str(&(*b as char).to_string())
        } else {
            s.serialize_str(&format!("\\x{b:02x}"))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let s = String::deserialize(d)?;
        let hex = s
            .strip_prefix("\\x")
            .filter(|h| h.len() == 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match (s.as_bytes(), hex) {
            (_, Some(b)) => Ok(b),
            ([b], None) => Ok(*b),
            _ => Err(D::Error::custom(format!(
                "expected a single-byte character, got {s:?}"
            ))),
        }
    }
}

mod opt_byte_char {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &Option<u8>, s: S) -> Result<S::Ok, S::Error> {
        match b {
            Some(b) => super::byte_char::serialize(b, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        match s {
            None => Ok(None),
            Some(s) => {
                super::byte_char::deserialize(
                    serde::de::value::StringDeserializer::<D::Error>::new(s),
                )
                .map(Some)
            }
        }
    }
}
