// src/lib.rs

//! Block-parallel CSV reader producing typed Arrow tables.

pub mod column_types;
pub mod decompress;
pub mod error;
pub mod options;
pub mod process;

pub use column_types::{parse_type_name, type_name, ColumnTypeSpec, ColumnTypes};
pub use decompress::Compression;
pub use error::{CsvError, ErrorKind, Result};
pub use options::{ConvertOptions, CsvOptions, ParseOptions, ReadOptions};
pub use process::{read_csv, CsvTableReader, Table};
