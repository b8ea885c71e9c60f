// src/process/mod.rs

//! The read pipeline.
//!
//! 1) Validate options, then carve the source into row-aligned blocks.
//! 2) Resolve the schema sequentially from the first rows.
//! 3) Tokenize, validate and infer each remaining block (in parallel).
//! 4) Fix column types, convert every block, and stitch the table together.

pub mod chunk;
pub mod convert;
pub mod date_parser;
pub mod infer;
pub mod schema;
pub mod split;
pub mod table;
pub mod tokenize;

use arrow::datatypes::DataType;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::decompress::{self, Compression};
use crate::error::Result;
use crate::options::{ConvertOptions, CsvOptions, ParseOptions, ReadOptions, ValueSets};
use chunk::BlockReader;
use convert::Converter;
use split::BlockPlan;
pub use table::Table;

/// Read a whole CSV stream into a typed table.
///
/// The source is only borrowed for reading; it is not closed.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(block_size = read.block_size, threads = read.use_threads)
)]
pub fn read_csv<R: Read>(
    source: R,
    read: &ReadOptions,
    parse: &ParseOptions,
    convert: &ConvertOptions,
) -> Result<Table> {
    read.validate()?;
    parse.validate()?;
    convert.validate()?;
    if read.use_threads {
        split::init_thread_pool();
    }

    let mut reader = BlockReader::new(source, read.block_size, parse);
    let resolved = schema::resolve_schema(&mut reader, read, parse, convert)?;
    let names = resolved.schema.names();
    let forced = resolved.schema.forced_types();

    let sets = ValueSets::new(convert);
    let plan = BlockPlan {
        parse,
        forced: &forced,
        sets: &sets,
        check_utf8: convert.check_utf8,
    };
    let blocks = split::scan_blocks(resolved.first_block, &mut reader, &plan, read.use_threads)?;

    let inferred = infer::resolve_types(forced.len(), blocks.iter().map(|b| &b.candidates));
    let types: Vec<DataType> = forced
        .iter()
        .zip(inferred)
        .map(|(forced, inferred)| forced.clone().unwrap_or(inferred))
        .collect();
    debug!(?names, ?types, blocks = blocks.len(), "column types fixed");

    let converter = Converter::new(&sets, convert.check_utf8, convert.strings_can_be_null);
    let arrays = split::convert_blocks(&blocks, &types, &converter, read.use_threads)?;
    let num_rows = blocks.iter().map(|b| b.block.num_rows()).sum();

    table::assemble(&names, &types, arrays, num_rows)
}

/// Bundled options plus file-path convenience.
#[derive(Debug, Clone, Default)]
pub struct CsvTableReader {
    options: CsvOptions,
}

impl CsvTableReader {
    pub fn new(options: CsvOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    pub fn read<R: Read>(&self, source: R) -> Result<Table> {
        read_csv(
            source,
            &self.options.read,
            &self.options.parse,
            &self.options.convert,
        )
    }

    /// Open `path`, picking a decompressor from its extension.
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<Table> {
        let path = path.as_ref();
        self.read_path_with(path, Compression::from_path(path))
    }

    /// Open `path` with an explicit compression hint.
    pub fn read_path_with(&self, path: impl AsRef<Path>, compression: Compression) -> Result<Table> {
        let path = path.as_ref();
        debug!(path = %path.display(), ?compression, "opening input");
        match compression {
            Compression::None => self.read(File::open(path)?),
            other => self.read(decompress::open(path, other)?),
        }
    }
}
