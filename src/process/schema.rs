// src/process/schema.rs

use arrow::datatypes::DataType;
use std::io::Read;
use tracing::debug;

use crate::error::{CsvError, Result};
use crate::options::{ConvertOptions, ParseOptions, ReadOptions};
use crate::process::chunk::BlockReader;
use crate::process::tokenize::{tokenize, ParsedBlock};

/// Where a column name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    Header,
    Explicit,
}

/// One output column: its name and, if the caller forced one, its type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub source: ColumnSource,
    pub forced: Option<DataType>,
}

/// Column layout fixed before any data block is processed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSchema {
    pub columns: Vec<ColumnSpec>,
}

impl ResolvedSchema {
    /// Attach forced types by name; names that match nothing are ignored.
    fn from_names(names: Vec<String>, source: ColumnSource, convert: &ConvertOptions) -> Self {
        let columns = names
            .into_iter()
            .map(|name| {
                let forced = convert.column_types.get(&name).cloned();
                ColumnSpec {
                    name,
                    source,
                    forced,
                }
            })
            .collect();
        Self { columns }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn forced_types(&self) -> Vec<Option<DataType>> {
        self.columns.iter().map(|c| c.forced.clone()).collect()
    }
}

/// Result of the sequential prefix of a read.
#[derive(Debug)]
pub(crate) struct SchemaResolution {
    pub schema: ResolvedSchema,
    /// Remaining data rows of the block the header came from.
    pub first_block: Option<ParsedBlock>,
}

/// Skip rows, then take names from `column_names` or the next row.
///
/// 1) Pull and tokenize blocks until `skip_rows` rows are gone.
/// 2) Header mode: the next row's fields are the names, verbatim.
/// 3) Named mode: the next row is already data.
pub(crate) fn resolve_schema<R: Read>(
    reader: &mut BlockReader<R>,
    read: &ReadOptions,
    parse: &ParseOptions,
    convert: &ConvertOptions,
) -> Result<SchemaResolution> {
    let mut to_skip = read.skip_rows;
    let mut seen_rows = 0usize;

    loop {
        let Some(raw) = reader.next_block()? else {
            if seen_rows == 0 && read.skip_rows == 0 {
                return Err(CsvError::EmptyFile);
            }
            if to_skip > 0 || read.column_names.is_empty() {
                let header = usize::from(read.column_names.is_empty());
                return Err(CsvError::NotEnoughRows {
                    requested: read.skip_rows + header,
                    available: seen_rows,
                });
            }
            debug!(skipped = read.skip_rows, "input exhausted after skipping, no data rows");
            return Ok(SchemaResolution {
                schema: ResolvedSchema::from_names(
                    read.column_names.clone(),
                    ColumnSource::Explicit,
                    convert,
                ),
                first_block: None,
            });
        };

        let mut block = tokenize(&raw.data, raw.offset, parse);
        seen_rows += block.num_rows();
        to_skip -= block.drop_leading_rows(to_skip);
        if to_skip > 0 || block.num_rows() == 0 {
            continue;
        }

        let (names, source) = if read.column_names.is_empty() {
            let header: Vec<String> = block
                .row_fields(0)
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            block.drop_leading_rows(1);
            (header, ColumnSource::Header)
        } else {
            (read.column_names.clone(), ColumnSource::Explicit)
        };

        let schema = ResolvedSchema::from_names(names, source, convert);
        debug!(
            columns = schema.num_columns(),
            ?source,
            block = raw.index,
            "resolved schema"
        );
        return Ok(SchemaResolution {
            schema,
            first_block: Some(block),
        });
    }
}
