// src/process/table.rs

use arrow::{
    array::{new_empty_array, Array, ArrayRef},
    compute::concat,
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// The typed, column-oriented result of a read.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Column names in file order; duplicates are preserved.
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, index: usize) -> &ArrayRef {
        self.batch.column(index)
    }

    /// First column called `name`.
    pub fn column_by_name(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_record_batch(self) -> RecordBatch {
        self.batch
    }
}

impl From<Table> for RecordBatch {
    fn from(table: Table) -> Self {
        table.batch
    }
}

/// Stitch per-block column arrays into one table, in block order.
pub(crate) fn assemble(
    names: &[String],
    types: &[DataType],
    blocks: Vec<Vec<ArrayRef>>,
    num_rows: usize,
) -> Result<Table> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len());
    for (col, dt) in types.iter().enumerate() {
        let parts: Vec<&dyn Array> = blocks.iter().map(|b| b[col].as_ref()).collect();
        let arr = match parts.len() {
            0 => new_empty_array(dt),
            1 => Arc::clone(&blocks[0][col]),
            _ => concat(&parts)?,
        };
        columns.push(arr);
    }

    let fields: Vec<Field> = names
        .iter()
        .zip(types)
        .map(|(name, dt)| Field::new(name, dt.clone(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    let batch = RecordBatch::try_new_with_options(schema, columns, &options)?;
    debug!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        blocks = blocks.len(),
        "assembled table"
    );
    Ok(Table { batch })
}
