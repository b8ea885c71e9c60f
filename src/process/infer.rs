// src/process/infer.rs

use arrow::datatypes::{DataType, TimeUnit};
use std::str;

use crate::options::ValueSets;
use crate::process::date_parser;
use crate::process::tokenize::ParsedBlock;

const INT: u8 = 1 << 0;
const FLOAT: u8 = 1 << 1;
const BOOL: u8 = 1 << 2;
const TIMESTAMP: u8 = 1 << 3;
const UTF8: u8 = 1 << 4;
const ALL: u8 = INT | FLOAT | BOOL | TIMESTAMP | UTF8;

/// 1) Base-10 integer with optional sign, in i64 range.
pub fn parse_int(raw: &[u8]) -> Option<i64> {
    str::from_utf8(raw).ok()?.parse().ok()
}

/// 2) Anything `f64::from_str` accepts, `nan`/`inf` included.
pub fn parse_float(raw: &[u8]) -> Option<f64> {
    str::from_utf8(raw).ok()?.parse().ok()
}

/// Surviving ladder candidates for one column.
///
/// Binary is implied: it accepts everything, so it is never tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidates {
    mask: u8,
    has_value: bool,
}

impl Default for Candidates {
    fn default() -> Self {
        Self {
            mask: ALL,
            has_value: false,
        }
    }
}

impl Candidates {
    /// Narrow the candidates by one field. Null literals carry no evidence.
    pub(crate) fn observe(&mut self, raw: &[u8], sets: &ValueSets, check_utf8: bool) {
        if sets.is_null(raw) {
            return;
        }
        self.has_value = true;

        let mut keep = 0;
        if self.mask & INT != 0 && parse_int(raw).is_some() {
            keep |= INT;
        }
        if self.mask & FLOAT != 0 && parse_float(raw).is_some() {
            keep |= FLOAT;
        }
        if self.mask & BOOL != 0 && sets.parse_bool(raw).is_some() {
            keep |= BOOL;
        }
        if self.mask & TIMESTAMP != 0 && date_parser::parse_timestamp_seconds(raw).is_some() {
            keep |= TIMESTAMP;
        }
        if self.mask & UTF8 != 0 && (!check_utf8 || str::from_utf8(raw).is_ok()) {
            keep |= UTF8;
        }
        self.mask &= keep;
    }

    /// Combine the evidence of two blocks.
    pub fn merge(self, other: Candidates) -> Candidates {
        Candidates {
            mask: self.mask & other.mask,
            has_value: self.has_value || other.has_value,
        }
    }

    /// First surviving rung of the ladder.
    pub fn resolve(&self) -> DataType {
        if !self.has_value {
            return DataType::Null;
        }
        if self.mask & INT != 0 {
            DataType::Int64
        } else if self.mask & FLOAT != 0 {
            DataType::Float64
        } else if self.mask & BOOL != 0 {
            DataType::Boolean
        } else if self.mask & TIMESTAMP != 0 {
            DataType::Timestamp(TimeUnit::Second, None)
        } else if self.mask & UTF8 != 0 {
            DataType::Utf8
        } else {
            DataType::Binary
        }
    }
}

/// Per-column candidates for one block. Columns with a forced type are left
/// untouched.
pub(crate) fn infer_block(
    block: &ParsedBlock,
    forced: &[Option<DataType>],
    sets: &ValueSets,
    check_utf8: bool,
) -> Vec<Candidates> {
    let mut out = vec![Candidates::default(); forced.len()];
    for (col, cand) in out.iter_mut().enumerate() {
        if forced[col].is_some() {
            continue;
        }
        for row in 0..block.num_rows() {
            cand.observe(block.field(row, col), sets, check_utf8);
            if cand.mask == 0 {
                break;
            }
        }
    }
    out
}

/// Fold every block's candidates into final column types.
pub(crate) fn resolve_types<'a, I>(num_columns: usize, per_block: I) -> Vec<DataType>
where
    I: IntoIterator<Item = &'a Vec<Candidates>>,
{
    let mut acc = vec![Candidates::default(); num_columns];
    for block in per_block {
        for (a, c) in acc.iter_mut().zip(block) {
            *a = a.merge(*c);
        }
    }
    acc.iter().map(Candidates::resolve).collect()
}
