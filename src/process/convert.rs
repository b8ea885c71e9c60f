// src/process/convert.rs

use arrow::{
    array::{
        ArrayRef, BinaryBuilder, BooleanBuilder, LargeBinaryBuilder, LargeStringBuilder,
        NullArray, PrimitiveArray, PrimitiveBuilder, StringBuilder,
    },
    datatypes::*,
};
use std::borrow::Cow;
use std::str::{self, FromStr};
use std::sync::Arc;

use crate::column_types::type_name;
use crate::error::{CsvError, Result};
use crate::options::ValueSets;
use crate::process::tokenize::ParsedBlock;
use crate::process::{date_parser, infer};

#[inline]
fn from_str_bytes<N: FromStr>(raw: &[u8]) -> Option<N> {
    str::from_utf8(raw).ok()?.parse().ok()
}

/// Exact decimal literal → unscaled i128.
///
/// 1) Optional sign, digits, optional `.` and fraction.
/// 2) Fraction padded to `scale`; extra digits only if they are zeros.
/// 3) Significant digits must fit in `precision`.
pub fn parse_decimal(raw: &[u8], precision: u8, scale: i8) -> Option<i128> {
    let scale = usize::try_from(scale).ok()?;
    let (neg, body) = match raw.first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let (int_part, frac_part) = match body.iter().position(|&b| b == b'.') {
        Some(p) => (&body[..p], &body[p + 1..]),
        None => (body, &body[body.len()..]),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.iter().chain(frac_part).all(u8::is_ascii_digit) {
        return None;
    }

    let (kept, extra) = frac_part.split_at(frac_part.len().min(scale));
    if extra.iter().any(|&b| b != b'0') {
        return None;
    }
    let int_part = &int_part[int_part.iter().take_while(|&&b| b == b'0').count()..];
    if int_part.len() + scale > usize::from(precision) {
        return None;
    }

    let mut v: i128 = 0;
    for &d in int_part.iter().chain(kept) {
        v = v * 10 + i128::from(d - b'0');
    }
    for _ in kept.len()..scale {
        v *= 10;
    }
    Some(if neg { -v } else { v })
}

/// Turns tokenized fields into typed Arrow arrays, one block at a time.
pub(crate) struct Converter<'a> {
    sets: &'a ValueSets,
    check_utf8: bool,
    strings_can_be_null: bool,
}

impl<'a> Converter<'a> {
    pub(crate) fn new(sets: &'a ValueSets, check_utf8: bool, strings_can_be_null: bool) -> Self {
        Self {
            sets,
            check_utf8,
            strings_can_be_null,
        }
    }

    /// Convert every column of `block` to its final type.
    pub(crate) fn convert_block(
        &self,
        block: &ParsedBlock,
        types: &[DataType],
    ) -> Result<Vec<ArrayRef>> {
        types
            .iter()
            .enumerate()
            .map(|(col, dt)| self.convert_column(block, col, dt))
            .collect()
    }

    fn convert_column(&self, block: &ParsedBlock, col: usize, dt: &DataType) -> Result<ArrayRef> {
        let n = block.num_rows();
        let arr: ArrayRef = match dt {
            DataType::Null => {
                for row in 0..n {
                    let raw = block.field(row, col);
                    if !self.sets.is_null(raw) {
                        return Err(CsvError::conversion(col, type_name(dt), raw));
                    }
                }
                Arc::new(NullArray::new(n))
            }
            DataType::Boolean => {
                let mut b = BooleanBuilder::with_capacity(n);
                for row in 0..n {
                    let raw = block.field(row, col);
                    if self.sets.is_null(raw) {
                        b.append_null();
                        continue;
                    }
                    match self.sets.parse_bool(raw) {
                        Some(v) => b.append_value(v),
                        None => return Err(CsvError::conversion(col, type_name(dt), raw)),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Int8 => self.primitive::<Int8Type>(block, col, dt, from_str_bytes)?,
            DataType::Int16 => self.primitive::<Int16Type>(block, col, dt, from_str_bytes)?,
            DataType::Int32 => self.primitive::<Int32Type>(block, col, dt, from_str_bytes)?,
            DataType::Int64 => self.primitive::<Int64Type>(block, col, dt, infer::parse_int)?,
            DataType::UInt8 => self.primitive::<UInt8Type>(block, col, dt, from_str_bytes)?,
            DataType::UInt16 => self.primitive::<UInt16Type>(block, col, dt, from_str_bytes)?,
            DataType::UInt32 => self.primitive::<UInt32Type>(block, col, dt, from_str_bytes)?,
            DataType::UInt64 => self.primitive::<UInt64Type>(block, col, dt, from_str_bytes)?,
            DataType::Float32 => self.primitive::<Float32Type>(block, col, dt, from_str_bytes)?,
            DataType::Float64 => self.primitive::<Float64Type>(block, col, dt, infer::parse_float)?,
            DataType::Date32 => {
                self.primitive::<Date32Type>(block, col, dt, date_parser::parse_date_days)?
            }
            DataType::Timestamp(unit, None) => {
                let factor: i64 = match unit {
                    TimeUnit::Second => 1,
                    TimeUnit::Millisecond => 1_000,
                    TimeUnit::Microsecond => 1_000_000,
                    TimeUnit::Nanosecond => 1_000_000_000,
                };
                let parse = |raw: &[u8]| {
                    date_parser::parse_timestamp_seconds(raw)?.checked_mul(factor)
                };
                match unit {
                    TimeUnit::Second => {
                        self.primitive::<TimestampSecondType>(block, col, dt, parse)?
                    }
                    TimeUnit::Millisecond => {
                        self.primitive::<TimestampMillisecondType>(block, col, dt, parse)?
                    }
                    TimeUnit::Microsecond => {
                        self.primitive::<TimestampMicrosecondType>(block, col, dt, parse)?
                    }
                    TimeUnit::Nanosecond => {
                        self.primitive::<TimestampNanosecondType>(block, col, dt, parse)?
                    }
                }
            }
            DataType::Decimal128(p, s) => {
                let (p, s) = (*p, *s);
                let arr: PrimitiveArray<Decimal128Type> =
                    self.primitive_array(block, col, dt, |raw| parse_decimal(raw, p, s))?;
                Arc::new(arr.with_precision_and_scale(p, s)?)
            }
            DataType::Utf8 => {
                let mut b = StringBuilder::with_capacity(n, n * 8);
                for row in 0..n {
                    match self.string_value(block.field(row, col), col, dt)? {
                        Some(s) => b.append_value(s),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::LargeUtf8 => {
                let mut b = LargeStringBuilder::with_capacity(n, n * 8);
                for row in 0..n {
                    match self.string_value(block.field(row, col), col, dt)? {
                        Some(s) => b.append_value(s),
                        None => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Binary => {
                let mut b = BinaryBuilder::with_capacity(n, n * 8);
                for row in 0..n {
                    let raw = block.field(row, col);
                    if self.string_is_null(raw) {
                        b.append_null();
                    } else {
                        b.append_value(raw);
                    }
                }
                Arc::new(b.finish())
            }
            DataType::LargeBinary => {
                let mut b = LargeBinaryBuilder::with_capacity(n, n * 8);
                for row in 0..n {
                    let raw = block.field(row, col);
                    if self.string_is_null(raw) {
                        b.append_null();
                    } else {
                        b.append_value(raw);
                    }
                }
                Arc::new(b.finish())
            }
            other => {
                return Err(CsvError::configuration(format!(
                    "unsupported column type {other:?}"
                )))
            }
        };
        Ok(arr)
    }

    #[inline]
    fn string_is_null(&self, raw: &[u8]) -> bool {
        self.strings_can_be_null && self.sets.is_null(raw)
    }

    /// Null, valid UTF-8, or lossily decoded when checking is off.
    fn string_value<'r>(
        &self,
        raw: &'r [u8],
        col: usize,
        dt: &DataType,
    ) -> Result<Option<Cow<'r, str>>> {
        if self.string_is_null(raw) {
            return Ok(None);
        }
        if self.check_utf8 {
            str::from_utf8(raw)
                .map(|s| Some(Cow::Borrowed(s)))
                .map_err(|_| CsvError::conversion(col, type_name(dt), raw))
        } else {
            Ok(Some(String::from_utf8_lossy(raw)))
        }
    }

    fn primitive_array<T: ArrowPrimitiveType>(
        &self,
        block: &ParsedBlock,
        col: usize,
        dt: &DataType,
        parse: impl Fn(&[u8]) -> Option<T::Native>,
    ) -> Result<PrimitiveArray<T>> {
        let n = block.num_rows();
        let mut b = PrimitiveBuilder::<T>::with_capacity(n);
        for row in 0..n {
            let raw = block.field(row, col);
            if self.sets.is_null(raw) {
                b.append_null();
                continue;
            }
            match parse(raw) {
                Some(v) => b.append_value(v),
                None => return Err(CsvError::conversion(col, type_name(dt), raw)),
            }
        }
        Ok(b.finish())
    }

    fn primitive<T: ArrowPrimitiveType>(
        &self,
        block: &ParsedBlock,
        col: usize,
        dt: &DataType,
        parse: impl Fn(&[u8]) -> Option<T::Native>,
    ) -> Result<ArrayRef> {
        Ok(Arc::new(self.primitive_array::<T>(block, col, dt, parse)?))
    }
}
