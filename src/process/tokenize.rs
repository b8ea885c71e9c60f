// src/process/tokenize.rs

//! Row tokenizer.
//!
//! A single-pass byte state machine splits a block into rows and fields,
//! resolving quoting and escaping into logical field content. The same
//! scanner finds row boundaries for the block reader, through a sink that
//! discards the output.

use crate::error::{CsvError, Result};
use crate::options::ParseOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Receives the tokens of a scanned row.
pub(crate) trait RowSink {
    fn push_byte(&mut self, b: u8);
    fn end_field(&mut self);
    fn end_row(&mut self, row_start: usize);
}

/// Discards everything; used when only boundaries matter.
impl RowSink for () {
    #[inline]
    fn push_byte(&mut self, _b: u8) {}
    #[inline]
    fn end_field(&mut self) {}
    #[inline]
    fn end_row(&mut self, _row_start: usize) {}
}

/// Where a row scan stopped for lack of input.
///
/// Feeding it back with a longer buffer continues the same row without
/// rescanning the bytes already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowCursor {
    pos: usize,
    state: State,
}

impl RowCursor {
    fn at(pos: usize) -> Self {
        Self {
            pos,
            state: State::FieldStart,
        }
    }
}

impl Default for RowCursor {
    fn default() -> Self {
        Self::at(0)
    }
}

enum Scan {
    Row(usize),
    Pending(RowCursor),
}

#[inline]
fn is_newline(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Byte-level dialect scanner.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scanner {
    delimiter: u8,
    quote: Option<u8>,
    escape: Option<u8>,
    double_quote: bool,
    newlines_in_values: bool,
    ignore_empty_lines: bool,
}

impl Scanner {
    pub(crate) fn new(opts: &ParseOptions) -> Self {
        Self {
            delimiter: opts.delimiter,
            quote: opts.quote_char,
            escape: opts.escape_char,
            double_quote: opts.double_quote,
            newlines_in_values: opts.newlines_in_values,
            ignore_empty_lines: opts.ignore_empty_lines,
        }
    }

    /// Scan the row starting at `start`.
    ///
    /// Returns the index just past the row terminator. Without a terminator
    /// the row only completes when `at_eof` is set; otherwise `None` is
    /// returned and the sink may have seen a partial row. A trailing `\r`
    /// (or escape byte) is incomplete unless `at_eof`, since the byte that
    /// follows decides its meaning.
    pub(crate) fn scan_row<S: RowSink>(
        &self,
        data: &[u8],
        start: usize,
        at_eof: bool,
        sink: &mut S,
    ) -> Option<usize> {
        match self.resume_row(data, start, RowCursor::at(start), at_eof, sink) {
            Scan::Row(end) => Some(end),
            Scan::Pending(_) => None,
        }
    }

    /// Continue the row starting at `start` from `cursor`.
    fn resume_row<S: RowSink>(
        &self,
        data: &[u8],
        start: usize,
        cursor: RowCursor,
        at_eof: bool,
        sink: &mut S,
    ) -> Scan {
        let n = data.len();
        let RowCursor { pos: mut i, mut state } = cursor;

        loop {
            if i == n {
                if !at_eof {
                    return Scan::Pending(RowCursor { pos: i, state });
                }
                sink.end_field();
                sink.end_row(start);
                return Scan::Row(n);
            }

            let b = data[i];

            if is_newline(b) && !(state == State::Quoted && self.newlines_in_values) {
                let empty = i == start;
                let at = i;
                i += 1;
                if b == b'\r' {
                    if i == n && !at_eof {
                        return Scan::Pending(RowCursor { pos: at, state });
                    }
                    if i < n && data[i] == b'\n' {
                        i += 1;
                    }
                }
                if !empty {
                    sink.end_field();
                    sink.end_row(start);
                } else if !self.ignore_empty_lines {
                    sink.end_field();
                    sink.end_row(start);
                }
                return Scan::Row(i);
            }

            if Some(b) == self.escape {
                match data.get(i + 1) {
                    None if !at_eof => return Scan::Pending(RowCursor { pos: i, state }),
                    None => {
                        i += 1;
                    }
                    Some(&next) if is_newline(next) && !self.newlines_in_values => {
                        // The terminator wins; the dangling escape is dropped.
                        i += 1;
                    }
                    Some(&next) => {
                        sink.push_byte(next);
                        i += 2;
                    }
                }
                state = match state {
                    State::Quoted => State::Quoted,
                    _ => State::Unquoted,
                };
                continue;
            }

            match state {
                State::FieldStart => {
                    if Some(b) == self.quote {
                        state = State::Quoted;
                    } else if b == self.delimiter {
                        sink.end_field();
                    } else {
                        sink.push_byte(b);
                        state = State::Unquoted;
                    }
                }
                State::Unquoted => {
                    if b == self.delimiter {
                        sink.end_field();
                        state = State::FieldStart;
                    } else {
                        sink.push_byte(b);
                    }
                }
                State::Quoted => {
                    if Some(b) == self.quote {
                        state = State::QuoteInQuoted;
                    } else {
                        sink.push_byte(b);
                    }
                }
                State::QuoteInQuoted => {
                    if self.double_quote && Some(b) == self.quote {
                        sink.push_byte(b);
                        state = State::Quoted;
                    } else if b == self.delimiter {
                        sink.end_field();
                        state = State::FieldStart;
                    } else {
                        // Content after a closing quote is kept as-is.
                        sink.push_byte(b);
                        state = State::Unquoted;
                    }
                }
            }
            i += 1;
        }
    }

    /// End of the last complete row in `data`, if any.
    ///
    /// `data` must begin on a row boundary. When nothing completes, `cursor`
    /// records how far the search got, so a retry over a longer `data` with
    /// the same prefix only looks at the new bytes.
    pub(crate) fn last_row_end(
        &self,
        data: &[u8],
        at_eof: bool,
        cursor: &mut RowCursor,
    ) -> Option<usize> {
        if data.is_empty() {
            return None;
        }
        if at_eof {
            return Some(data.len());
        }
        if !self.newlines_in_values {
            // Every raw terminator ends a row, so search backwards. Nothing
            // before the cursor ended a row, save a trailing `\r`.
            let from = cursor.pos.saturating_sub(1).min(data.len());
            let found = match data[from..].iter().rposition(|&b| is_newline(b)) {
                Some(p) if from + p + 1 == data.len() && data[from + p] == b'\r' => data
                    [from..from + p]
                    .iter()
                    .rposition(|&b| is_newline(b))
                    .map(|q| from + q + 1),
                Some(p) => Some(from + p + 1),
                None => None,
            };
            if found.is_none() {
                cursor.pos = data.len();
            }
            return found;
        }
        let mut last = None;
        let mut start = 0;
        let mut resume = *cursor;
        while start < data.len() {
            match self.resume_row(data, start, resume, false, &mut ()) {
                Scan::Row(end) => {
                    last = Some(end);
                    start = end;
                    resume = RowCursor::at(end);
                }
                Scan::Pending(stopped) => {
                    if last.is_none() {
                        *cursor = stopped;
                    }
                    break;
                }
            }
        }
        last
    }
}

/// The rows of one block, with quoting and escaping resolved.
#[derive(Debug, Clone, Default)]
pub struct ParsedBlock {
    values: Vec<u8>,
    field_ends: Vec<usize>,
    row_ends: Vec<usize>,
    row_offsets: Vec<u64>,
    base_offset: u64,
    first_row: usize,
}

impl RowSink for ParsedBlock {
    #[inline]
    fn push_byte(&mut self, b: u8) {
        self.values.push(b);
    }

    #[inline]
    fn end_field(&mut self) {
        self.field_ends.push(self.values.len());
    }

    #[inline]
    fn end_row(&mut self, row_start: usize) {
        self.row_ends.push(self.field_ends.len());
        self.row_offsets.push(self.base_offset + row_start as u64);
    }
}

impl ParsedBlock {
    pub fn num_rows(&self) -> usize {
        self.row_ends.len() - self.first_row
    }

    fn row_field_span(&self, row: usize) -> (usize, usize) {
        let r = row + self.first_row;
        let start = if r == 0 { 0 } else { self.row_ends[r - 1] };
        (start, self.row_ends[r])
    }

    /// Number of fields in `row`.
    pub fn row_len(&self, row: usize) -> usize {
        let (start, end) = self.row_field_span(row);
        end - start
    }

    #[inline]
    fn field_bytes(&self, idx: usize) -> &[u8] {
        let start = if idx == 0 { 0 } else { self.field_ends[idx - 1] };
        &self.values[start..self.field_ends[idx]]
    }

    /// Field `col` of `row`; the caller guarantees `col < row_len(row)`.
    #[inline]
    pub fn field(&self, row: usize, col: usize) -> &[u8] {
        let (start, _) = self.row_field_span(row);
        self.field_bytes(start + col)
    }

    pub fn row_fields(&self, row: usize) -> impl Iterator<Item = &[u8]> + '_ {
        let (start, end) = self.row_field_span(row);
        (start..end).map(move |idx| self.field_bytes(idx))
    }

    /// Absolute stream offset of the start of `row`.
    pub fn row_offset(&self, row: usize) -> u64 {
        self.row_offsets[row + self.first_row]
    }

    /// Hide the first `n` visible rows; returns how many were dropped.
    pub(crate) fn drop_leading_rows(&mut self, n: usize) -> usize {
        let dropped = n.min(self.num_rows());
        self.first_row += dropped;
        dropped
    }

    /// Every visible row must have exactly `expected` fields.
    pub(crate) fn check_columns(&self, expected: usize) -> Result<()> {
        for row in 0..self.num_rows() {
            let actual = self.row_len(row);
            if actual != expected {
                return Err(CsvError::ColumnCount {
                    expected,
                    actual,
                    offset: self.row_offset(row),
                });
            }
        }
        Ok(())
    }
}

/// Tokenize a complete, row-aligned block.
pub fn tokenize(data: &[u8], base_offset: u64, opts: &ParseOptions) -> ParsedBlock {
    let scanner = Scanner::new(opts);
    let mut block = ParsedBlock {
        values: Vec::with_capacity(data.len()),
        base_offset,
        ..ParsedBlock::default()
    };
    let mut pos = 0;
    while pos < data.len() {
        match scanner.scan_row(data, pos, true, &mut block) {
            Some(end) => pos = end,
            None => break,
        }
    }
    block
}
