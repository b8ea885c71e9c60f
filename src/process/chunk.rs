// src/process/chunk.rs

use std::io::{self, Read};
use tracing::trace;

use crate::error::Result;
use crate::options::ParseOptions;
use crate::process::tokenize::{RowCursor, Scanner};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A row-aligned slice of the input stream.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub index: usize,
    /// Offset of the first byte within the post-BOM stream.
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Carves a byte stream into blocks that always end on a row boundary.
///
/// 1) Fill the window to `block_size` bytes (or EOF).
/// 2) Cut after the last complete row in the window.
/// 3) No complete row → widen the window by another `block_size` and retry.
/// 4) At EOF the remainder is the closing row.
pub struct BlockReader<R> {
    source: R,
    scanner: Scanner,
    block_size: usize,
    pending: Vec<u8>,
    offset: u64,
    next_index: usize,
    eof: bool,
    bom_checked: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(source: R, block_size: usize, opts: &ParseOptions) -> Self {
        Self {
            source,
            scanner: Scanner::new(opts),
            block_size: block_size.max(1),
            pending: Vec::new(),
            offset: 0,
            next_index: 0,
            eof: false,
            bom_checked: false,
        }
    }

    /// Number of blocks handed out so far.
    pub fn blocks_read(&self) -> usize {
        self.next_index
    }

    fn fill(&mut self, target: usize) -> io::Result<()> {
        while !self.eof && self.pending.len() < target {
            let len = self.pending.len();
            self.pending.resize(target, 0);
            match self.source.read(&mut self.pending[len..]) {
                Ok(0) => {
                    self.pending.truncate(len);
                    self.eof = true;
                }
                Ok(n) => self.pending.truncate(len + n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => self.pending.truncate(len),
                Err(e) => {
                    self.pending.truncate(len);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn strip_bom(&mut self) -> io::Result<()> {
        self.fill(UTF8_BOM.len())?;
        if self.pending.starts_with(UTF8_BOM) {
            trace!("stripping UTF-8 BOM");
            self.pending.drain(..UTF8_BOM.len());
        }
        self.bom_checked = true;
        Ok(())
    }

    /// Next row-aligned block, or `None` once the stream is exhausted.
    pub fn next_block(&mut self) -> Result<Option<RawBlock>> {
        if !self.bom_checked {
            self.strip_bom()?;
        }

        let mut window = self.block_size;
        let mut cursor = RowCursor::default();
        let end = loop {
            self.fill(window)?;
            if self.pending.is_empty() {
                return Ok(None);
            }
            let limit = window.min(self.pending.len());
            let at_eof = self.eof && limit == self.pending.len();
            if let Some(end) = self.scanner.last_row_end(&self.pending[..limit], at_eof, &mut cursor) {
                break end;
            }
            trace!(window, "no complete row in window, growing");
            window += self.block_size;
        };

        let rest = self.pending.split_off(end);
        let data = std::mem::replace(&mut self.pending, rest);
        let block = RawBlock {
            index: self.next_index,
            offset: self.offset,
            data,
        };
        trace!(index = block.index, offset = block.offset, len = block.data.len(), "carved block");
        self.next_index += 1;
        self.offset += block.data.len() as u64;
        Ok(Some(block))
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}
