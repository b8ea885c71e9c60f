// src/process/split.rs

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use rayon::prelude::*;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use tracing::{debug, trace};

use crate::error::Result;
use crate::options::{ParseOptions, ValueSets};
use crate::process::chunk::{BlockReader, RawBlock};
use crate::process::convert::Converter;
use crate::process::infer::{infer_block, Candidates};
use crate::process::tokenize::{tokenize, ParsedBlock};

/// Size the global rayon pool once; later calls are no-ops.
pub(crate) fn init_thread_pool() {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()
        .ok();
}

/// A validated block plus its inference evidence.
#[derive(Debug)]
pub(crate) struct ScannedBlock {
    pub block: ParsedBlock,
    pub candidates: Vec<Candidates>,
}

enum Work {
    Parsed(ParsedBlock),
    Raw(RawBlock),
}

/// Read-only state shared by every block task.
pub(crate) struct BlockPlan<'a> {
    pub parse: &'a ParseOptions,
    pub forced: &'a [Option<DataType>],
    pub sets: &'a ValueSets,
    pub check_utf8: bool,
}

impl BlockPlan<'_> {
    fn scan(&self, work: Work) -> Result<ScannedBlock> {
        let block = match work {
            Work::Parsed(block) => block,
            Work::Raw(raw) => tokenize(&raw.data, raw.offset, self.parse),
        };
        block.check_columns(self.forced.len())?;
        let candidates = infer_block(&block, self.forced, self.sets, self.check_utf8);
        Ok(ScannedBlock { block, candidates })
    }
}

/// Lowest failing block index seen so far; `usize::MAX` while clean.
struct FirstFailure(AtomicUsize);

impl FirstFailure {
    fn new() -> Self {
        Self(AtomicUsize::new(usize::MAX))
    }

    fn record(&self, index: usize) {
        self.0.fetch_min(index, Ordering::SeqCst);
    }

    /// Work past a known failure can be abandoned.
    fn abandons(&self, index: usize) -> bool {
        index > self.0.load(Ordering::SeqCst)
    }

    fn any(&self) -> bool {
        self.0.load(Ordering::SeqCst) != usize::MAX
    }
}

/// Tokenize, validate and infer every remaining block, in block order.
///
/// Threaded: the reader stays on the calling thread and each block becomes a
/// rayon task; results come back tagged with their index into a slot arena.
pub(crate) fn scan_blocks<R: Read>(
    first: Option<ParsedBlock>,
    reader: &mut BlockReader<R>,
    plan: &BlockPlan<'_>,
    use_threads: bool,
) -> Result<Vec<ScannedBlock>> {
    if !use_threads {
        let mut out = Vec::new();
        if let Some(block) = first {
            out.push(plan.scan(Work::Parsed(block))?);
        }
        while let Some(raw) = reader.next_block()? {
            out.push(plan.scan(Work::Raw(raw))?);
        }
        debug!(blocks = out.len(), carved = reader.blocks_read(), "scanned blocks");
        return Ok(out);
    }

    let failure = FirstFailure::new();
    let failure = &failure;
    let (tx, rx) = mpsc::channel::<(usize, Result<ScannedBlock>)>();
    let mut dispatched = 0usize;

    rayon::in_place_scope(|s| {
        let spawn = |index: usize, work: Work| {
            let tx = tx.clone();
            s.spawn(move |_| {
                if failure.abandons(index) {
                    trace!(index, "abandoning block after earlier failure");
                    return;
                }
                let res = plan.scan(work);
                if res.is_err() {
                    failure.record(index);
                }
                let _ = tx.send((index, res));
            });
        };

        if let Some(block) = first {
            spawn(dispatched, Work::Parsed(block));
            dispatched += 1;
        }
        while !failure.any() {
            match reader.next_block() {
                Ok(Some(raw)) => {
                    spawn(dispatched, Work::Raw(raw));
                    dispatched += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    failure.record(dispatched);
                    let _ = tx.send((dispatched, Err(e)));
                    dispatched += 1;
                    break;
                }
            }
        }
    });
    drop(tx);

    let mut slots: Vec<Option<Result<ScannedBlock>>> = (0..dispatched).map(|_| None).collect();
    for (index, res) in rx {
        slots[index] = Some(res);
    }
    debug!(blocks = dispatched, carved = reader.blocks_read(), "scanned blocks");

    let mut out = Vec::with_capacity(dispatched);
    for slot in slots.into_iter().flatten() {
        out.push(slot?);
    }
    Ok(out)
}

/// Convert every block to typed arrays; order follows the input.
pub(crate) fn convert_blocks(
    blocks: &[ScannedBlock],
    types: &[DataType],
    converter: &Converter<'_>,
    use_threads: bool,
) -> Result<Vec<Vec<ArrayRef>>> {
    let results: Vec<Result<Vec<ArrayRef>>> = if use_threads {
        let failure = FirstFailure::new();
        blocks
            .par_iter()
            .enumerate()
            .map(|(index, b)| {
                if failure.abandons(index) {
                    return Ok(Vec::new());
                }
                let res = converter.convert_block(&b.block, types);
                if res.is_err() {
                    failure.record(index);
                }
                res
            })
            .collect()
    } else {
        blocks
            .iter()
            .map(|b| converter.convert_block(&b.block, types))
            .collect()
    };
    // first error in block order wins
    results.into_iter().collect()
}
