//! Parallel driver (spec §4.2, §5).
//!
//! Chunks the merge engine's query-only output, fans per-query annotation
//! out across a bounded-channel worker pool built on `crossbeam::channel`
//! `Sender`/`Receiver` pairs, and restores input order before handing
//! chunks to the caller. Chunk-cutting itself is plain, independently
//! testable logic (`Chunker`) with no threading.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;

use crate::annotate::annotate_query_record;
use crate::error::Result;
use crate::merge::RelatedRecord;
use crate::record::Chrom;
use crate::source::{PostAnnotationRule, Source};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub max_chunk: usize,
    pub max_gap: u32,
    pub workers: usize,
    pub ends: bool,
    pub strict: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_chunk: 8_000, max_gap: 20_000, workers: 2, ends: false, strict: true }
    }
}

/// Accumulates query records into chunks, cutting on size, genomic gap, or
/// chromosome change (spec §4.2). Pure and thread-free so it's testable on
/// its own.
struct Chunker {
    max_chunk: usize,
    max_gap: u32,
    current: Vec<RelatedRecord>,
    chrom: Option<Chrom>,
    anchor_end: u32,
}

impl Chunker {
    fn new(max_chunk: usize, max_gap: u32) -> Self {
        Self { max_chunk, max_gap, current: Vec::new(), chrom: None, anchor_end: 0 }
    }

    /// Feed one item in; returns a completed chunk if this item crossed a
    /// boundary (the completed chunk does NOT include `item` itself, which
    /// starts the next chunk).
    fn push(&mut self, item: RelatedRecord) -> Option<Vec<RelatedRecord>> {
        let boundary = match &self.chrom {
            Some(c) => {
                c.as_ref() != item.record.chrom.as_ref()
                    || item.record.start.saturating_sub(self.anchor_end) > self.max_gap
            }
            None => false,
        };
        let completed = if boundary || self.current.len() >= self.max_chunk {
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };
        self.chrom = Some(item.record.chrom.clone());
        self.anchor_end = item.record.end;
        self.current.push(item);
        completed
    }

    fn flush(&mut self) -> Option<Vec<RelatedRecord>> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

struct Chunk {
    seq: u64,
    items: Vec<RelatedRecord>,
}

struct ChunkOutput {
    seq: u64,
    result: Result<Vec<RelatedRecord>>,
}

/// Run the full driver: pull query-only related-records from `next_related`
/// until exhausted, annotate them across `config.workers` worker threads,
/// and call `emit` on each fully-annotated record in original input order.
///
/// `next_related` is called synchronously on the calling thread — the merge
/// engine is the "producer" here, but it doesn't get a thread of its own,
/// since the engine's iterators are not required to be `Send`.
pub fn run(
    mut next_related: impl FnMut() -> Result<Option<RelatedRecord>>,
    config: &DriverConfig,
    sources: Arc<Vec<Source>>,
    post_rules: Arc<Vec<PostAnnotationRule>>,
    mut emit: impl FnMut(RelatedRecord) -> Result<()>,
) -> Result<()> {
    let workers = config.workers.max(1);
    let (ingress_tx, ingress_rx) = bounded::<Chunk>(2 * workers);
    let (egress_tx, egress_rx) = bounded::<ChunkOutput>(2 * workers);
    let (ready_tx, ready_rx) = bounded::<ChunkOutput>(2 * workers);

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let ingress_rx = ingress_rx.clone();
        let egress_tx = egress_tx.clone();
        let sources = Arc::clone(&sources);
        let post_rules = Arc::clone(&post_rules);
        let do_ends = config.ends;
        let strict = config.strict;
        worker_handles.push(thread::spawn(move || {
            for chunk in ingress_rx.iter() {
                let Chunk { seq, mut items } = chunk;
                let mut fatal = None;
                for item in items.iter_mut() {
                    if let Err(e) = annotate_query_record(item, &sources, &post_rules, do_ends, strict) {
                        fatal = Some(e);
                        break;
                    }
                }
                let result = match fatal {
                    Some(e) => Err(e),
                    None => Ok(items),
                };
                if egress_tx.send(ChunkOutput { seq, result }).is_err() {
                    return;
                }
            }
        }));
    }
    drop(ingress_rx);
    drop(egress_tx);

    let reorder_handle = thread::spawn(move || reorder_loop(egress_rx, ready_tx));

    let mut seq = 0u64;
    let mut chunker = Chunker::new(config.max_chunk, config.max_gap);
    let mut producer_err = None;
    loop {
        match next_related() {
            Ok(Some(item)) => {
                if item.record.source_id != 0 {
                    continue;
                }
                if let Some(completed) = chunker.push(item) {
                    if ingress_tx.send(Chunk { seq, items: completed }).is_err() {
                        break;
                    }
                    seq += 1;
                }
            }
            Ok(None) => {
                if let Some(completed) = chunker.flush() {
                    let _ = ingress_tx.send(Chunk { seq, items: completed });
                }
                break;
            }
            Err(e) => {
                producer_err = Some(e);
                break;
            }
        }
    }
    drop(ingress_tx);

    for handle in worker_handles {
        let _ = handle.join();
    }

    let mut first_err = None;
    for output in ready_rx.iter() {
        match output.result {
            Ok(items) => {
                for item in items {
                    if let Err(e) = emit(item) {
                        first_err = Some(e);
                        break;
                    }
                }
            }
            Err(e) => {
                first_err = Some(e);
            }
        }
        if first_err.is_some() {
            break;
        }
    }
    let _ = reorder_handle.join();

    match first_err.or(producer_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Buffers out-of-order worker output by sequence number and forwards it to
/// `ready_tx` strictly in order (spec §4.2 "reorder buffer").
fn reorder_loop(egress_rx: crossbeam_channel::Receiver<ChunkOutput>, ready_tx: crossbeam_channel::Sender<ChunkOutput>) {
    let mut pending: HashMap<u64, ChunkOutput> = HashMap::new();
    let mut next_seq = 0u64;
    for output in egress_rx.iter() {
        if output.seq == next_seq {
            if ready_tx.send(output).is_err() {
                return;
            }
            next_seq += 1;
            while let Some(buffered) = pending.remove(&next_seq) {
                if ready_tx.send(buffered).is_err() {
                    return;
                }
                next_seq += 1;
            }
        } else {
            pending.insert(output.seq, output);
        }
    }
}
