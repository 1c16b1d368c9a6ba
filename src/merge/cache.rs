//! The "cache of previously popped records whose end could still overlap a
//! future record" (spec §4.1). Kept conceptually sorted on `(chrom, end)`;
//! implemented as a plain `Vec` with a linear eviction sweep each pop, which
//! stays within an O(cache-size) eviction bound per pop and avoids the
//! bookkeeping a maintained sort order would need once `end` values no
//! longer correlate with pop order (start order does, end order doesn't).

use crate::order::ChromKey;
use crate::record::Record;

pub struct CacheEntry {
    pub chrom_key: ChromKey,
    pub record: Record,
    /// Accumulates every record this entry has been related to while it sat
    /// in the cache; finalized into `RelatedRecord::related` on eviction.
    pub related: Vec<Record>,
}

#[derive(Default)]
pub struct Cache {
    entries: Vec<CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Evict every entry that can no longer overlap anything at or after
    /// `cur_key`/`cur_start`, handing each to `emit` in eviction order.
    pub fn evict(&mut self, cur_key: &ChromKey, cur_start: u32, slop: u32, mut emit: impl FnMut(CacheEntry)) {
        let mut retained = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let stale = entry.chrom_key < *cur_key
                || (entry.chrom_key == *cur_key && entry.record.end.saturating_add(slop) <= cur_start);
            if stale {
                emit(entry);
            } else {
                retained.push(entry);
            }
        }
        self.entries = retained;
    }

    /// Relate `cur` against every remaining cache entry from a different
    /// source that overlaps it, accumulating the relation on both sides.
    /// Returns `cur`'s own accumulated related list.
    pub fn relate(&mut self, cur: &Record, slop: u32) -> Vec<Record> {
        let mut cur_related = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.record.source_id == cur.source_id {
                continue;
            }
            if overlaps_with_slop(cur, &entry.record, slop) {
                entry.related.push(cur.clone());
                cur_related.push(entry.record.clone());
            }
        }
        cur_related
    }

    pub fn push(&mut self, chrom_key: ChromKey, record: Record, related: Vec<Record>) {
        self.entries.push(CacheEntry { chrom_key, record, related });
    }

    /// Drain every remaining entry in arbitrary order (used at end-of-stream
    /// flush, spec §4.1 "On EOS of all iterators, flush cache in order" —
    /// "in order" there refers to the overall output stream being merged by
    /// the driver afterwards via sequence, not intra-flush order).
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn overlaps_with_slop(a: &Record, b: &Record, slop: u32) -> bool {
    a.chrom == b.chrom
        && a.end.saturating_add(slop) > b.start
        && b.end.saturating_add(slop) > a.start
}
