//! Min-heap entries for the k-way merge (spec §4.1).
//!
//! `std::collections::BinaryHeap` is a max-heap; entries reverse their
//! comparison so the smallest `(chrom, start, end, source_id)` pops first.
//! A `HeapEntry` pattern generalized from BED3 tuples to full `Record`s.

use std::cmp::Ordering;

use crate::order::ChromKey;
use crate::record::Record;

pub struct HeapItem {
    pub chrom_key: ChromKey,
    pub start: u32,
    pub end: u32,
    pub source_id: u32,
    pub record: Record,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.chrom_key == other.chrom_key
            && self.start == other.start
            && self.end == other.end
            && self.source_id == other.source_id
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest key on top.
        other
            .chrom_key
            .cmp(&self.chrom_key)
            .then(other.start.cmp(&self.start))
            .then(other.end.cmp(&self.end))
            .then(other.source_id.cmp(&self.source_id))
    }
}
