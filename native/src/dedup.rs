// dedup.rs - Folding repeated (document, bucket) observations
//
// LastSeenDocument only remembers the most recent document. It folds the
// repeats of one physical document that arrive back to back (multi-valued
// keys, one ancestor visited per scan). SeenDocuments remembers every pair and
// does not depend on arrival order.

use std::collections::BTreeMap;

use anyhow::Result;
use tantivy::DocAddress;

use crate::bucket_table::BucketBitsetTable;
use crate::host::BucketId;

#[derive(Debug, Default, Clone)]
pub struct LastSeenDocument {
    doc: Option<DocAddress>,
    buckets: Vec<BucketId>,
}

impl LastSeenDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time (`doc`, `bucket`) is seen since `doc` became the current document.
    pub fn first_sighting(&mut self, doc: DocAddress, bucket: BucketId) -> bool {
        if self.doc != Some(doc) {
            self.doc = Some(doc);
            self.buckets.clear();
        }
        if self.buckets.contains(&bucket) {
            return false;
        }
        self.buckets.push(bucket);
        true
    }

    /// True the first time `doc` is seen, regardless of bucket.
    pub fn first_visit(&mut self, doc: DocAddress) -> bool {
        if self.doc == Some(doc) {
            return false;
        }
        self.doc = Some(doc);
        self.buckets.clear();
        true
    }
}

/// Every (bucket, document) pair recorded so far: per segment, a bucket ->
/// doc id table.
#[derive(Debug, Clone)]
pub struct SeenDocuments {
    segments: BTreeMap<u32, BucketBitsetTable>,
    memory_limit: usize,
}

impl SeenDocuments {
    /// `memory_limit` bounds each segment's table.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            segments: BTreeMap::new(),
            memory_limit,
        }
    }

    /// Record (`bucket`, `doc`). Returns true if the pair was not recorded before.
    pub fn insert(&mut self, bucket: BucketId, doc: DocAddress) -> Result<bool> {
        let memory_limit = self.memory_limit;
        self.segments
            .entry(doc.segment_ord)
            .or_insert_with(|| BucketBitsetTable::new(memory_limit))
            .set(bucket, doc.doc_id)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.values().all(|table| table.total_set_bits() == 0)
    }

    /// Distinct documents recorded for `bucket`.
    pub fn count(&self, bucket: BucketId) -> u64 {
        self.segments
            .values()
            .filter_map(|table| table.get(bucket))
            .map(|docs| docs.cardinality())
            .sum()
    }

    /// Distinct documents per bucket, buckets without documents omitted.
    pub fn counts(&self) -> BTreeMap<BucketId, u64> {
        let mut counts = BTreeMap::new();
        for table in self.segments.values() {
            for (bucket, docs) in table.iter() {
                let distinct = docs.cardinality();
                if distinct > 0 {
                    *counts.entry(bucket).or_insert(0) += distinct;
                }
            }
        }
        counts
    }

    pub fn merge(&mut self, other: &SeenDocuments) -> Result<()> {
        for (segment_ord, table) in &other.segments {
            let memory_limit = self.memory_limit;
            self.segments
                .entry(*segment_ord)
                .or_insert_with(|| BucketBitsetTable::new(memory_limit))
                .merge(table)?;
        }
        Ok(())
    }
}
