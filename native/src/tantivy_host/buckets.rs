// buckets.rs - Assign query hits to aggregation buckets
//
// The distinct-ancestor aggregation usually sits below a bucketing
// aggregation. These assigners play that role when the collector runs on its
// own: everything into one bucket, or one bucket per term of a string field.

use std::sync::Arc;

use anyhow::Result;
use tantivy::{DocAddress, DocId, Searcher, SegmentOrdinal, SegmentReader};

use super::global_ordinals::GlobalOrdinals;
use super::resolver::check_string_fast_field;
use crate::host::BucketId;

pub trait BucketAssigner: Send + Sync + 'static {
    type Segment: SegmentBuckets;

    fn for_segment(&self, segment_ord: SegmentOrdinal, reader: &SegmentReader) -> Result<Self::Segment>;
}

pub trait SegmentBuckets: 'static {
    /// Replace `out` with the buckets `doc` belongs to.
    fn buckets(&mut self, doc: DocId, out: &mut Vec<BucketId>);
}

/// Every hit lands in bucket 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleBucket;

impl BucketAssigner for SingleBucket {
    type Segment = SingleBucket;

    fn for_segment(&self, _segment_ord: SegmentOrdinal, _reader: &SegmentReader) -> Result<SingleBucket> {
        Ok(SingleBucket)
    }
}

impl SegmentBuckets for SingleBucket {
    fn buckets(&mut self, _doc: DocId, out: &mut Vec<BucketId>) {
        out.clear();
        out.push(0);
    }
}

/// One bucket per distinct value of a string fast field; bucket id = global ordinal.
#[derive(Clone)]
pub struct TermsBucketAssigner {
    ordinals: Arc<GlobalOrdinals>,
}

impl TermsBucketAssigner {
    pub fn open(searcher: &Searcher, column: &str) -> Result<Self> {
        check_string_fast_field(searcher, column)?;
        Ok(Self {
            ordinals: Arc::new(GlobalOrdinals::build(searcher, column)?),
        })
    }

    /// Term a bucket stands for.
    pub fn bucket_key(&self, bucket: BucketId) -> Option<&str> {
        self.ordinals.term(bucket)
    }
}

impl BucketAssigner for TermsBucketAssigner {
    type Segment = TermsSegmentBuckets;

    fn for_segment(&self, segment_ord: SegmentOrdinal, _reader: &SegmentReader) -> Result<TermsSegmentBuckets> {
        Ok(TermsSegmentBuckets {
            ordinals: self.ordinals.clone(),
            segment_ord,
        })
    }
}

pub struct TermsSegmentBuckets {
    ordinals: Arc<GlobalOrdinals>,
    segment_ord: SegmentOrdinal,
}

impl SegmentBuckets for TermsSegmentBuckets {
    fn buckets(&mut self, doc: DocId, out: &mut Vec<BucketId>) {
        out.clear();
        self.ordinals
            .ordinals_for_doc(DocAddress::new(self.segment_ord, doc), out);
        if out.len() > 1 {
            out.sort_unstable();
            out.dedup();
        }
    }
}
