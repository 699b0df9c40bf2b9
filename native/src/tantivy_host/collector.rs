// collector.rs - tantivy Collector running the distinct-ancestor aggregation
//
// Segment collectors gather level-0 state for the query's hits. merge_fruits
// folds the states together and runs the level propagation over the whole
// partition. Errors raised inside collect() are carried in the segment fruit
// and surfaced from merge_fruits.

use anyhow::Result;
use tantivy::collector::{Collector, SegmentCollector};
use tantivy::{DocAddress, DocId, Score, Searcher, SegmentOrdinal, SegmentReader, TantivyError};

use super::buckets::{BucketAssigner, SegmentBuckets};
use super::{open_partition, JoinChainConfig};
use crate::collect::{HitCollector, LevelZeroState};
use crate::config::EngineConfig;
use crate::debug_println;
use crate::engine::{finish_partition, prepare_sources, PartitionSources};
use crate::host::BucketId;
use crate::result::AncestorCounts;

/// Counts per bucket plus the (bucket, document) pairs forwarded downstream.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AncestorReport {
    pub counts: AncestorCounts,
    pub forwarded: Vec<(BucketId, DocAddress)>,
}

pub struct DistinctAncestorCollector<B: BucketAssigner> {
    config: EngineConfig,
    /// None when a missing relation degraded the aggregation in resilient mode
    sources: Option<PartitionSources>,
    buckets: B,
}

impl<B: BucketAssigner> DistinctAncestorCollector<B> {
    /// Collector over caller-supplied sources.
    pub fn new(config: EngineConfig, sources: PartitionSources, buckets: B) -> Result<Self> {
        let sources = prepare_sources(&config, || Ok(sources))?;
        Ok(Self {
            config,
            sources,
            buckets,
        })
    }

    /// Collector whose sources are opened from `searcher` per `chain`.
    pub fn open(searcher: &Searcher, chain: &JoinChainConfig, config: EngineConfig, buckets: B) -> Result<Self> {
        let sources = prepare_sources(&config, || open_partition(searcher, chain, &config))?;
        Ok(Self {
            config,
            sources,
            buckets,
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.sources.is_none()
    }

    pub fn buckets(&self) -> &B {
        &self.buckets
    }

    fn merge(&self, fruits: Vec<SegmentFruit>) -> Result<AncestorReport> {
        let Some(sources) = &self.sources else {
            return Ok(AncestorReport::default());
        };

        let mut merged: Option<LevelZeroState> = None;
        let mut forwarded = Vec::new();
        for fruit in fruits {
            if let Some(error) = fruit.error {
                return Err(error);
            }
            forwarded.extend(fruit.forwarded);
            if let Some(state) = fruit.state {
                match merged.as_mut() {
                    Some(existing) => existing.merge(state)?,
                    None => merged = Some(state),
                }
            }
        }

        let counts = match merged {
            Some(state) => finish_partition(&self.config, sources, state, &mut forwarded)?,
            None => AncestorCounts::empty(),
        };
        debug_println!(
            "COLLECTOR: {} buckets counted, {} pairs forwarded",
            counts.len(),
            forwarded.len()
        );
        Ok(AncestorReport { counts, forwarded })
    }
}

fn to_tantivy_error(error: anyhow::Error) -> TantivyError {
    TantivyError::InternalError(format!("{:#}", error))
}

pub struct SegmentFruit {
    state: Option<LevelZeroState>,
    forwarded: Vec<(BucketId, DocAddress)>,
    error: Option<anyhow::Error>,
}

pub struct DistinctAncestorSegmentCollector<S: SegmentBuckets> {
    segment_ord: SegmentOrdinal,
    buckets: S,
    hits: Option<HitCollector>,
    bucket_scratch: Vec<BucketId>,
    forwarded: Vec<(BucketId, DocAddress)>,
    error: Option<anyhow::Error>,
}

impl<B: BucketAssigner> Collector for DistinctAncestorCollector<B> {
    type Fruit = AncestorReport;
    type Child = DistinctAncestorSegmentCollector<B::Segment>;

    fn for_segment(&self, segment_local_id: SegmentOrdinal, reader: &SegmentReader) -> tantivy::Result<Self::Child> {
        let buckets = self
            .buckets
            .for_segment(segment_local_id, reader)
            .map_err(to_tantivy_error)?;
        let hits = match &self.sources {
            Some(sources) => Some(HitCollector::new(&self.config, sources).map_err(to_tantivy_error)?),
            None => None,
        };
        Ok(DistinctAncestorSegmentCollector {
            segment_ord: segment_local_id,
            buckets,
            hits,
            bucket_scratch: Vec::new(),
            forwarded: Vec::new(),
            error: None,
        })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_fruits: Vec<SegmentFruit>) -> tantivy::Result<AncestorReport> {
        self.merge(segment_fruits).map_err(to_tantivy_error)
    }
}

impl<S: SegmentBuckets> SegmentCollector for DistinctAncestorSegmentCollector<S> {
    type Fruit = SegmentFruit;

    fn collect(&mut self, doc: DocId, _score: Score) {
        if self.error.is_some() {
            return;
        }
        let Some(hits) = self.hits.as_mut() else {
            return;
        };
        let address = DocAddress::new(self.segment_ord, doc);
        self.buckets.buckets(doc, &mut self.bucket_scratch);
        for &bucket in &self.bucket_scratch {
            if let Err(error) = hits.collect(address, bucket, &mut self.forwarded) {
                self.error = Some(error);
                return;
            }
        }
    }

    fn harvest(self) -> SegmentFruit {
        SegmentFruit {
            state: self.hits.map(HitCollector::into_state),
            forwarded: self.forwarded,
            error: self.error,
        }
    }
}
