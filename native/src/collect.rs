// collect.rs - Collection phase: (document, bucket) hits into level-0 state
//
// One HitCollector per segment collector (or one per partition when driven
// directly by the engine). Its state merges with siblings by bit-OR or
// counter addition, so segment visitation order does not matter.

use std::sync::Arc;

use anyhow::Result;
use tantivy::DocAddress;

use crate::bucket_table::BucketBitsetTable;
use crate::config::{EngineConfig, Mode};
use crate::debug_println;
use crate::dedup::{LastSeenDocument, SeenDocuments};
use crate::engine::PartitionSources;
use crate::error::configuration_error;
use crate::host::{BucketId, ForwardSink, Ordinal, OrdinalResolver};
use crate::metrics;
use crate::nesting::{DirectCounts, ReverseNestingStage};

/// Level-0 facts gathered during collection.
#[derive(Debug, Clone)]
pub enum LevelZeroState {
    /// bucket -> level-0 ordinals, walked forward by the level propagator
    Table(BucketBitsetTable),
    /// Nested hits counted per distinct main document; final as-is
    Direct(DirectCounts),
}

impl LevelZeroState {
    pub fn is_empty(&self) -> bool {
        match self {
            LevelZeroState::Table(table) => table.is_empty(),
            LevelZeroState::Direct(counts) => counts.is_empty(),
        }
    }

    /// Fold a sibling segment's state into this one.
    pub fn merge(&mut self, other: LevelZeroState) -> Result<()> {
        match (self, other) {
            (LevelZeroState::Table(mine), LevelZeroState::Table(theirs)) => mine.merge(&theirs),
            (LevelZeroState::Direct(mine), LevelZeroState::Direct(theirs)) => mine.merge(&theirs),
            _ => Err(anyhow::anyhow!(
                "Cannot merge level-0 states built for different aggregation shapes"
            )),
        }
    }
}

/// What a collector passes downstream, fixed when it is built.
enum HitForwarding {
    Off,
    /// Undup: each child hit once per (bucket, doc)
    ChildHits(SeenDocuments),
    /// Nested map-to-parent: each main document once per bucket
    MainDocuments,
}

impl HitForwarding {
    fn for_config(config: &EngineConfig) -> Self {
        if !config.forward_hits {
            return HitForwarding::Off;
        }
        match config.mode {
            Mode::Undup => HitForwarding::ChildHits(SeenDocuments::new(config.memory_limit_bytes())),
            Mode::MapToParent if config.is_direct_count() => HitForwarding::MainDocuments,
            Mode::MapToParent => HitForwarding::Off,
        }
    }
}

pub struct HitCollector {
    resolver: Arc<dyn OrdinalResolver>,
    nesting: Option<ReverseNestingStage>,
    state: LevelZeroState,
    forwarding: HitForwarding,
    seen: LastSeenDocument,
    ordinals: Vec<Ordinal>,
    hits: u64,
}

impl HitCollector {
    pub fn new(config: &EngineConfig, sources: &PartitionSources) -> Result<Self> {
        let nesting = if config.nested {
            let membership = sources.main_documents.clone().ok_or_else(|| {
                configuration_error("nested aggregation requires a main-document filter")
            })?;
            Some(ReverseNestingStage::new(membership))
        } else {
            None
        };
        let state = if config.is_direct_count() {
            LevelZeroState::Direct(DirectCounts::new(config.memory_limit_bytes()))
        } else {
            LevelZeroState::Table(BucketBitsetTable::new(config.memory_limit_bytes()))
        };
        Ok(Self {
            resolver: sources.resolver.clone(),
            nesting,
            state,
            forwarding: HitForwarding::for_config(config),
            seen: LastSeenDocument::new(),
            ordinals: Vec::new(),
            hits: 0,
        })
    }

    /// Record that `doc` was assigned to `bucket`.
    pub fn collect(&mut self, doc: DocAddress, bucket: BucketId, sink: &mut dyn ForwardSink) -> Result<()> {
        self.hits += 1;

        if let HitForwarding::ChildHits(forwarded) = &mut self.forwarding {
            if forwarded.insert(bucket, doc)? {
                sink.forward(bucket, doc)?;
                metrics::record_hits_forwarded(1);
            }
        }

        let target = match &self.nesting {
            Some(stage) => match stage.resolve(doc) {
                Some(main) => main,
                None => return Ok(()),
            },
            None => doc,
        };
        // Repeats are harmless to both states; skipping them saves the ordinal lookup
        if !self.seen.first_sighting(target, bucket) {
            return Ok(());
        }

        match &mut self.state {
            LevelZeroState::Direct(counts) => {
                if counts.count(bucket, target)? && matches!(self.forwarding, HitForwarding::MainDocuments) {
                    sink.forward(bucket, target)?;
                    metrics::record_hits_forwarded(1);
                }
            }
            LevelZeroState::Table(table) => {
                self.resolver.ordinals(0, target, &mut self.ordinals)?;
                for &ordinal in &self.ordinals {
                    table.set(bucket, ordinal)?;
                }
            }
        }
        Ok(())
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn into_state(self) -> LevelZeroState {
        debug_println!("COLLECT: {} hits collected, empty={}", self.hits, self.state.is_empty());
        metrics::record_hits_collected(self.hits);
        self.state
    }
}
