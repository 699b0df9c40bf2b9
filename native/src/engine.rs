// engine.rs - One partition's distinct-ancestor aggregation pass
//
// collect() hits during the host's per-segment callbacks, then finish() runs
// the level propagation and returns per-bucket counts. A missing relation
// either fails construction or, with `resilient`, yields an empty result.

use std::sync::Arc;

use anyhow::Result;
use tantivy::DocAddress;

use crate::collect::{HitCollector, LevelZeroState};
use crate::config::EngineConfig;
use crate::debug_println;
use crate::error::{configuration_error, AggregationError};
use crate::host::{AncestorScan, BucketId, ForwardSink, MainDocumentMembership, OrdinalResolver};
use crate::metrics;
use crate::propagate::LevelPropagator;
use crate::result::{materialize, AncestorCounts};

/// The storage-layer collaborators for one partition.
#[derive(Clone)]
pub struct PartitionSources {
    pub resolver: Arc<dyn OrdinalResolver>,
    pub ancestors: Arc<dyn AncestorScan>,
    pub main_documents: Option<Arc<dyn MainDocumentMembership>>,
}

impl PartitionSources {
    /// Check that every collaborator the config relies on is present.
    pub fn check(&self, config: &EngineConfig) -> Result<()> {
        for level in 1..=config.levels {
            self.ancestors.ensure_level(level)?;
        }
        if config.nested && self.main_documents.is_none() {
            return Err(configuration_error(
                "nested aggregation requires a main-document filter",
            ));
        }
        Ok(())
    }
}

/// Build and check sources; Ok(None) means the aggregation degrades to empty.
pub fn prepare_sources(
    config: &EngineConfig,
    build: impl FnOnce() -> Result<PartitionSources>,
) -> Result<Option<PartitionSources>> {
    config.validate()?;
    let sources = build().and_then(|sources| {
        sources.check(config)?;
        Ok(sources)
    });
    match sources {
        Ok(sources) => Ok(Some(sources)),
        Err(e) if config.resilient && AggregationError::is_configuration(&e) => {
            debug_println!("⚠️ ENGINE: {:#}; resilient mode, producing empty counts", e);
            metrics::record_degraded_aggregation();
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Turn merged level-0 state into final counts.
pub fn finish_partition(
    config: &EngineConfig,
    sources: &PartitionSources,
    state: LevelZeroState,
    sink: &mut dyn ForwardSink,
) -> Result<AncestorCounts> {
    match state {
        LevelZeroState::Direct(counts) => Ok(counts.into_counts()),
        LevelZeroState::Table(table) => {
            if table.is_empty() {
                return Ok(AncestorCounts::empty());
            }
            debug_println!(
                "ENGINE: level 0 holds {} buckets, {} bits; propagating {} levels",
                table.len(),
                table.total_set_bits(),
                config.levels
            );
            let propagator =
                LevelPropagator::new(config, sources.resolver.as_ref(), sources.ancestors.as_ref());
            let final_table = propagator.run(table, sink)?;
            Ok(materialize(&final_table))
        }
    }
}

struct ActivePass {
    sources: PartitionSources,
    hits: HitCollector,
}

pub struct AncestorAggregator {
    config: EngineConfig,
    active: Option<ActivePass>,
}

impl AncestorAggregator {
    pub fn new(config: EngineConfig, sources: PartitionSources) -> Result<Self> {
        Self::try_build(config, || Ok(sources))
    }

    /// Build sources lazily so configuration errors raised while opening them
    /// are subject to the resilience flag.
    pub fn try_build(
        config: EngineConfig,
        build: impl FnOnce() -> Result<PartitionSources>,
    ) -> Result<Self> {
        let active = match prepare_sources(&config, build)? {
            Some(sources) => {
                let hits = HitCollector::new(&config, &sources)?;
                Some(ActivePass { sources, hits })
            }
            None => None,
        };
        Ok(Self { config, active })
    }

    /// True when a missing relation turned this pass into an empty one.
    pub fn is_degraded(&self) -> bool {
        self.active.is_none()
    }

    pub fn collect(&mut self, doc: DocAddress, bucket: BucketId, sink: &mut dyn ForwardSink) -> Result<()> {
        match &mut self.active {
            Some(pass) => pass.hits.collect(doc, bucket, sink),
            None => Ok(()),
        }
    }

    pub fn finish(self, sink: &mut dyn ForwardSink) -> Result<AncestorCounts> {
        let Some(pass) = self.active else {
            return Ok(AncestorCounts::empty());
        };
        let state = pass.hits.into_state();
        finish_partition(&self.config, &pass.sources, state, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::host::NoForwarding;
    use crate::test_support::{doc, FakePartition};

    const X: BucketId = 0;
    const Y: BucketId = 1;

    // c1, c2 -> parent p1 (ordinal 0); c3 -> parent p2 (ordinal 1)
    fn scenario_a() -> FakePartition {
        FakePartition::new(1)
            .keyed(doc(0, 0), &[(0, &[0])])
            .keyed(doc(0, 1), &[(0, &[0])])
            .keyed(doc(0, 2), &[(0, &[1])])
            .ancestor(1, doc(0, 3), &[(0, &[0]), (1, &[0])])
            .ancestor(1, doc(0, 4), &[(0, &[1]), (1, &[1])])
    }

    fn run(config: EngineConfig, partition: FakePartition, hits: &[(DocAddress, BucketId)]) -> AncestorCounts {
        let mut engine = AncestorAggregator::new(config, partition.sources()).unwrap();
        for &(hit, bucket) in hits {
            engine.collect(hit, bucket, &mut NoForwarding).unwrap();
        }
        engine.finish(&mut NoForwarding).unwrap()
    }

    #[test]
    fn test_undup_counts_distinct_parents() {
        let hits = [(doc(0, 0), X), (doc(0, 1), X), (doc(0, 2), X)];
        let counts = run(EngineConfig::default(), scenario_a(), &hits);
        assert_eq!(counts.get(X), 2);
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn test_two_level_chain_counts_grandparent_once() {
        // c1 -> p1 (level-0 ordinal 0) -> g1 (level-1 ordinal 0)
        let partition = FakePartition::new(2)
            .keyed(doc(0, 0), &[(0, &[0])])
            .ancestor(1, doc(0, 1), &[(0, &[0]), (1, &[0])])
            .ancestor(2, doc(0, 2), &[(1, &[0]), (2, &[0])]);
        let config = EngineConfig {
            levels: 2,
            ..Default::default()
        };

        let counts = run(config, partition, &[(doc(0, 0), Y)]);

        assert_eq!(counts.get(Y), 1);
    }

    #[test]
    fn test_map_to_parent_forwards_two_parents() {
        let config = EngineConfig {
            mode: Mode::MapToParent,
            forward_hits: true,
            ..Default::default()
        };
        let mut engine = AncestorAggregator::new(config, scenario_a().sources()).unwrap();
        let mut sink: Vec<(BucketId, DocAddress)> = Vec::new();
        for hit in [doc(0, 0), doc(0, 1), doc(0, 2)] {
            engine.collect(hit, X, &mut sink).unwrap();
        }
        assert!(sink.is_empty(), "MapToParent forwards nothing during collection");

        let counts = engine.finish(&mut sink).unwrap();

        assert_eq!(counts.get(X), 2);
        assert_eq!(sink, vec![(X, doc(0, 3)), (X, doc(0, 4))]);
    }

    #[test]
    fn test_multi_valued_hit_counts_once() {
        let partition = FakePartition::new(1)
            .keyed(doc(0, 0), &[(0, &[5, 5])])
            .ancestor(1, doc(0, 1), &[(0, &[5]), (1, &[2])]);

        let counts = run(EngineConfig::default(), partition, &[(doc(0, 0), X)]);

        assert_eq!(counts.get(X), 1);
    }

    #[test]
    fn test_repeated_facts_do_not_change_counts() {
        let once = run(
            EngineConfig::default(),
            scenario_a(),
            &[(doc(0, 0), X), (doc(0, 2), Y)],
        );
        let repeated = run(
            EngineConfig::default(),
            scenario_a(),
            &[(doc(0, 0), X), (doc(0, 0), X), (doc(0, 1), X), (doc(0, 2), Y), (doc(0, 2), Y)],
        );
        assert_eq!(once, repeated);
    }

    #[test]
    fn test_order_independence() {
        let partition = || {
            FakePartition::new(1)
                .keyed(doc(0, 0), &[(0, &[0])])
                .keyed(doc(1, 0), &[(0, &[1])])
                .keyed(doc(1, 1), &[(0, &[2])])
                .ancestor(1, doc(0, 5), &[(0, &[0]), (1, &[0])])
                .ancestor(1, doc(1, 5), &[(0, &[1]), (1, &[0])])
                .ancestor(1, doc(1, 6), &[(0, &[2]), (1, &[1])])
        };
        let hits = [(doc(0, 0), X), (doc(1, 0), X), (doc(1, 1), X), (doc(1, 1), Y)];
        let mut reversed_hits = hits;
        reversed_hits.reverse();

        let forward = run(EngineConfig::default(), partition(), &hits);
        let backward = run(EngineConfig::default(), partition().reversed_segments(), &reversed_hits);

        assert_eq!(forward, backward);
        assert_eq!(forward.get(X), 2);
        assert_eq!(forward.get(Y), 1);
    }

    #[test]
    fn test_counts_match_reachable_ancestors() {
        // Bucket X reaches parents 0,1,2 which roll up to ancestors {0, 1}
        let partition = FakePartition::new(1)
            .keyed(doc(0, 0), &[(0, &[0])])
            .keyed(doc(0, 1), &[(0, &[1])])
            .keyed(doc(0, 2), &[(0, &[2])])
            .keyed(doc(0, 3), &[(0, &[3])])
            .ancestor(1, doc(0, 10), &[(0, &[0]), (1, &[0])])
            .ancestor(1, doc(0, 11), &[(0, &[1]), (1, &[0])])
            .ancestor(1, doc(0, 12), &[(0, &[2]), (1, &[1])])
            .ancestor(1, doc(0, 13), &[(0, &[3]), (1, &[2])]);
        let hits = [(doc(0, 0), X), (doc(0, 1), X), (doc(0, 2), X), (doc(0, 3), Y)];

        let counts = run(EngineConfig::default(), partition, &hits);

        assert_eq!(counts.get(X), 2);
        assert_eq!(counts.get(Y), 1);
    }

    #[test]
    fn test_no_hits_is_empty() {
        let counts = run(EngineConfig::default(), scenario_a(), &[]);
        assert!(counts.is_empty());

        let mut other: AncestorCounts = [(X, 3)].into_iter().collect();
        let before = other.clone();
        other.merge(&counts);
        assert_eq!(other, before);
    }

    #[test]
    fn test_missing_relation_fails_without_resilience() {
        let config = EngineConfig {
            levels: 2,
            ..Default::default()
        };
        let err = AncestorAggregator::new(config, scenario_a().sources()).err().unwrap();
        assert!(AggregationError::is_configuration(&err));
    }

    #[test]
    fn test_missing_relation_degrades_when_resilient() {
        let config = EngineConfig {
            levels: 2,
            resilient: true,
            ..Default::default()
        };
        let mut engine = AncestorAggregator::new(config, scenario_a().sources()).unwrap();
        assert!(engine.is_degraded());

        engine.collect(doc(0, 0), X, &mut NoForwarding).unwrap();
        assert!(engine.finish(&mut NoForwarding).unwrap().is_empty());
    }

    #[test]
    fn test_resilience_does_not_hide_other_failures() {
        let config = EngineConfig {
            resilient: true,
            ..Default::default()
        };
        let result = AncestorAggregator::try_build(config, || Err(anyhow::anyhow!("index corrupted")));
        assert!(result.is_err());
    }

    #[test]
    fn test_nested_hits_count_main_documents() {
        // Segment 0: nested 0,1 under main 2; nested 3 under main 4
        let partition = FakePartition::new(0)
            .main_doc(doc(0, 2))
            .main_doc(doc(0, 4));
        let config = EngineConfig {
            levels: 0,
            nested: true,
            ..Default::default()
        };

        let counts = run(
            config,
            partition,
            &[(doc(0, 0), X), (doc(0, 1), X), (doc(0, 3), X), (doc(0, 3), Y)],
        );

        assert_eq!(counts.get(X), 2);
        assert_eq!(counts.get(Y), 1);
    }

    #[test]
    fn test_nested_then_join() {
        // Two main docs (2 and 5) both belong to parent ordinal 0
        let partition = FakePartition::new(1)
            .main_doc(doc(0, 2))
            .main_doc(doc(0, 5))
            .keyed(doc(0, 2), &[(0, &[0])])
            .keyed(doc(0, 5), &[(0, &[0])])
            .ancestor(1, doc(0, 9), &[(0, &[0]), (1, &[0])]);
        let config = EngineConfig {
            levels: 1,
            nested: true,
            ..Default::default()
        };

        let counts = run(config, partition, &[(doc(0, 0), X), (doc(0, 3), X)]);

        assert_eq!(counts.get(X), 1);
    }

    // Segment 0: nested 0,1 under main 2; nested 3 under main 4
    // Segment 1: nested 0 under main 1
    fn nested_partition(levels: usize) -> FakePartition {
        FakePartition::new(levels)
            .main_doc(doc(0, 2))
            .main_doc(doc(0, 4))
            .main_doc(doc(1, 1))
            .keyed(doc(0, 2), &[(0, &[0])])
            .keyed(doc(0, 4), &[(0, &[1])])
            .keyed(doc(1, 1), &[(0, &[1])])
            .ancestor(1, doc(1, 7), &[(0, &[0]), (1, &[0])])
            .ancestor(1, doc(1, 8), &[(0, &[1]), (1, &[1])])
    }

    fn nested_orders() -> Vec<Vec<(DocAddress, BucketId)>> {
        let ascending = vec![(doc(0, 0), X), (doc(0, 1), X), (doc(0, 3), X), (doc(1, 0), X), (doc(0, 3), Y)];
        let mut descending = ascending.clone();
        descending.reverse();
        let interleaved = vec![(doc(0, 0), X), (doc(0, 3), X), (doc(0, 1), X), (doc(0, 3), Y), (doc(1, 0), X)];
        let segments_swapped = vec![(doc(1, 0), X), (doc(0, 1), X), (doc(0, 3), Y), (doc(0, 0), X), (doc(0, 3), X)];
        vec![ascending, descending, interleaved, segments_swapped]
    }

    #[test]
    fn test_nested_direct_count_is_order_independent() {
        let config = EngineConfig {
            levels: 0,
            nested: true,
            ..Default::default()
        };
        for hits in nested_orders() {
            let counts = run(config.clone(), nested_partition(0), &hits);
            assert_eq!(counts.get(X), 3, "hits {:?}", hits);
            assert_eq!(counts.get(Y), 1, "hits {:?}", hits);
        }
    }

    #[test]
    fn test_nested_direct_forwarding_is_order_independent() {
        let config = EngineConfig {
            levels: 0,
            nested: true,
            mode: Mode::MapToParent,
            forward_hits: true,
            ..Default::default()
        };
        for hits in nested_orders() {
            let mut engine = AncestorAggregator::new(config.clone(), nested_partition(0).sources()).unwrap();
            let mut sink: Vec<(BucketId, DocAddress)> = Vec::new();
            for &(hit, bucket) in &hits {
                engine.collect(hit, bucket, &mut sink).unwrap();
            }
            engine.finish(&mut sink).unwrap();

            sink.sort();
            assert_eq!(
                sink,
                vec![(X, doc(0, 2)), (X, doc(0, 4)), (X, doc(1, 1)), (Y, doc(0, 4))],
                "hits {:?}",
                hits
            );
        }
    }

    #[test]
    fn test_nested_then_join_is_order_independent() {
        // Mains 4 and (1,1) share parent ordinal 1, main 2 has parent ordinal 0
        let config = EngineConfig {
            levels: 1,
            nested: true,
            ..Default::default()
        };
        for hits in nested_orders() {
            let forward = run(config.clone(), nested_partition(1), &hits);
            let backward = run(config.clone(), nested_partition(1).reversed_segments(), &hits);
            assert_eq!(forward, backward, "hits {:?}", hits);
            assert_eq!(forward.get(X), 2, "hits {:?}", hits);
            assert_eq!(forward.get(Y), 1, "hits {:?}", hits);
        }
    }

    #[test]
    fn test_growth_failure_aborts_the_pass() {
        let partition = FakePartition::new(1).keyed(doc(0, 0), &[(0, &[50_000_000])]);
        let config = EngineConfig {
            memory_limit: bytesize::ByteSize::kb(64),
            ..Default::default()
        };
        let mut engine = AncestorAggregator::new(config, partition.sources()).unwrap();

        let err = engine.collect(doc(0, 0), X, &mut NoForwarding).unwrap_err();
        assert!(AggregationError::is_growth(&err));
    }
}
