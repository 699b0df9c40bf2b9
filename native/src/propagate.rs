// propagate.rs - Walk level tables up the ancestor chain after collection
//
// Level 0 arrives bucket-keyed from the collection phase. It is inverted once
// to ordinal -> buckets; every later level is built directly in that
// orientation by OR-ing bucket sets, and the final level is inverted back to
// bucket -> ordinals for materialization. At most two tables are live at a time.

use anyhow::Result;
use tantivy::DocAddress;

use crate::bucket_table::BucketBitsetTable;
use crate::config::{EngineConfig, Mode};
use crate::debug::PhaseTimer;
use crate::debug_println;
use crate::dedup::LastSeenDocument;
use crate::host::{AncestorScan, ForwardSink, Ordinal, OrdinalResolver};
use crate::invert::invert;
use crate::metrics;

// Debug logging macro
macro_rules! debug_log {
    ($($arg:tt)*) => {
        debug_println!("PROPAGATE: {}", format!($($arg)*))
    };
}

enum LevelTable {
    ByBucket(BucketBitsetTable),
    ByOrdinal(BucketBitsetTable),
}

impl LevelTable {
    fn into_ordinal_keyed(self) -> Result<BucketBitsetTable> {
        match self {
            LevelTable::ByBucket(table) => invert(&table),
            LevelTable::ByOrdinal(table) => Ok(table),
        }
    }

    fn into_bucket_keyed(self) -> Result<BucketBitsetTable> {
        match self {
            LevelTable::ByBucket(table) => Ok(table),
            LevelTable::ByOrdinal(table) => invert(&table),
        }
    }
}

pub struct LevelPropagator<'a> {
    resolver: &'a dyn OrdinalResolver,
    ancestors: &'a dyn AncestorScan,
    levels: usize,
    forward_ancestors: bool,
}

impl<'a> LevelPropagator<'a> {
    pub fn new(
        config: &EngineConfig,
        resolver: &'a dyn OrdinalResolver,
        ancestors: &'a dyn AncestorScan,
    ) -> Self {
        Self {
            resolver,
            ancestors,
            levels: config.levels,
            forward_ancestors: config.forward_hits && config.mode == Mode::MapToParent,
        }
    }

    /// Advance `level_zero` (bucket -> level-0 ordinals) through every level and
    /// return the final table, bucket -> level-L ordinals.
    pub fn run(&self, level_zero: BucketBitsetTable, sink: &mut dyn ForwardSink) -> Result<BucketBitsetTable> {
        let _timer = PhaseTimer::start("level propagation");
        let memory_limit = level_zero.memory_limit();
        let mut current = LevelTable::ByBucket(level_zero);

        for level in 0..self.levels {
            let terminal = level + 1 == self.levels;
            // The previous level's table is dropped here once inverted
            let inverted = current.into_ordinal_keyed()?;
            if inverted.is_empty() {
                debug_log!("level {} has no reachable ordinals, stopping early", level);
                return Ok(BucketBitsetTable::new(memory_limit));
            }
            current = LevelTable::ByOrdinal(self.advance(level, &inverted, terminal, sink)?);
        }

        current.into_bucket_keyed()
    }

    /// One transition: `inverted` maps level-`level` ordinals to buckets; the
    /// result maps level-(`level`+1) ordinals to buckets.
    fn advance(
        &self,
        level: usize,
        inverted: &BucketBitsetTable,
        terminal: bool,
        sink: &mut dyn ForwardSink,
    ) -> Result<BucketBitsetTable> {
        let forwarding = terminal && self.forward_ancestors;
        let mut next = BucketBitsetTable::new(inverted.memory_limit());
        let mut child_keys: Vec<Ordinal> = Vec::new();
        let mut ancestor_keys: Vec<Ordinal> = Vec::new();
        let mut last_doc = LastSeenDocument::new();
        let mut forwarded = LastSeenDocument::new();
        let mut scanned = 0u64;
        let mut linked = 0u64;
        let mut forwarded_count = 0u64;

        self.ancestors.scan(level + 1, &mut |doc: DocAddress| -> Result<()> {
            if !last_doc.first_visit(doc) {
                return Ok(());
            }
            scanned += 1;

            self.resolver.ordinals(level, doc, &mut child_keys)?;
            if child_keys.is_empty() {
                return Ok(());
            }
            self.resolver.ordinals(level + 1, doc, &mut ancestor_keys)?;
            if ancestor_keys.is_empty() {
                return Ok(());
            }
            dedup_keys(&mut child_keys);
            dedup_keys(&mut ancestor_keys);

            for &child in &child_keys {
                let Some(buckets) = inverted.get(child) else {
                    continue;
                };
                linked += 1;
                for &ancestor in &ancestor_keys {
                    if forwarding {
                        for bucket in buckets.iter() {
                            if next.set(ancestor, bucket)? && forwarded.first_sighting(doc, bucket) {
                                sink.forward(bucket, doc)?;
                                forwarded_count += 1;
                            }
                        }
                    } else {
                        next.union_into(ancestor, buckets)?;
                    }
                }
            }
            Ok(())
        })?;

        debug_log!(
            "level {} -> {}: scanned {} ancestor docs, {} linked, {} ordinals reached, {} forwarded",
            level,
            level + 1,
            scanned,
            linked,
            next.len(),
            forwarded_count
        );
        metrics::record_level_propagated(scanned);
        metrics::record_hits_forwarded(forwarded_count);
        Ok(next)
    }
}

fn dedup_keys(keys: &mut Vec<Ordinal>) {
    if keys.len() > 1 {
        keys.sort_unstable();
        keys.dedup();
    }
}
