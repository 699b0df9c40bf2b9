// filters.rs - Term filters selecting ancestor documents per level
//
// Cached materializes each level's live matches into one bitset per segment
// the first time the level is scanned; Scan re-runs the scorer every time.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tantivy::query::{EnableScoring, Query, TermQuery, Weight};
use tantivy::schema::IndexRecordOption;
use tantivy::{DocAddress, DocId, DocSet, Searcher, SegmentReader, Term, TERMINATED};

use super::TermFilter;
use crate::bitset::GrowableBitset;
use crate::config::FilterStrategy;
use crate::debug_println;
use crate::error::configuration_error;
use crate::host::AncestorScan;

/// Compile `field:value` into a non-scoring weight.
pub(crate) fn compile_term_filter(searcher: &Searcher, filter: &TermFilter) -> Result<Box<dyn Weight>> {
    let field = searcher.schema().get_field(&filter.field).map_err(|_| {
        configuration_error(format!("filter field '{}' does not exist in the schema", filter.field))
    })?;
    let query = TermQuery::new(
        Term::from_field_text(field, &filter.value),
        IndexRecordOption::Basic,
    );
    Ok(query.weight(EnableScoring::disabled_from_searcher(searcher))?)
}

/// Call `f` for every live document of `reader` matched by `weight`, ascending.
pub(crate) fn for_each_live_match(
    weight: &dyn Weight,
    reader: &SegmentReader,
    mut f: impl FnMut(DocId) -> Result<()>,
) -> Result<()> {
    let mut scorer = weight.scorer(reader, 1.0)?;
    let alive = reader.alive_bitset();
    let mut doc = scorer.doc();
    while doc != TERMINATED {
        if alive.map_or(true, |bits| bits.is_alive(doc)) {
            f(doc)?;
        }
        doc = scorer.advance();
    }
    Ok(())
}

/// Live matches of `weight`, one bitset per segment.
pub(crate) fn materialize_matches(searcher: &Searcher, weight: &dyn Weight) -> Result<Vec<GrowableBitset>> {
    let mut segments = Vec::with_capacity(searcher.segment_readers().len());
    for reader in searcher.segment_readers() {
        let mut bits = GrowableBitset::new();
        for_each_live_match(weight, reader, |doc| {
            bits.set(doc);
            Ok(())
        })?;
        segments.push(bits);
    }
    Ok(segments)
}

struct LevelFilter {
    filter: TermFilter,
    weight: Box<dyn Weight>,
    cached: OnceCell<Vec<GrowableBitset>>,
}

pub struct QueryAncestorScan {
    searcher: Searcher,
    strategy: FilterStrategy,
    /// Index 0 holds the level-1 filter
    levels: Vec<LevelFilter>,
}

impl QueryAncestorScan {
    pub fn open(searcher: &Searcher, filters: &[TermFilter], strategy: FilterStrategy) -> Result<Self> {
        let levels = filters
            .iter()
            .map(|filter| {
                Ok(LevelFilter {
                    filter: filter.clone(),
                    weight: compile_term_filter(searcher, filter)?,
                    cached: OnceCell::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            searcher: searcher.clone(),
            strategy,
            levels,
        })
    }

    fn level(&self, level: usize) -> Result<&LevelFilter> {
        level
            .checked_sub(1)
            .and_then(|idx| self.levels.get(idx))
            .ok_or_else(|| configuration_error(format!("no ancestor filter configured for level {}", level)))
    }
}

impl AncestorScan for QueryAncestorScan {
    fn ensure_level(&self, level: usize) -> Result<()> {
        self.level(level).map(|_| ())
    }

    fn scan(&self, level: usize, visit: &mut dyn FnMut(DocAddress) -> Result<()>) -> Result<()> {
        let filter = self.level(level)?;
        match self.strategy {
            FilterStrategy::Cached => {
                let segments = filter.cached.get_or_try_init(|| {
                    debug_println!(
                        "FILTERS: caching level {} matches for {}:{}",
                        level,
                        filter.filter.field,
                        filter.filter.value
                    );
                    materialize_matches(&self.searcher, filter.weight.as_ref())
                })?;
                for (segment_ord, bits) in segments.iter().enumerate() {
                    for doc_id in bits {
                        visit(DocAddress::new(segment_ord as u32, doc_id))?;
                    }
                }
            }
            FilterStrategy::Scan => {
                for (segment_ord, reader) in self.searcher.segment_readers().iter().enumerate() {
                    for_each_live_match(filter.weight.as_ref(), reader, |doc_id| {
                        visit(DocAddress::new(segment_ord as u32, doc_id))
                    })?;
                }
            }
        }
        Ok(())
    }
}
