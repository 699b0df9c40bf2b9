// main_docs.rs - Main-document bitsets for nested hits

use anyhow::Result;
use tantivy::{DocAddress, Searcher};

use super::filters::{compile_term_filter, materialize_matches};
use super::TermFilter;
use crate::bitset::GrowableBitset;
use crate::debug_println;
use crate::host::MainDocumentMembership;

/// Live documents matching the main-document filter, one bitset per segment.
/// Nested documents are indexed directly before their main document.
pub struct MainDocumentSet {
    segments: Vec<GrowableBitset>,
}

impl MainDocumentSet {
    pub fn open(searcher: &Searcher, filter: &TermFilter) -> Result<Self> {
        let weight = compile_term_filter(searcher, filter)?;
        let set = Self {
            segments: materialize_matches(searcher, weight.as_ref())?,
        };
        debug_println!("MAIN_DOCS: {}:{} matched {} documents", filter.field, filter.value, set.cardinality());
        Ok(set)
    }

    pub fn cardinality(&self) -> u64 {
        self.segments.iter().map(GrowableBitset::cardinality).sum()
    }
}

impl MainDocumentMembership for MainDocumentSet {
    fn main_document(&self, doc: DocAddress) -> Option<DocAddress> {
        let bits = self.segments.get(doc.segment_ord as usize)?;
        bits.next_set_bit(doc.doc_id)
            .map(|doc_id| DocAddress::new(doc.segment_ord, doc_id))
    }
}
