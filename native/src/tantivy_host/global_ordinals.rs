// global_ordinals.rs - Partition-wide ordinals for a string fast field
//
// Each segment's str column numbers its terms locally. Join keys must compare
// across segments, so every segment dictionary is merged into one sorted term
// list and local term ordinals are remapped onto it.

use anyhow::{Context, Result};
use tantivy::columnar::StrColumn;
use tantivy::{DocAddress, Searcher};

use crate::debug_println;
use crate::error::growth_error;
use crate::host::Ordinal;

struct SegmentOrdinals {
    column: StrColumn,
    to_global: Vec<Ordinal>,
}

pub struct GlobalOrdinals {
    terms: Vec<Vec<u8>>,
    segments: Vec<Option<SegmentOrdinals>>,
}

impl GlobalOrdinals {
    pub fn build(searcher: &Searcher, column: &str) -> Result<Self> {
        let num_segments = searcher.segment_readers().len();
        let mut columns: Vec<Option<StrColumn>> = Vec::with_capacity(num_segments);
        let mut segment_terms: Vec<Vec<Vec<u8>>> = Vec::with_capacity(num_segments);

        for (segment_ord, reader) in searcher.segment_readers().iter().enumerate() {
            let str_column = reader
                .fast_fields()
                .str(column)
                .with_context(|| format!("Failed to open fast field '{}' in segment {}", column, segment_ord))?;
            let mut local = Vec::new();
            if let Some(str_column) = &str_column {
                local.reserve(str_column.dictionary().num_terms());
                let mut stream = str_column.dictionary().stream()?;
                // Stream order is term-ordinal order
                while stream.advance() {
                    local.push(stream.key().to_vec());
                }
            }
            segment_terms.push(local);
            columns.push(str_column);
        }

        let mut terms: Vec<Vec<u8>> = segment_terms.iter().flatten().cloned().collect();
        terms.sort_unstable();
        terms.dedup();
        if terms.len() > Ordinal::MAX as usize {
            return Err(growth_error(format!(
                "fast field '{}' has {} distinct terms, more than a u32 ordinal can address",
                column,
                terms.len()
            )));
        }

        let segments = columns
            .into_iter()
            .zip(segment_terms)
            .map(|(str_column, local)| {
                str_column.map(|column| SegmentOrdinals {
                    column,
                    to_global: local
                        .iter()
                        .map(|term| terms.binary_search(term).map_or(0, |idx| idx as Ordinal))
                        .collect(),
                })
            })
            .collect();

        debug_println!(
            "GLOBAL_ORDINALS: '{}' -> {} terms across {} segments",
            column,
            terms.len(),
            num_segments
        );

        Ok(Self { terms, segments })
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Term text for a global ordinal.
    pub fn term(&self, ordinal: Ordinal) -> Option<&str> {
        self.terms
            .get(ordinal as usize)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Global ordinal of `term`, if any segment holds it.
    pub fn ordinal_of(&self, term: &str) -> Option<Ordinal> {
        self.terms
            .binary_search_by(|candidate| candidate.as_slice().cmp(term.as_bytes()))
            .ok()
            .map(|idx| idx as Ordinal)
    }

    /// Append the global ordinals of every value `doc` holds in this column.
    pub fn ordinals_for_doc(&self, doc: DocAddress, out: &mut Vec<Ordinal>) {
        let Some(Some(segment)) = self.segments.get(doc.segment_ord as usize) else {
            return;
        };
        for local in segment.column.ords().values_for_doc(doc.doc_id) {
            if let Some(global) = segment.to_global.get(local as usize) {
                out.push(*global);
            }
        }
    }
}
