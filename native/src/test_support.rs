// test_support.rs - In-memory partition used by unit tests

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use tantivy::DocAddress;

use crate::engine::PartitionSources;
use crate::error::configuration_error;
use crate::host::{AncestorScan, MainDocumentMembership, Ordinal, OrdinalResolver};

pub(crate) fn doc(segment_ord: u32, doc_id: u32) -> DocAddress {
    DocAddress::new(segment_ord, doc_id)
}

#[derive(Debug, Default, Clone)]
struct FakeDoc {
    ancestor_level: Option<usize>,
    keys: HashMap<usize, Vec<Ordinal>>,
}

/// Documents keyed by (segment, doc id) with per-level ordinals.
#[derive(Debug, Default, Clone)]
pub(crate) struct FakePartition {
    declared_levels: usize,
    docs: BTreeMap<(u32, u32), FakeDoc>,
    main_docs: BTreeSet<(u32, u32)>,
    reverse_segments: bool,
}

impl FakePartition {
    /// Partition with ancestor filters declared for levels 1..=declared_levels.
    pub(crate) fn new(declared_levels: usize) -> Self {
        Self {
            declared_levels,
            ..Default::default()
        }
    }

    /// A document carrying `keys` as (level, ordinals) pairs.
    pub(crate) fn keyed(mut self, address: DocAddress, keys: &[(usize, &[Ordinal])]) -> Self {
        let entry = self
            .docs
            .entry((address.segment_ord, address.doc_id))
            .or_default();
        for (level, ordinals) in keys {
            entry.keys.insert(*level, ordinals.to_vec());
        }
        self
    }

    /// An ancestor document at `level` carrying `keys`.
    pub(crate) fn ancestor(mut self, level: usize, address: DocAddress, keys: &[(usize, &[Ordinal])]) -> Self {
        self = self.keyed(address, keys);
        if let Some(entry) = self.docs.get_mut(&(address.segment_ord, address.doc_id)) {
            entry.ancestor_level = Some(level);
        }
        self
    }

    pub(crate) fn main_doc(mut self, address: DocAddress) -> Self {
        self.main_docs.insert((address.segment_ord, address.doc_id));
        self
    }

    /// Scan segments from last to first.
    pub(crate) fn reversed_segments(mut self) -> Self {
        self.reverse_segments = true;
        self
    }

    pub(crate) fn sources(self) -> PartitionSources {
        let shared = Arc::new(self);
        let main_documents: Option<Arc<dyn MainDocumentMembership>> = if shared.main_docs.is_empty() {
            None
        } else {
            Some(shared.clone() as Arc<dyn MainDocumentMembership>)
        };
        PartitionSources {
            resolver: shared.clone(),
            ancestors: shared,
            main_documents,
        }
    }
}

impl OrdinalResolver for FakePartition {
    fn ordinals(&self, level: usize, doc: DocAddress, out: &mut Vec<Ordinal>) -> Result<()> {
        out.clear();
        if let Some(entry) = self.docs.get(&(doc.segment_ord, doc.doc_id)) {
            if let Some(ordinals) = entry.keys.get(&level) {
                out.extend_from_slice(ordinals);
            }
        }
        Ok(())
    }
}

impl AncestorScan for FakePartition {
    fn ensure_level(&self, level: usize) -> Result<()> {
        if level == 0 || level > self.declared_levels {
            return Err(configuration_error(format!("no ancestor relation declared for level {}", level)));
        }
        Ok(())
    }

    fn scan(&self, level: usize, visit: &mut dyn FnMut(DocAddress) -> Result<()>) -> Result<()> {
        self.ensure_level(level)?;
        let mut segments: Vec<u32> = self.docs.keys().map(|(seg, _)| *seg).collect();
        segments.dedup();
        if self.reverse_segments {
            segments.reverse();
        }
        for segment in segments {
            for ((seg, doc_id), entry) in self.docs.range((segment, 0)..=(segment, u32::MAX)) {
                if entry.ancestor_level == Some(level) {
                    visit(DocAddress::new(*seg, *doc_id))?;
                }
            }
        }
        Ok(())
    }
}

impl MainDocumentMembership for FakePartition {
    fn main_document(&self, doc: DocAddress) -> Option<DocAddress> {
        self.main_docs
            .range((doc.segment_ord, doc.doc_id)..=(doc.segment_ord, u32::MAX))
            .next()
            .map(|(seg, doc_id)| DocAddress::new(*seg, *doc_id))
    }
}
