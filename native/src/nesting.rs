// nesting.rs - Level-0 stage for nested hits
//
// A nested hit belongs to the first main document at or after it in the same
// segment (children are indexed before their parent). Several children of one
// main document hitting the same bucket count once.

use std::sync::Arc;

use anyhow::Result;
use tantivy::DocAddress;

use crate::dedup::SeenDocuments;
use crate::host::{BucketId, MainDocumentMembership};
use crate::result::AncestorCounts;

pub struct ReverseNestingStage {
    membership: Arc<dyn MainDocumentMembership>,
}

impl ReverseNestingStage {
    pub fn new(membership: Arc<dyn MainDocumentMembership>) -> Self {
        Self { membership }
    }

    /// Main document enclosing `hit`, or None for an orphaned nested hit.
    pub fn resolve(&self, hit: DocAddress) -> Option<DocAddress> {
        self.membership.main_document(hit)
    }
}

/// Nested fast path: distinct main documents per bucket, with no level tables.
#[derive(Debug, Clone)]
pub struct DirectCounts {
    mains: SeenDocuments,
}

impl DirectCounts {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            mains: SeenDocuments::new(memory_limit),
        }
    }

    /// Count `main` for `bucket`. Returns true the first time the pair is counted.
    pub fn count(&mut self, bucket: BucketId, main: DocAddress) -> Result<bool> {
        self.mains.insert(bucket, main)
    }

    pub fn is_empty(&self) -> bool {
        self.mains.is_empty()
    }

    pub fn get(&self, bucket: BucketId) -> u64 {
        self.mains.count(bucket)
    }

    /// Fold a sibling's main documents into these. A pair counted by both sides counts once.
    pub fn merge(&mut self, other: &DirectCounts) -> Result<()> {
        self.mains.merge(&other.mains)
    }

    pub fn into_counts(self) -> AncestorCounts {
        self.mains.counts().into_iter().collect()
    }
}
