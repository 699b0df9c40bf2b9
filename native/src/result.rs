// result.rs - Per-partition counts and their cross-partition reduction
//
// Reduction is plain addition. It is only exact when every ancestor entity's
// documents live in a single partition; the engine does not check that.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bucket_table::BucketBitsetTable;
use crate::host::BucketId;

/// Distinct-ancestor count per bucket. Buckets without an entry count zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestorCounts {
    counts: BTreeMap<BucketId, u64>,
}

impl AncestorCounts {
    /// The result of a pass with no hits; identity of `merge`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, bucket: BucketId) -> u64 {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BucketId, u64)> + '_ {
        self.counts.iter().map(|(bucket, count)| (*bucket, *count))
    }

    /// Add another partition's counts into these.
    pub fn merge(&mut self, other: &AncestorCounts) {
        for (bucket, count) in other.iter() {
            *self.counts.entry(bucket).or_insert(0) += count;
        }
    }

    pub fn reduce<'a>(partials: impl IntoIterator<Item = &'a AncestorCounts>) -> AncestorCounts {
        let mut total = AncestorCounts::empty();
        for partial in partials {
            total.merge(partial);
        }
        total
    }

    /// Re-key buckets for presentation, e.g. bucket id -> term.
    /// Buckets mapping to the same key are summed.
    pub fn keyed<K: Ord>(&self, mut key_of: impl FnMut(BucketId) -> K) -> BTreeMap<K, u64> {
        let mut keyed = BTreeMap::new();
        for (bucket, count) in self.iter() {
            *keyed.entry(key_of(bucket)).or_insert(0) += count;
        }
        keyed
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize ancestor counts")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse ancestor counts")
    }
}

impl FromIterator<(BucketId, u64)> for AncestorCounts {
    fn from_iter<I: IntoIterator<Item = (BucketId, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// Per-bucket cardinality of the final bucket-keyed level table.
pub fn materialize(table: &BucketBitsetTable) -> AncestorCounts {
    table
        .iter()
        .map(|(bucket, ordinals)| (bucket, ordinals.cardinality()))
        .filter(|(_, count)| *count > 0)
        .collect()
}
