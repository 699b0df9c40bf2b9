// tantivy_host/mod.rs - Partition sources backed by a tantivy Searcher
//
// A join chain names, per level, the string fast field holding the join key
// and the term filter selecting that level's ancestor documents. Level 0 keys
// are read from the hits; level k (k >= 1) keys from level-k ancestors, which
// also carry the level k-1 key they are identified by.

mod buckets;
mod collector;
mod filters;
mod global_ordinals;
mod main_docs;
mod resolver;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tantivy::Searcher;

use crate::config::EngineConfig;
use crate::debug_println;
use crate::engine::PartitionSources;
use crate::error::configuration_error;
use crate::host::MainDocumentMembership;

pub use buckets::{BucketAssigner, SegmentBuckets, SingleBucket, TermsBucketAssigner, TermsSegmentBuckets};
pub use collector::{AncestorReport, DistinctAncestorCollector, DistinctAncestorSegmentCollector, SegmentFruit};
pub use filters::QueryAncestorScan;
pub use global_ordinals::GlobalOrdinals;
pub use main_docs::MainDocumentSet;
pub use resolver::FastFieldOrdinals;

/// Documents whose `field` holds the exact term `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermFilter {
    pub field: String,
    pub value: String,
}

impl TermFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChainConfig {
    /// Join-key column for levels 0..=L
    pub key_columns: Vec<String>,
    /// Ancestor filter for levels 1..=L
    #[serde(default)]
    pub ancestor_filters: Vec<TermFilter>,
    /// Selects main documents when hits are nested documents
    #[serde(default)]
    pub main_document_filter: Option<TermFilter>,
}

impl JoinChainConfig {
    pub fn new<S: Into<String>>(key_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_ancestor_filter(mut self, field: &str, value: &str) -> Self {
        self.ancestor_filters.push(TermFilter::new(field, value));
        self
    }

    pub fn with_main_document_filter(mut self, field: &str, value: &str) -> Self {
        self.main_document_filter = Some(TermFilter::new(field, value));
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse join chain config")
    }
}

/// Open the sources `config` needs over `searcher`.
///
/// Missing fields, key columns or filters surface as configuration errors so
/// that resilient aggregations can degrade to empty results.
pub fn open_partition(searcher: &Searcher, chain: &JoinChainConfig, config: &EngineConfig) -> Result<PartitionSources> {
    let key_columns: &[String] = if config.is_direct_count() {
        &[]
    } else {
        chain.key_columns.get(..=config.levels).ok_or_else(|| {
            configuration_error(format!(
                "{} levels need {} key columns, join chain has {}",
                config.levels,
                config.levels + 1,
                chain.key_columns.len()
            ))
        })?
    };
    let filters = &chain.ancestor_filters[..config.levels.min(chain.ancestor_filters.len())];

    let resolver = FastFieldOrdinals::open(searcher, key_columns)?;
    let ancestors = QueryAncestorScan::open(searcher, filters, config.filter_strategy)?;
    let main_documents = match (&chain.main_document_filter, config.nested) {
        (Some(filter), true) => {
            Some(Arc::new(MainDocumentSet::open(searcher, filter)?) as Arc<dyn MainDocumentMembership>)
        }
        _ => None,
    };

    debug_println!(
        "TANTIVY_HOST: opened partition over {} segments, {} key columns, {} ancestor filters, nested={}",
        searcher.segment_readers().len(),
        key_columns.len(),
        filters.len(),
        main_documents.is_some()
    );

    Ok(PartitionSources {
        resolver: Arc::new(resolver),
        ancestors: Arc::new(ancestors),
        main_documents,
    })
}
