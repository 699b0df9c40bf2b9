// host.rs - Collaborators the engine consumes from the storage/search layer
//
// A partition is one index snapshot; documents are addressed by segment
// ordinal + segment-local doc id and ordinals are dense across the whole
// partition. tantivy_host/ implements these traits over a tantivy Searcher.

use anyhow::Result;
use tantivy::DocAddress;

/// Aggregation bucket, assigned by the surrounding framework.
pub type BucketId = u32;

/// Dense partition-wide id of a join-key value at one level.
pub type Ordinal = u32;

/// Maps a document to the ordinal(s) of the join key it carries at a level.
pub trait OrdinalResolver: Send + Sync {
    /// Replace the contents of `out` with the ordinals `doc` carries at `level`.
    /// Leaves `out` empty when the document has no key at that level.
    fn ordinals(&self, level: usize, doc: DocAddress, out: &mut Vec<Ordinal>) -> Result<()>;
}

/// Enumerates the documents that are ancestors at a given level (1..=L).
pub trait AncestorScan: Send + Sync {
    /// Fails with a configuration error when no filter exists for `level`.
    fn ensure_level(&self, level: usize) -> Result<()>;

    /// Visit every matching document, segment by segment, ascending doc ids within a segment.
    fn scan(&self, level: usize, visit: &mut dyn FnMut(DocAddress) -> Result<()>) -> Result<()>;
}

/// Nested-document support: the main document enclosing a nested hit.
pub trait MainDocumentMembership: Send + Sync {
    /// Nearest main document at or after `doc` within the same segment.
    fn main_document(&self, doc: DocAddress) -> Option<DocAddress>;
}

/// Downstream consumer of (bucket, document) pairs, owned by the caller.
pub trait ForwardSink {
    fn forward(&mut self, bucket: BucketId, doc: DocAddress) -> Result<()>;
}

/// Sink for callers that only want counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoForwarding;

impl ForwardSink for NoForwarding {
    fn forward(&mut self, _bucket: BucketId, _doc: DocAddress) -> Result<()> {
        Ok(())
    }
}

impl ForwardSink for Vec<(BucketId, DocAddress)> {
    fn forward(&mut self, bucket: BucketId, doc: DocAddress) -> Result<()> {
        self.push((bucket, doc));
        Ok(())
    }
}
