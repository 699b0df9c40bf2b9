/*
 * Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

//! Distinct-ancestor counting over tantivy join and nested document hierarchies.
//!
//! Hits are collected per bucket, resolved to level-0 join keys, then walked
//! up a chain of ancestor levels; each bucket ends with the number of distinct
//! level-L ancestors its hits reach. `tantivy_host` runs the engine as a
//! tantivy `Collector`; `AncestorAggregator` drives it over any `host` sources.

pub mod debug;
pub mod error;
pub mod config;
pub mod metrics;

pub mod bitset;
pub mod bucket_table;
pub mod invert;

pub mod host;
mod dedup;
pub mod nesting;
pub mod collect;
pub mod propagate;
pub mod result;
pub mod engine;

pub mod tantivy_host;

#[cfg(test)]
mod test_support;

pub use bitset::GrowableBitset;
pub use bucket_table::BucketBitsetTable;
pub use config::{EngineConfig, FilterStrategy, Mode, MAX_LEVELS};
pub use engine::{AncestorAggregator, PartitionSources};
pub use error::AggregationError;
pub use host::{
    AncestorScan, BucketId, ForwardSink, MainDocumentMembership, NoForwarding, Ordinal, OrdinalResolver,
};
pub use metrics::{get_aggregation_metrics, reset_aggregation_metrics, AggregationMetrics};
pub use result::AncestorCounts;
pub use tantivy_host::{
    open_partition, AncestorReport, DistinctAncestorCollector, JoinChainConfig, SingleBucket, TermFilter,
    TermsBucketAssigner,
};
