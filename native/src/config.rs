// config.rs - Construction-time configuration for the aggregation engine

use anyhow::{Context, Result};
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::error::configuration_error;

/// Upper bound on the number of ancestor hops a single aggregation may walk.
pub const MAX_LEVELS: usize = 32;

/// What the engine forwards downstream while it counts distinct ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Forward the collected child hits themselves
    #[default]
    Undup,
    /// Forward each distinct ancestor document reached at the final level
    MapToParent,
}

/// How an ancestor filter's matching documents are obtained during a level scan.
/// Performance knob only; results are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    /// Materialize each segment's matches into a bitset once and reuse it
    #[default]
    Cached,
    /// Iterate the filter's scorer live on every scan
    Scan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Number of join hops walked after level 0 (L). Zero is only valid for nested hits.
    pub levels: usize,
    pub mode: Mode,
    /// Level-0 hits are nested documents that must first be mapped to their main document
    pub nested: bool,
    /// Degrade to an empty result instead of failing when a relation is missing
    pub resilient: bool,
    pub filter_strategy: FilterStrategy,
    /// Forward hits (child hits or ancestors, per `mode`) to the downstream sink
    pub forward_hits: bool,
    /// Upper bound for the heap held by a single level table (default: 500MB)
    pub memory_limit: ByteSize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            levels: 1,
            mode: Mode::Undup,
            nested: false,
            resilient: false,
            filter_strategy: FilterStrategy::Cached,
            forward_hits: false,
            memory_limit: ByteSize::mb(500),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).context("Failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels == 0 && !self.nested {
            return Err(configuration_error(
                "at least one ancestor level is required for join aggregation",
            ));
        }
        if self.levels > MAX_LEVELS {
            return Err(configuration_error(format!(
                "{} levels requested, at most {} are supported",
                self.levels, MAX_LEVELS
            )));
        }
        if self.memory_limit.as_u64() == 0 {
            return Err(configuration_error("memory limit must be greater than zero"));
        }
        Ok(())
    }

    /// True when level-0 hits are counted directly per main document, with no tables.
    pub fn is_direct_count(&self) -> bool {
        self.nested && self.levels == 0
    }

    pub fn memory_limit_bytes(&self) -> usize {
        usize::try_from(self.memory_limit.as_u64()).unwrap_or(usize::MAX)
    }
}
