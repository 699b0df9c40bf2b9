// error.rs - Failure taxonomy for distinct-ancestor aggregation
//
// Missing ordinals are not errors: documents without a join key at some level
// are skipped where they are resolved.

/// Typed failures carried inside `anyhow::Error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// A relation, field or setting required at construction time is missing or invalid
    Configuration(String),
    /// Bitset or table growth exceeded the configured memory limit or ordinal domain
    Growth(String),
}

impl std::fmt::Display for AggregationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AggregationError::Growth(e) => write!(f, "Growth failure: {}", e),
        }
    }
}

impl std::error::Error for AggregationError {}

impl AggregationError {
    /// True when `error` (or anything in its context chain) is a configuration error.
    pub fn is_configuration(error: &anyhow::Error) -> bool {
        error.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<AggregationError>(),
                Some(AggregationError::Configuration(_))
            )
        })
    }

    pub fn is_growth(error: &anyhow::Error) -> bool {
        error.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<AggregationError>(),
                Some(AggregationError::Growth(_))
            )
        })
    }
}

pub fn configuration_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(AggregationError::Configuration(message.into()))
}

pub fn growth_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(AggregationError::Growth(message.into()))
}
