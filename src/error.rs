//! Per-record failure taxonomy for the pipeline.
//!
//! None of these are returned to callers of the batch operations: each one
//! is logged and degrades to a documented default. They exist as values so
//! the degradation sites are explicit and testable.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// A raw item could not be normalized; the item is skipped.
    #[error("cannot map item: {0}")]
    Mapping(String),

    /// Sentiment scoring failed; the record degrades to neutral / 0.
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// A merge source could not be read; the merge proceeds without it.
    #[error("source '{source_name}' unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    /// A timestamp could not be parsed; the record is excluded from time views.
    #[error("malformed timestamp: '{0}'")]
    MalformedTimestamp(String),

    /// A caller asked for a field the record schema does not have.
    #[error("unknown field: '{0}'")]
    UnknownField(String),
}
