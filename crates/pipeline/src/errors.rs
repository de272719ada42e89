//! Error and retry-policy types for the feed pipeline.
//!
//! [`PipelineError`] covers every failure the core can report. None of them is
//! retried inside the core; the core has no retry policy of its own. Transient
//! network or service failures belong to the transport collaborator and never
//! reach the pipeline as anything other than "no data yet".
//!
//! [`RetryPolicy`] tells a caller whether repeating the operation (after doing
//! whatever the error asks for, such as re-resolving partitions) can succeed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable` errors: a feed range that no longer matches the partition map
///   (the caller refreshes the map first), transport timeouts and throttling.
/// - `NonRetryable` errors: programmer errors (unknown partition, use after
///   close), unparseable plans, payloads or continuation tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

/// Errors produced by the feed-range matcher, the pipeline, and query engines.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// No partition key range has exactly the queried bounds.
    ///
    /// Expected after a split or merge: the caller must refresh its partition
    /// map and retry.
    #[error("No partition key range matches feed range [{min_inclusive}, {max_exclusive})")]
    NotFound {
        /// Lower (inclusive) bound of the queried range.
        min_inclusive: String,
        /// Upper (exclusive) bound of the queried range.
        max_exclusive: String,
    },

    /// `provide_data` named a partition that was never registered with the pipeline.
    #[error("Unknown partition key range '{partition_id}'")]
    UnknownPartition {
        /// The partition id that was supplied.
        partition_id: String,
    },

    /// The engine could not parse the query plan, or the plan needs a feature
    /// the engine does not implement.
    #[error("Invalid query plan: {message}")]
    InvalidPlan {
        /// Description of the problem.
        message: String,
    },

    /// The pipeline was used after `close()`.
    #[error("Pipeline is closed")]
    Closed,

    /// A pipeline was requested over an empty set of partition key ranges.
    #[error("A pipeline requires at least one partition key range")]
    NoPartitionRanges,

    /// The raw batch supplied for a partition was not a recognised JSON shape.
    #[error("Malformed payload for partition '{partition_id}': {message}")]
    MalformedPayload {
        /// Partition the payload was supplied for.
        partition_id: String,
        /// Parser diagnostic.
        message: String,
    },

    /// A composite continuation token could not be parsed.
    #[error("Invalid continuation token: {message}")]
    InvalidContinuation {
        /// Parser diagnostic.
        message: String,
    },

    /// Feed range bounds do not satisfy `min_inclusive < max_exclusive`.
    #[error("Invalid feed range [{min_inclusive}, {max_exclusive})")]
    InvalidFeedRange {
        /// Supplied lower bound.
        min_inclusive: String,
        /// Supplied upper bound.
        max_exclusive: String,
    },
}

impl PipelineError {
    /// Returns the retry policy for this error.
    ///
    /// Only [`PipelineError::NotFound`] is retryable, and only after the
    /// caller has re-resolved the partition map.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            PipelineError::NotFound { .. } => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

/// Result alias used throughout the pipeline crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_found_is_retryable() {
        let not_found = PipelineError::NotFound {
            min_inclusive: "00".into(),
            max_exclusive: "FF".into(),
        };
        assert!(not_found.retry_policy().is_retryable());
        assert_eq!(PipelineError::Closed.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(
            PipelineError::UnknownPartition {
                partition_id: "9".into()
            }
            .retry_policy(),
            RetryPolicy::NonRetryable
        );
    }

    #[test]
    fn not_found_names_the_bounds() {
        let err = PipelineError::NotFound {
            min_inclusive: "10".into(),
            max_exclusive: "FF".into(),
        };
        assert_eq!(
            err.to_string(),
            "No partition key range matches feed range [10, FF)"
        );
    }
}
