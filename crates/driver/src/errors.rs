//! Driver errors.

use pipeline::{PipelineError, RetryPolicy};
use thiserror::Error;

/// A transport failure reported by a [`crate::DataSource`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fetch from partition {partition_id} failed: {message}")]
pub struct SourceError {
    pub partition_id: String,
    pub message: String,
    /// The source's own judgement of whether the fetch can be repeated.
    pub retry: RetryPolicy,
}

impl SourceError {
    /// A failure that may succeed if the fetch is repeated.
    pub fn retryable(partition_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            partition_id: partition_id.into(),
            message: message.into(),
            retry: RetryPolicy::Retryable { after: None },
        }
    }

    /// A failure that will not go away on its own.
    pub fn fatal(partition_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            partition_id: partition_id.into(),
            message: message.into(),
            retry: RetryPolicy::NonRetryable,
        }
    }
}

/// Errors returned by [`crate::PipelineDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// A fetch task panicked or was cancelled. The request is fetched again
    /// by the next call.
    #[error("fetch task failed: {message}")]
    Task { message: String },

    /// The pipeline is waiting on requests this driver never received, so no
    /// turn can make progress.
    #[error("pipeline is waiting on requests held by another caller")]
    Stalled,
}

impl DriverError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            DriverError::Pipeline(e) => e.retry_policy(),
            DriverError::Source(e) => e.retry.clone(),
            DriverError::Task { .. } => RetryPolicy::Retryable { after: None },
            DriverError::Stalled => RetryPolicy::NonRetryable,
        }
    }
}
