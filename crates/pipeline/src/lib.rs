//! Cross-partition query and change-feed pipeline.
//!
//! A logical query or change-feed read against a partitioned container fans out
//! to one single-partition read per partition key range. This crate contains the
//! state machine that coordinates those reads and merges their results into one
//! resumable stream, together with the value types it exchanges with callers.
//!
//! ## Architectural Layer
//!
//! **Business logic only.** This crate performs no I/O. A pipeline says *which*
//! partition to read next and from *where*; a transport supplied by the caller
//! (see the `driver` crate) performs the reads and feeds the bytes back.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers and opaque tokens (`PartitionKeyRangeId`, `ContinuationToken`, etc.) |
//! | [`types`] | Shared value types (`FeedRange`, `DataRequest`, `PipelineResult`, `Timestamp`) |
//! | [`errors`] | `PipelineError` and its retry policy |
//! | [`feed_range`] | Exact matching of feed ranges to partition key ranges |
//! | [`payload`] | Splitting a partition's response body into items |
//! | [`pipeline`] | The `QueryPipeline` trait and `PartitionedPipeline` |
//! | [`continuation`] | Composite continuation tokens for resuming a pipeline |
//! | [`plan`] | Gateway query plans and the features they require |
//! | [`engine`] | `QueryEngine` trait and the parallel engine |
//! | [`options`] | Query and change-feed options and their request headers |

pub mod continuation;
mod cursor;
pub mod engine;
pub mod errors;
pub mod feed_range;
pub mod identifiers;
pub mod options;
pub mod payload;
pub mod pipeline;
pub mod plan;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use continuation::{CompositeContinuationToken, RangeContinuation, COMPOSITE_TOKEN_VERSION};
pub use engine::{ParallelQueryEngine, QueryEngine, SupportedFeatures};
pub use errors::{PipelineError, Result, RetryPolicy};
pub use feed_range::{feed_ranges, match_feed_range};
pub use identifiers::{
    ContinuationToken, CorrelatedActivityId, ETag, PartitionKeyRangeId, ResourceId, SessionToken,
};
pub use options::{merge_headers, ChangeFeedOptions, ConsistencyLevel, Headers, QueryOptions};
pub use payload::split_items;
pub use pipeline::{PartitionedPipeline, QueryPipeline};
pub use plan::{QueryFeature, QueryPlan};
pub use types::{DataRequest, FeedRange, PartitionKeyRangeProperties, PipelineResult, Timestamp};
