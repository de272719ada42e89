//! Query engines: the pluggable strategy that turns a query, its plan, and a
//! partition map into a [`QueryPipeline`].
//!
//! Calling code asks an engine for its [`supported_features`](QueryEngine::supported_features)
//! when requesting a plan from the gateway, so the gateway can refuse queries
//! the engine cannot merge correctly. Not configuring an engine at all is valid;
//! callers then fall back to single-partition-at-a-time reads, which are outside
//! this crate.

use std::borrow::Cow;

use crate::continuation::CompositeContinuationToken;
use crate::pipeline::{PartitionedPipeline, QueryPipeline};
use crate::plan::{QueryFeature, QueryPlan};
use crate::{PartitionKeyRangeProperties, PipelineError};

/// Features advertised by an engine, as a slice and as the comma-separated
/// string the gateway expects.
#[derive(Debug, Clone, Copy)]
pub struct SupportedFeatures {
    features: &'static [QueryFeature],
    joined: &'static str,
}

impl SupportedFeatures {
    /// The features as a slice.
    pub const fn as_slice(&self) -> &'static [QueryFeature] {
        self.features
    }

    /// The features as a comma-separated list.
    pub const fn as_str(&self) -> &'static str {
        self.joined
    }

    /// Returns `true` if `feature` is advertised.
    pub fn contains(&self, feature: QueryFeature) -> bool {
        self.features.contains(&feature)
    }
}

macro_rules! supported_features {
    (@join) => { "" };
    (@join $first:ident $(, $rest:ident)*) => {
        concat!(stringify!($first) $(, ",", stringify!($rest))*)
    };
    ($name:ident: $($feature:ident),* $(,)?) => {
        const $name: SupportedFeatures = SupportedFeatures {
            features: &[$(QueryFeature::$feature),*],
            joined: supported_features!(@join $($feature),*),
        };
    };
}

/// Builds pipelines for queries. Implementations must be shareable across threads.
pub trait QueryEngine: Send + Sync {
    /// Creates a pipeline over `ranges`, one cursor per range in the given order.
    ///
    /// `plan` is the engine-specific plan artefact; it is kept unmodified.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidPlan`] if the engine cannot parse `plan` or
    ///   cannot execute what it describes.
    /// - [`PipelineError::NoPartitionRanges`] if `ranges` is empty.
    fn create_pipeline(
        &self,
        query: &str,
        plan: &[u8],
        ranges: &[PartitionKeyRangeProperties],
    ) -> crate::Result<Box<dyn QueryPipeline>>;

    /// Capability string describing the query constructs this engine supports.
    fn supported_features(&self) -> Cow<'static, str>;
}

// ---------------------------------------------------------------------------
// ParallelQueryEngine
// ---------------------------------------------------------------------------

// The parallel merge delivers items as they arrive; nothing order- or
// aggregate-aware is supported.
supported_features!(PARALLEL_FEATURES:);

/// The unordered/parallel baseline engine.
///
/// Accepts plans that need no client-side sorting, paging, aggregation or
/// de-duplication, and runs them on a [`PartitionedPipeline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelQueryEngine;

impl ParallelQueryEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }

    /// The features this engine advertises.
    pub fn features(&self) -> SupportedFeatures {
        PARALLEL_FEATURES
    }

    /// Resumes a query from a composite continuation token.
    ///
    /// The plan is validated exactly as in [`QueryEngine::create_pipeline`].
    #[tracing::instrument(level = "debug", skip_all, err)]
    pub fn resume_pipeline(
        &self,
        query: &str,
        plan: &[u8],
        token: &CompositeContinuationToken,
        ranges: &[PartitionKeyRangeProperties],
    ) -> crate::Result<Box<dyn QueryPipeline>> {
        let parsed = self.validate(plan)?;
        let pipeline = PartitionedPipeline::resume(parsed.effective_query(query), token, ranges)?
            .with_plan(plan);
        Ok(Box::new(pipeline))
    }

    fn validate(&self, plan: &[u8]) -> crate::Result<QueryPlan> {
        let parsed = QueryPlan::from_slice(plan)?;
        let missing: Vec<&str> = parsed
            .required_features()
            .into_iter()
            .filter(|feature| !PARALLEL_FEATURES.contains(*feature))
            .map(QueryFeature::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::InvalidPlan {
                message: format!("plan requires unsupported features: {}", missing.join(", ")),
            });
        }
        Ok(parsed)
    }
}

impl QueryEngine for ParallelQueryEngine {
    #[tracing::instrument(level = "debug", skip_all, err, fields(partitions = ranges.len()))]
    fn create_pipeline(
        &self,
        query: &str,
        plan: &[u8],
        ranges: &[PartitionKeyRangeProperties],
    ) -> crate::Result<Box<dyn QueryPipeline>> {
        let parsed = self.validate(plan)?;
        let effective = parsed.effective_query(query);
        if effective != query {
            tracing::debug!(original = ?query, rewritten = ?effective, "rewrote query, per gateway query plan");
        }
        let pipeline = PartitionedPipeline::for_query(effective, ranges)?.with_plan(plan);
        Ok(Box::new(pipeline))
    }

    fn supported_features(&self) -> Cow<'static, str> {
        Cow::Borrowed(PARALLEL_FEATURES.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    supported_features!(SAMPLE: OrderBy, Top, OffsetAndLimit);

    fn ranges() -> Vec<PartitionKeyRangeProperties> {
        vec![
            PartitionKeyRangeProperties::new("0", "", "80").unwrap(),
            PartitionKeyRangeProperties::new("1", "80", "FF").unwrap(),
        ]
    }

    #[test]
    fn feature_macro_joins_names() {
        assert_eq!(SAMPLE.as_str(), "OrderBy,Top,OffsetAndLimit");
        assert!(SAMPLE.contains(QueryFeature::Top));
        assert!(!SAMPLE.contains(QueryFeature::GroupBy));
        assert_eq!(ParallelQueryEngine::new().supported_features(), "");
        assert!(ParallelQueryEngine::new().features().as_slice().is_empty());
    }

    #[test]
    fn creates_one_cursor_per_range_in_order() {
        let engine = ParallelQueryEngine::new();
        let pipeline = engine.create_pipeline("SELECT * FROM c", b"", &ranges()).unwrap();
        assert_eq!(pipeline.query().unwrap(), "SELECT * FROM c");

        let ids: Vec<String> = pipeline
            .next_batch(10)
            .unwrap()
            .requests
            .into_iter()
            .map(|r| r.partition_id.into_inner())
            .collect();
        assert_eq!(ids, vec!["0", "1"]);
    }

    #[test]
    fn uses_the_rewritten_query() {
        let plan = br#"{"queryInfo":{"rewrittenQuery":"SELECT VALUE c.id FROM c"}}"#;
        let pipeline = ParallelQueryEngine::new()
            .create_pipeline("SELECT c.id FROM c", plan, &ranges())
            .unwrap();
        assert_eq!(pipeline.query().unwrap(), "SELECT VALUE c.id FROM c");
    }

    #[test]
    fn unparseable_plan_is_invalid() {
        let err = ParallelQueryEngine::new()
            .create_pipeline("SELECT * FROM c", b"{not json", &ranges())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidPlan { .. }));
    }

    #[test]
    fn order_aware_plan_is_rejected() {
        let plan = br#"{"queryInfo":{"orderBy":["Ascending"],"top":5}}"#;
        let err = ParallelQueryEngine::new()
            .create_pipeline("SELECT TOP 5 * FROM c ORDER BY c.x", plan, &ranges())
            .err()
            .unwrap();
        assert_eq!(
            err,
            PipelineError::InvalidPlan {
                message: "plan requires unsupported features: OrderBy, Top".into()
            }
        );
    }

    #[test]
    fn empty_partition_set_is_rejected() {
        let err = ParallelQueryEngine::new()
            .create_pipeline("SELECT * FROM c", b"{}", &[])
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::NoPartitionRanges);
    }
}
