//! Gateway query plans.
//!
//! Before a cross-partition query runs, the gateway can be asked for a plan: a
//! JSON description of what the query needs from the client-side merge (sorting,
//! aggregation, paging) and, optionally, a rewritten query to send to each
//! partition. Engines parse the plan to decide whether they can run the query.
//!
//! Every field defaults, so a plan that omits sections (or an empty plan body)
//! describes a plain projection/filter query.

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Placeholder the gateway leaves in rewritten `ORDER BY` queries.
const ORDER_BY_FILTER_PLACEHOLDER: &str = "{documentdb-formattableorderbyquery-filter}";

/// A query construct that needs client-side support beyond the parallel merge.
///
/// Names match the gateway's capability vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryFeature {
    Aggregate,
    CompositeAggregate,
    CountIf,
    DCount,
    Distinct,
    GroupBy,
    HybridSearch,
    ListAndSetAggregate,
    MultipleAggregates,
    MultipleOrderBy,
    NonStreamingOrderBy,
    NonValueAggregate,
    OffsetAndLimit,
    OrderBy,
    Top,
}

impl QueryFeature {
    /// The gateway's name for this feature.
    pub fn as_str(self) -> &'static str {
        match self {
            QueryFeature::Aggregate => "Aggregate",
            QueryFeature::CompositeAggregate => "CompositeAggregate",
            QueryFeature::CountIf => "CountIf",
            QueryFeature::DCount => "DCount",
            QueryFeature::Distinct => "Distinct",
            QueryFeature::GroupBy => "GroupBy",
            QueryFeature::HybridSearch => "HybridSearch",
            QueryFeature::ListAndSetAggregate => "ListAndSetAggregate",
            QueryFeature::MultipleAggregates => "MultipleAggregates",
            QueryFeature::MultipleOrderBy => "MultipleOrderBy",
            QueryFeature::NonStreamingOrderBy => "NonStreamingOrderBy",
            QueryFeature::NonValueAggregate => "NonValueAggregate",
            QueryFeature::OffsetAndLimit => "OffsetAndLimit",
            QueryFeature::OrderBy => "OrderBy",
            QueryFeature::Top => "Top",
        }
    }
}

impl std::fmt::Display for QueryFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistinctType {
    #[default]
    None,
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// The `queryInfo` section of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryInfo {
    pub distinct_type: DistinctType,
    pub top: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub order_by: Vec<SortOrder>,
    pub order_by_expressions: Vec<String>,
    pub group_by_expressions: Vec<String>,
    pub aggregates: Vec<String>,
    pub has_select_value: bool,
    /// Query to send to each partition instead of the caller's. Empty when the
    /// gateway did not rewrite the query.
    pub rewritten_query: String,
    pub has_non_streaming_order_by: bool,
}

/// A key range the query is known to touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRange {
    pub min: String,
    pub max: String,
    pub is_min_inclusive: bool,
    pub is_max_inclusive: bool,
}

/// A parsed gateway query plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryPlan {
    pub partitioned_query_execution_info_version: u32,
    pub query_info: QueryInfo,
    pub query_ranges: Vec<QueryRange>,
}

impl QueryPlan {
    /// Parses a plan. An empty (or all-whitespace) body is the default plan.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidPlan`] if `plan` is not valid plan JSON.
    pub fn from_slice(plan: &[u8]) -> crate::Result<Self> {
        if plan.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(plan).map_err(|e| PipelineError::InvalidPlan {
            message: e.to_string(),
        })
    }

    /// Features a client-side engine must implement to run this plan correctly.
    pub fn required_features(&self) -> Vec<QueryFeature> {
        let info = &self.query_info;
        let mut features = Vec::new();

        if !info.order_by.is_empty() {
            features.push(QueryFeature::OrderBy);
            if info.order_by.len() > 1 {
                features.push(QueryFeature::MultipleOrderBy);
            }
        }
        if info.has_non_streaming_order_by {
            features.push(QueryFeature::NonStreamingOrderBy);
        }
        if info.top.is_some() {
            features.push(QueryFeature::Top);
        }
        if info.offset.is_some() || info.limit.is_some() {
            features.push(QueryFeature::OffsetAndLimit);
        }
        if !info.aggregates.is_empty() {
            features.push(QueryFeature::Aggregate);
            if !info.has_select_value {
                features.push(QueryFeature::NonValueAggregate);
            }
            if info.aggregates.len() > 1 {
                features.push(QueryFeature::MultipleAggregates);
            }
        }
        if !info.group_by_expressions.is_empty() {
            features.push(QueryFeature::GroupBy);
        }
        if info.distinct_type != DistinctType::None {
            features.push(QueryFeature::Distinct);
        }
        features
    }

    /// The query to send to each partition: the gateway's rewrite if there is
    /// one, otherwise `original`.
    pub fn effective_query(&self, original: &str) -> String {
        let rewritten = &self.query_info.rewritten_query;
        if rewritten.is_empty() {
            original.to_string()
        } else {
            rewritten.replace(ORDER_BY_FILTER_PLACEHOLDER, "true")
        }
    }
}
