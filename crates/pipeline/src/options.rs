//! Request options and the headers they contribute.
//!
//! Every options type is a plain configuration value with a documented default
//! for each field. `Option<T>` is used only where "not specified" differs from
//! the zero value (an unset `max_item_count` lets the service choose; zero
//! would not).
//!
//! Options never write into a shared header map. Each exposes a pure
//! `headers()` contribution returning its own ordered `(name, value)` pairs,
//! and [`merge_headers`] combines contributions deterministically: later
//! contributions override earlier ones on a (case-insensitive) name collision.

use std::fmt;
use std::sync::Arc;

use crate::continuation::CompositeContinuationToken;
use crate::engine::QueryEngine;
use crate::feed_range::match_feed_range;
use crate::{
    ContinuationToken, CorrelatedActivityId, DataRequest, ETag, FeedRange,
    PartitionKeyRangeProperties, SessionToken, Timestamp,
};

/// Header names sent by the options in this module.
pub mod header {
    pub const A_IM: &str = "A-IM";
    pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const CONSISTENCY_LEVEL: &str = "x-ms-consistency-level";
    pub const CONTINUATION: &str = "x-ms-continuation";
    pub const CORRELATED_ACTIVITY_ID: &str = "x-ms-cosmos-correlated-activityid";
    pub const ENABLE_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
    pub const ENABLE_SCAN_IN_QUERY: &str = "x-ms-documentdb-query-enable-scan";
    pub const IS_QUERY: &str = "x-ms-documentdb-isquery";
    pub const MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
    pub const PARTITION_KEY_RANGE_ID: &str = "x-ms-documentdb-partitionkeyrangeid";
    pub const POPULATE_INDEX_METRICS: &str = "x-ms-documentdb-populateindexmetrics";
    pub const POPULATE_QUERY_METRICS: &str = "x-ms-documentdb-populatequerymetrics";
    pub const RESPONSE_CONTINUATION_LIMIT_KB: &str =
        "x-ms-documentdb-responsecontinuationtokenlimitinkb";
    pub const SESSION_TOKEN: &str = "x-ms-session-token";
    pub const SUPPORTED_QUERY_FEATURES: &str = "x-ms-cosmos-supported-query-features";

    /// Value of [`A_IM`] selecting the incremental change feed.
    pub const INCREMENTAL_FEED: &str = "Incremental feed";
}

/// An ordered list of header name/value pairs contributed by one source.
pub type Headers = Vec<(&'static str, String)>;

/// Merges header contributions in order. On a case-insensitive name collision
/// the later value wins and takes the later position.
pub fn merge_headers<I>(contributions: I) -> Headers
where
    I: IntoIterator<Item = Headers>,
{
    let mut merged: Headers = Vec::new();
    for (name, value) in contributions.into_iter().flatten() {
        merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        merged.push((name, value));
    }
    merged
}

// ---------------------------------------------------------------------------
// Consistency
// ---------------------------------------------------------------------------

/// Consistency level override for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::BoundedStaleness => "BoundedStaleness",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::ConsistentPrefix => "ConsistentPrefix",
            ConsistencyLevel::Eventual => "Eventual",
        }
    }
}

fn bool_header(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

// ---------------------------------------------------------------------------
// Query options
// ---------------------------------------------------------------------------

/// Options for a (possibly cross-partition) query.
///
/// | Field | Default |
/// |-------|---------|
/// | `max_item_count` | unset: the service picks the page size |
/// | `continuation` | unset: start from the beginning |
/// | `session_token` | unset |
/// | `consistency_level` | unset: the account default |
/// | `populate_index_metrics` | `false` |
/// | `populate_query_metrics` | `false` |
/// | `enable_scan_in_query` | unset: the service default |
/// | `response_continuation_token_limit_kb` | unset: no limit |
/// | `correlated_activity_id` | a fresh random id |
/// | `query_engine` | unset: no client-side cross-partition merge |
#[derive(Clone, Default)]
pub struct QueryOptions {
    pub max_item_count: Option<u32>,
    pub continuation: Option<ContinuationToken>,
    pub session_token: Option<SessionToken>,
    pub consistency_level: Option<ConsistencyLevel>,
    pub populate_index_metrics: bool,
    pub populate_query_metrics: bool,
    pub enable_scan_in_query: Option<bool>,
    pub response_continuation_token_limit_kb: Option<u32>,
    pub correlated_activity_id: CorrelatedActivityId,
    pub query_engine: Option<Arc<dyn QueryEngine>>,
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("max_item_count", &self.max_item_count)
            .field("continuation", &self.continuation)
            .field("session_token", &self.session_token)
            .field("consistency_level", &self.consistency_level)
            .field("populate_index_metrics", &self.populate_index_metrics)
            .field("populate_query_metrics", &self.populate_query_metrics)
            .field("enable_scan_in_query", &self.enable_scan_in_query)
            .field(
                "response_continuation_token_limit_kb",
                &self.response_continuation_token_limit_kb,
            )
            .field("correlated_activity_id", &self.correlated_activity_id)
            .field("query_engine", &self.query_engine.is_some())
            .finish()
    }
}

impl QueryOptions {
    /// Headers for every request issued on behalf of this query.
    pub fn headers(&self) -> Headers {
        let mut headers: Headers = vec![
            (header::IS_QUERY, bool_header(true)),
            (header::ENABLE_CROSS_PARTITION, bool_header(true)),
            (
                header::CORRELATED_ACTIVITY_ID,
                self.correlated_activity_id.to_string(),
            ),
        ];

        if let Some(count) = self.max_item_count {
            headers.push((header::MAX_ITEM_COUNT, count.to_string()));
        }
        if let Some(continuation) = &self.continuation {
            headers.push((header::CONTINUATION, continuation.to_string()));
        }
        if let Some(token) = &self.session_token {
            headers.push((header::SESSION_TOKEN, token.to_string()));
        }
        if let Some(level) = self.consistency_level {
            headers.push((header::CONSISTENCY_LEVEL, level.as_str().to_string()));
        }
        if self.populate_index_metrics {
            headers.push((header::POPULATE_INDEX_METRICS, bool_header(true)));
        }
        if self.populate_query_metrics {
            headers.push((header::POPULATE_QUERY_METRICS, bool_header(true)));
        }
        if let Some(scan) = self.enable_scan_in_query {
            headers.push((header::ENABLE_SCAN_IN_QUERY, bool_header(scan)));
        }
        if let Some(limit) = self.response_continuation_token_limit_kb {
            headers.push((header::RESPONSE_CONTINUATION_LIMIT_KB, limit.to_string()));
        }
        if let Some(engine) = &self.query_engine {
            headers.push((
                header::SUPPORTED_QUERY_FEATURES,
                engine.supported_features().into_owned(),
            ));
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Change feed options
// ---------------------------------------------------------------------------

/// Options for one change-feed read.
///
/// | Field | Default |
/// |-------|---------|
/// | `max_item_count` | unset: the service picks the page size |
/// | `start_from` | unset: from the beginning of the feed |
/// | `etag` | unset: no `If-None-Match` |
/// | `feed_range` | unset: taken from `continuation` |
/// | `continuation` | unset; a composite continuation token (JSON) |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFeedOptions {
    pub max_item_count: Option<u32>,
    pub start_from: Option<Timestamp>,
    pub etag: Option<ETag>,
    pub feed_range: Option<FeedRange>,
    pub continuation: Option<String>,
}

impl ChangeFeedOptions {
    fn composite_token(&self) -> Option<CompositeContinuationToken> {
        let json = self.continuation.as_deref().filter(|c| !c.is_empty())?;
        CompositeContinuationToken::from_json(json).ok()
    }

    /// The feed range this read is scoped to: the explicit one, or the first
    /// range of a composite continuation token.
    pub fn effective_feed_range(&self) -> Option<FeedRange> {
        if let Some(range) = &self.feed_range {
            return Some(range.clone());
        }
        self.composite_token()?.first_feed_range()
    }

    /// The feed position to read after: the explicit `etag`, or the
    /// continuation of the first range of a composite continuation token.
    pub fn effective_etag(&self) -> Option<ETag> {
        if let Some(etag) = &self.etag {
            return Some(etag.clone());
        }
        let token = self.composite_token()?;
        let first = token.continuation.into_iter().next()?;
        ETag::new(first.continuation_token?.into_inner())
    }

    /// Headers for the change-feed request.
    ///
    /// The feed range (see [`effective_feed_range`](Self::effective_feed_range))
    /// is resolved to a partition id against `ranges`. With no partition map
    /// (`ranges` empty) the partition header is left out.
    ///
    /// # Errors
    ///
    /// [`crate::PipelineError::NotFound`] if the feed range matches no partition.
    pub fn headers(&self, ranges: &[PartitionKeyRangeProperties]) -> crate::Result<Headers> {
        let mut headers: Headers = vec![(header::A_IM, header::INCREMENTAL_FEED.to_string())];

        if let Some(count) = self.max_item_count {
            headers.push((header::MAX_ITEM_COUNT, count.to_string()));
        }
        if let Some(start) = self.start_from {
            headers.push((header::IF_MODIFIED_SINCE, start.to_rfc1123()));
        }
        if let Some(etag) = self.effective_etag() {
            headers.push((header::IF_NONE_MATCH, etag.into_inner()));
        }
        if let Some(range) = self.effective_feed_range().filter(|_| !ranges.is_empty()) {
            let id = match_feed_range(&range, ranges)?;
            headers.push((header::PARTITION_KEY_RANGE_ID, id.into_inner()));
        }
        Ok(headers)
    }
}

// ---------------------------------------------------------------------------
// Per-request headers
// ---------------------------------------------------------------------------

impl DataRequest {
    /// Headers that address this request to its partition and position.
    pub fn headers(&self) -> Headers {
        let mut headers: Headers = vec![(
            header::PARTITION_KEY_RANGE_ID,
            self.partition_id.to_string(),
        )];
        if let Some(continuation) = &self.continuation {
            headers.push((header::CONTINUATION, continuation.to_string()));
        }
        headers
    }
}
