//! Composite continuation tokens.
//!
//! A pipeline spans many partitions, each with its own continuation. To resume a
//! query or change feed later (possibly in another process) the caller needs all
//! of them, keyed by the partition's key range rather than its id, since ids are
//! only stable between splits. A [`CompositeContinuationToken`] is that snapshot:
//!
//! ```json
//! {
//!   "version": 1,
//!   "resourceId": "dbs/x/colls/y",
//!   "continuation": [
//!     { "minInclusive": "", "maxExclusive": "80", "continuationToken": "c1" },
//!     { "minInclusive": "80", "maxExclusive": "FF", "continuationToken": null }
//!   ]
//! }
//! ```
//!
//! A `null` (or empty) `continuationToken` means the range has not been read yet.
//! Ranges that were fully consumed are absent.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{ContinuationToken, FeedRange, PipelineError, ResourceId};

/// Version written by [`CompositeContinuationToken::new`].
pub const COMPOSITE_TOKEN_VERSION: u32 = 1;

/// Resume position of one key range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeContinuation {
    /// Lower bound of the range, inclusive.
    pub min_inclusive: String,
    /// Upper bound of the range, exclusive.
    pub max_exclusive: String,
    /// Where to resume. `None` means the start of the range.
    #[serde(default, deserialize_with = "non_empty_token")]
    pub continuation_token: Option<ContinuationToken>,
}

impl RangeContinuation {
    /// The range this entry applies to, or `None` if its bounds are degenerate.
    pub fn feed_range(&self) -> Option<FeedRange> {
        FeedRange::new(self.min_inclusive.clone(), self.max_exclusive.clone())
    }
}

fn non_empty_token<'de, D>(deserializer: D) -> Result<Option<ContinuationToken>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(ContinuationToken::new))
}

/// Per-range continuations for a whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeContinuationToken {
    /// Token format version.
    pub version: u32,
    /// The container the token was produced for, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    /// One entry per unfinished range, in pipeline registration order.
    #[serde(default)]
    pub continuation: Vec<RangeContinuation>,
}

impl CompositeContinuationToken {
    /// Creates a current-version token.
    pub fn new(resource_id: Option<ResourceId>, continuation: Vec<RangeContinuation>) -> Self {
        Self {
            version: COMPOSITE_TOKEN_VERSION,
            resource_id,
            continuation,
        }
    }

    /// Parses a token from its JSON form.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidContinuation`] if `json` is not a composite token.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::InvalidContinuation {
            message: e.to_string(),
        })
    }

    /// Serialises the token to JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| PipelineError::InvalidContinuation {
            message: e.to_string(),
        })
    }

    /// Returns `true` when no range is left to read.
    pub fn is_finished(&self) -> bool {
        self.continuation.is_empty()
    }

    /// The key range of the first entry.
    ///
    /// Used to scope a change-feed read that carries a token but no explicit
    /// feed range.
    pub fn first_feed_range(&self) -> Option<FeedRange> {
        self.continuation.first().and_then(RangeContinuation::feed_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_service_shape() {
        let token = CompositeContinuationToken::from_json(
            r#"{"version":1,"resourceId":"rid1","continuation":[
                {"minInclusive":"","maxExclusive":"80","continuationToken":"\"42\""},
                {"minInclusive":"80","maxExclusive":"FF","continuationToken":""},
                {"minInclusive":"FF","maxExclusive":"FFFF"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(token.resource_id.as_ref().map(ResourceId::as_str), Some("rid1"));
        assert_eq!(token.continuation.len(), 3);
        assert_eq!(
            token.continuation[0].continuation_token,
            ContinuationToken::new("\"42\"")
        );
        assert_eq!(token.continuation[1].continuation_token, None);
        assert_eq!(token.continuation[2].continuation_token, None);
        assert_eq!(token.first_feed_range(), FeedRange::new("", "80"));
    }

    #[test]
    fn serialises_unread_ranges_as_null() {
        let token = CompositeContinuationToken::new(
            None,
            vec![RangeContinuation {
                min_inclusive: "00".into(),
                max_exclusive: "FF".into(),
                continuation_token: None,
            }],
        );
        assert_eq!(
            token.to_json().unwrap(),
            r#"{"version":1,"continuation":[{"minInclusive":"00","maxExclusive":"FF","continuationToken":null}]}"#
        );
    }

    #[test]
    fn rejects_non_token_json() {
        assert!(matches!(
            CompositeContinuationToken::from_json("\"plain-etag\""),
            Err(PipelineError::InvalidContinuation { .. })
        ));
    }

    #[test]
    fn empty_token_is_finished() {
        let token = CompositeContinuationToken::new(None, Vec::new());
        assert!(token.is_finished());
        assert_eq!(token.first_feed_range(), None);
    }
}
