//! Shared value types for the feed pipeline.
//!
//! Unlike the opaque tokens in [`crate::identifiers`], these types carry
//! structure and invariants (a feed range is never empty, a completed result
//! carries no items) and participate in the pipeline's computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContinuationToken, PartitionKeyRangeId, PipelineError};

// ---------------------------------------------------------------------------
// Key ranges
// ---------------------------------------------------------------------------

/// A half-open interval `[min_inclusive, max_exclusive)` over the partition key
/// hash space.
///
/// Bounds are compared lexicographically. A feed range is never empty:
/// `min_inclusive < max_exclusive` always holds, including after deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFeedRange", rename_all = "camelCase")]
pub struct FeedRange {
    min_inclusive: String,
    max_exclusive: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeedRange {
    min_inclusive: String,
    max_exclusive: String,
}

impl TryFrom<RawFeedRange> for FeedRange {
    type Error = PipelineError;

    fn try_from(raw: RawFeedRange) -> Result<Self, Self::Error> {
        FeedRange::try_new(raw.min_inclusive, raw.max_exclusive)
    }
}

impl FeedRange {
    /// Creates a feed range, returning `None` unless `min_inclusive < max_exclusive`.
    pub fn new(min_inclusive: impl Into<String>, max_exclusive: impl Into<String>) -> Option<Self> {
        Self::try_new(min_inclusive, max_exclusive).ok()
    }

    /// Creates a feed range, failing with [`PipelineError::InvalidFeedRange`]
    /// unless `min_inclusive < max_exclusive`.
    pub fn try_new(
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> crate::Result<Self> {
        let min_inclusive = min_inclusive.into();
        let max_exclusive = max_exclusive.into();
        if min_inclusive < max_exclusive {
            Ok(Self {
                min_inclusive,
                max_exclusive,
            })
        } else {
            Err(PipelineError::InvalidFeedRange {
                min_inclusive,
                max_exclusive,
            })
        }
    }

    /// Lower bound, inclusive.
    pub fn min_inclusive(&self) -> &str {
        &self.min_inclusive
    }

    /// Upper bound, exclusive.
    pub fn max_exclusive(&self) -> &str {
        &self.max_exclusive
    }
}

impl std::fmt::Display for FeedRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.min_inclusive, self.max_exclusive)
    }
}

// ---------------------------------------------------------------------------

/// One entry of the partition map: a server-assigned partition and the key range
/// it currently owns.
///
/// Snapshots are supplied by the partition-resolution collaborator, fresh per
/// top-level operation. Unknown fields in the service's representation are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRangeProperties {
    /// Server-assigned partition identifier.
    pub id: PartitionKeyRangeId,
    /// Lower bound of the owned range, inclusive.
    pub min_inclusive: String,
    /// Upper bound of the owned range, exclusive.
    pub max_exclusive: String,
}

impl PartitionKeyRangeProperties {
    /// Creates a snapshot entry, returning `None` if `id` is empty.
    pub fn new(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Option<Self> {
        Some(Self {
            id: PartitionKeyRangeId::new(id)?,
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
        })
    }

    /// Returns the owned range as a [`FeedRange`], or `None` if the snapshot's
    /// bounds are degenerate.
    pub fn feed_range(&self) -> Option<FeedRange> {
        FeedRange::new(self.min_inclusive.clone(), self.max_exclusive.clone())
    }

    /// Returns `true` if this entry's bounds equal `range`'s bounds exactly.
    pub fn has_bounds_of(&self, range: &FeedRange) -> bool {
        self.min_inclusive == range.min_inclusive && self.max_exclusive == range.max_exclusive
    }
}

// ---------------------------------------------------------------------------
// Pipeline exchange types
// ---------------------------------------------------------------------------

/// A demand signal: "give me more data for this partition, starting after this
/// continuation".
///
/// Produced by the pipeline, consumed by the transport collaborator, which
/// answers it with exactly one `provide_data` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    /// Partition to read from.
    pub partition_id: PartitionKeyRangeId,
    /// Where to resume. `None` means the start of the partition.
    pub continuation: Option<ContinuationToken>,
}

/// The observable outcome of one `next_batch` turn.
///
/// A completed result is terminal: its `items` and `requests` are empty, and
/// every later turn returns the same.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineResult {
    /// `true` once every partition is exhausted and every item has been delivered.
    pub is_completed: bool,
    /// Raw item bytes, in delivery order.
    pub items: Vec<Vec<u8>>,
    /// Requests the transport must fulfil before more items can be produced.
    pub requests: Vec<DataRequest>,
}

impl PipelineResult {
    /// The terminal result.
    pub const COMPLETED: PipelineResult = PipelineResult {
        is_completed: true,
        items: Vec::new(),
        requests: Vec::new(),
    };
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Formats as an HTTP date (RFC 1123), e.g. `Tue, 15 Nov 1994 08:12:31 GMT`.
    pub fn to_rfc1123(self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

/// Parses an RFC 3339 timestamp with any offset, normalised to UTC.
impl std::str::FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc)))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
