//! The cross-partition pipeline.
//!
//! ## Overview
//!
//! A logical query or change-feed read fans out to one single-partition read per
//! partition key range. Each partition has its own continuation. The pipeline
//! tracks one [`PartitionCursor`] per partition and presents the caller with a
//! single ordered, resumable sequence of items.
//!
//! The pipeline performs no I/O. It is driven in turns:
//!
//! 1. The caller calls [`QueryPipeline::next_batch`]. The result carries any
//!    items ready for delivery and a list of [`DataRequest`]s.
//! 2. The caller's transport performs each request against the service and
//!    reports back through [`QueryPipeline::provide_data`]. Requests for
//!    different partitions may be in flight, and answered, concurrently.
//! 3. Repeat until a turn reports `is_completed`.
//!
//! ## Ordering
//!
//! Items are delivered partition by partition in registration order, and within
//! a partition in the order they were supplied. Ordering across partitions is
//! not a global sort; order-aware merges are a different engine's concern.
//!
//! ## Back-pressure
//!
//! At most one request per partition is outstanding at any time. A request is
//! handed out once; it is not repeated by later turns until `provide_data`
//! answers it. A partition whose buffer still holds undelivered items gets no
//! request at all. A turn in which every live partition is waiting on the
//! transport therefore returns no items, no requests, and `is_completed == false`.
//!
//! ## Concurrency
//!
//! All methods take `&self`; cursor state sits behind one mutex. `next_batch`
//! never waits on outstanding fetches, it only drains what is buffered.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::continuation::{CompositeContinuationToken, RangeContinuation};
use crate::cursor::PartitionCursor;
use crate::feed_range::match_feed_range;
use crate::payload::split_items;
use crate::{
    ContinuationToken, FeedRange, PartitionKeyRangeProperties, PipelineError, PipelineResult,
};

/// A pull/push state machine producing one stream of items from many partitions.
///
/// After [`close`](QueryPipeline::close) every other method fails with
/// [`PipelineError::Closed`].
pub trait QueryPipeline: Send + Sync {
    /// The query text to send with every single-partition request.
    ///
    /// May differ from the caller's query when the query plan rewrote it.
    fn query(&self) -> crate::Result<&str>;

    /// `true` once every partition is exhausted and every item delivered.
    fn is_complete(&self) -> crate::Result<bool>;

    /// Runs one turn, returning up to `max_page_size` items plus the requests
    /// the transport should perform next. A page size of zero is treated as one.
    fn next_batch(&self, max_page_size: usize) -> crate::Result<PipelineResult>;

    /// Feeds one partition's fetch result into the pipeline.
    ///
    /// `data` is the raw response body (see [`crate::payload`]). A `None` or
    /// empty `continuation` means the partition has no data after this batch.
    /// Data for a partition that is already exhausted is ignored.
    fn provide_data(
        &self,
        partition_id: &str,
        data: &[u8],
        continuation: Option<&str>,
    ) -> crate::Result<()>;

    /// Per-range resume positions for every unfinished partition.
    fn continuations(&self) -> crate::Result<Vec<RangeContinuation>>;

    /// Releases all buffered state. Idempotent.
    fn close(&self);
}

// ---------------------------------------------------------------------------
// PartitionedPipeline
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PipelineState {
    cursors: Vec<PartitionCursor>,
    by_partition: HashMap<String, usize>,
    closed: bool,
}

impl PipelineState {
    fn new(cursors: Vec<PartitionCursor>) -> Self {
        let mut by_partition = HashMap::with_capacity(cursors.len());
        let mut unique = Vec::with_capacity(cursors.len());
        for cursor in cursors {
            let id = cursor.partition_id().as_str().to_string();
            if by_partition.contains_key(&id) {
                tracing::warn!(partition_id = %id, "ignoring duplicate partition key range");
                continue;
            }
            by_partition.insert(id, unique.len());
            unique.push(cursor);
        }
        Self {
            cursors: unique,
            by_partition,
            closed: false,
        }
    }

    fn ensure_open(&self) -> crate::Result<()> {
        if self.closed {
            Err(PipelineError::Closed)
        } else {
            Ok(())
        }
    }

    fn all_exhausted(&self) -> bool {
        self.cursors.iter().all(PartitionCursor::is_exhausted)
    }
}

/// The unordered, parallel merge baseline.
///
/// One cursor per partition; items are delivered in partition registration
/// order. Used for both queries and change feeds.
#[derive(Debug)]
pub struct PartitionedPipeline {
    query: String,
    plan: Vec<u8>,
    state: Mutex<PipelineState>,
}

impl PartitionedPipeline {
    fn from_cursors(query: String, cursors: Vec<PartitionCursor>) -> Self {
        tracing::debug!(partitions = cursors.len(), "created partitioned pipeline");
        Self {
            query,
            plan: Vec::new(),
            state: Mutex::new(PipelineState::new(cursors)),
        }
    }

    /// Creates a query pipeline with one cursor per range, in the given order.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoPartitionRanges`] if `ranges` is empty.
    pub fn for_query(
        query: impl Into<String>,
        ranges: &[PartitionKeyRangeProperties],
    ) -> crate::Result<Self> {
        if ranges.is_empty() {
            return Err(PipelineError::NoPartitionRanges);
        }
        let cursors = ranges
            .iter()
            .map(|range| PartitionCursor::new(range, None))
            .collect();
        Ok(Self::from_cursors(query.into(), cursors))
    }

    /// Creates a change-feed pipeline over `feed_ranges`, each resolved to its
    /// partition through exact matching. An empty `feed_ranges` reads every
    /// partition in `ranges`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NoPartitionRanges`] if `ranges` is empty.
    /// - [`PipelineError::NotFound`] if a feed range matches no partition.
    pub fn for_change_feed(
        feed_ranges: &[FeedRange],
        ranges: &[PartitionKeyRangeProperties],
    ) -> crate::Result<Self> {
        if ranges.is_empty() {
            return Err(PipelineError::NoPartitionRanges);
        }
        if feed_ranges.is_empty() {
            return Self::for_query(String::new(), ranges);
        }

        let mut cursors = Vec::with_capacity(feed_ranges.len());
        for feed_range in feed_ranges {
            let id = match_feed_range(feed_range, ranges)?;
            if let Some(range) = ranges.iter().find(|r| r.id == id) {
                cursors.push(PartitionCursor::new(range, None));
            }
        }
        Ok(Self::from_cursors(String::new(), cursors))
    }

    /// Re-creates a pipeline from a composite continuation token.
    ///
    /// Each entry of the token is resolved to a partition through exact
    /// matching of its bounds and seeded with the entry's continuation. A token
    /// with no entries yields a pipeline that is already complete.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidContinuation`] if an entry has degenerate bounds.
    /// - [`PipelineError::NotFound`] if an entry matches no partition (the
    ///   partition was split or merged since the token was written).
    pub fn resume(
        query: impl Into<String>,
        token: &CompositeContinuationToken,
        ranges: &[PartitionKeyRangeProperties],
    ) -> crate::Result<Self> {
        let mut cursors = Vec::with_capacity(token.continuation.len());
        for entry in &token.continuation {
            let feed_range = entry
                .feed_range()
                .ok_or_else(|| PipelineError::InvalidContinuation {
                    message: format!(
                        "entry has degenerate bounds [{}, {})",
                        entry.min_inclusive, entry.max_exclusive
                    ),
                })?;
            let id = match_feed_range(&feed_range, ranges)?;
            if let Some(range) = ranges.iter().find(|r| r.id == id) {
                cursors.push(PartitionCursor::new(range, entry.continuation_token.clone()));
            }
        }
        Ok(Self::from_cursors(query.into(), cursors))
    }

    /// Attaches the raw, engine-specific plan this pipeline was built from.
    pub fn with_plan(mut self, plan: impl Into<Vec<u8>>) -> Self {
        self.plan = plan.into();
        self
    }

    /// The raw plan, exactly as it was supplied.
    pub fn plan(&self) -> &[u8] {
        &self.plan
    }

    /// Snapshot of all unfinished partitions as a composite continuation token.
    pub fn continuation_token(
        &self,
        resource_id: Option<crate::ResourceId>,
    ) -> crate::Result<CompositeContinuationToken> {
        Ok(CompositeContinuationToken::new(
            resource_id,
            self.continuations()?,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        // Cursor state only changes through complete transitions, so state
        // behind a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryPipeline for PartitionedPipeline {
    fn query(&self) -> crate::Result<&str> {
        self.lock().ensure_open()?;
        Ok(&self.query)
    }

    fn is_complete(&self) -> crate::Result<bool> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.all_exhausted())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    fn next_batch(&self, max_page_size: usize) -> crate::Result<PipelineResult> {
        let mut state = self.lock();
        state.ensure_open()?;

        let page_size = max_page_size.max(1);
        let mut items = Vec::new();
        for cursor in state.cursors.iter_mut() {
            let room = page_size - items.len();
            if room == 0 {
                break;
            }
            cursor.drain(room, &mut items);
        }

        let requests: Vec<_> = state
            .cursors
            .iter_mut()
            .filter_map(PartitionCursor::take_request)
            .collect();

        if items.is_empty() && requests.is_empty() && state.all_exhausted() {
            tracing::debug!("pipeline complete");
            return Ok(PipelineResult::COMPLETED);
        }

        tracing::debug!(
            items = items.len(),
            requests = requests.len(),
            still_buffered = state.cursors.iter().filter(|c| c.has_buffered_items()).count(),
            "pipeline turn"
        );
        Ok(PipelineResult {
            is_completed: false,
            items,
            requests,
        })
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        err,
        fields(partition_id = partition_id, data_len = data.len(), continuation = continuation)
    )]
    fn provide_data(
        &self,
        partition_id: &str,
        data: &[u8],
        continuation: Option<&str>,
    ) -> crate::Result<()> {
        let mut state = self.lock();
        state.ensure_open()?;

        let index = *state.by_partition.get(partition_id).ok_or_else(|| {
            PipelineError::UnknownPartition {
                partition_id: partition_id.to_string(),
            }
        })?;
        let cursor = &mut state.cursors[index];

        if cursor.is_exhausted() {
            tracing::warn!("ignoring data for exhausted partition");
            return Ok(());
        }

        let items = match split_items(partition_id, data) {
            Ok(items) => items,
            Err(err) => {
                // The answer is unusable; let the next turn ask again.
                cursor.abandon_request();
                return Err(err);
            }
        };
        let continuation = continuation.and_then(ContinuationToken::new);
        cursor.provide(items, continuation);
        Ok(())
    }

    fn continuations(&self) -> crate::Result<Vec<RangeContinuation>> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state
            .cursors
            .iter()
            .filter_map(|cursor| {
                let continuation_token = cursor.resume_point()?;
                let (min, max) = cursor.bounds();
                Some(RangeContinuation {
                    min_inclusive: min.to_string(),
                    max_exclusive: max.to_string(),
                    continuation_token,
                })
            })
            .collect())
    }

    fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        for cursor in state.cursors.iter_mut() {
            cursor.release();
        }
        state.closed = true;
        tracing::debug!("pipeline closed");
    }
}
