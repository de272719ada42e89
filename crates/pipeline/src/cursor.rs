//! Per-partition cursor state.
//!
//! A [`PartitionCursor`] is owned exclusively by one pipeline and is mutated
//! only through [`PartitionCursor::provide`] and [`PartitionCursor::drain`].
//!
//! ```text
//!  Fresh ──provide(items)──▶ Buffered ──drain, continuation──▶ AwaitingData
//!    │                          │                                  │
//!    │                          └──drain, no continuation──▶ Exhausted
//!    └──provide(no items, no continuation)────────────────────────▶│
//!                                AwaitingData ──provide(items)──▶ Buffered
//! ```
//!
//! Independently of the state, a cursor remembers whether a request has been
//! handed out and not yet answered; no second request is produced until the
//! first is answered.

use std::collections::VecDeque;

use crate::{ContinuationToken, DataRequest, PartitionKeyRangeId, PartitionKeyRangeProperties};

/// Lifecycle of a partition cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CursorState {
    /// No data received yet.
    Fresh,
    /// Items are ready for delivery.
    Buffered,
    /// Buffer drained; more data is expected from the partition.
    AwaitingData,
    /// Terminal: the partition reported no further continuation and the buffer is empty.
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct PartitionCursor {
    partition_id: PartitionKeyRangeId,
    min_inclusive: String,
    max_exclusive: String,
    buffer: VecDeque<Vec<u8>>,
    continuation: Option<ContinuationToken>,
    // Continuation that was used to fetch the items currently buffered.
    buffer_origin: Option<ContinuationToken>,
    state: CursorState,
    request_outstanding: bool,
}

impl PartitionCursor {
    /// Creates a cursor positioned at `continuation` (`None` = start of the partition).
    pub(crate) fn new(
        range: &PartitionKeyRangeProperties,
        continuation: Option<ContinuationToken>,
    ) -> Self {
        Self {
            partition_id: range.id.clone(),
            min_inclusive: range.min_inclusive.clone(),
            max_exclusive: range.max_exclusive.clone(),
            buffer: VecDeque::new(),
            continuation,
            buffer_origin: None,
            state: CursorState::Fresh,
            request_outstanding: false,
        }
    }

    pub(crate) fn partition_id(&self) -> &PartitionKeyRangeId {
        &self.partition_id
    }

    pub(crate) fn bounds(&self) -> (&str, &str) {
        (&self.min_inclusive, &self.max_exclusive)
    }

    pub(crate) fn state(&self) -> CursorState {
        self.state
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    pub(crate) fn has_buffered_items(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Hands out a request if the cursor needs data and has none outstanding.
    pub(crate) fn take_request(&mut self) -> Option<DataRequest> {
        let wants_data = matches!(self.state, CursorState::Fresh | CursorState::AwaitingData);
        if !wants_data || self.request_outstanding {
            return None;
        }
        self.request_outstanding = true;
        Some(DataRequest {
            partition_id: self.partition_id.clone(),
            continuation: self.continuation.clone(),
        })
    }

    /// Forgets the outstanding request so the next turn asks again.
    pub(crate) fn abandon_request(&mut self) {
        self.request_outstanding = false;
    }

    /// Applies one fetch result. Returns `false` (and changes nothing) when the
    /// cursor is already exhausted.
    pub(crate) fn provide(
        &mut self,
        items: Vec<Vec<u8>>,
        continuation: Option<ContinuationToken>,
    ) -> bool {
        if self.is_exhausted() {
            return false;
        }

        self.request_outstanding = false;
        if self.buffer.is_empty() {
            self.buffer_origin = self.continuation.clone();
        }
        self.continuation = continuation;

        let previous = self.state;
        if !items.is_empty() {
            self.buffer.extend(items);
            self.state = CursorState::Buffered;
        } else if self.buffer.is_empty() {
            self.state = if self.continuation.is_some() {
                CursorState::AwaitingData
            } else {
                CursorState::Exhausted
            };
        }

        tracing::trace!(
            partition_id = %self.partition_id,
            from = ?previous,
            to = ?self.state,
            buffered = self.buffer.len(),
            "cursor received data"
        );
        true
    }

    /// Moves up to `max` buffered items into `out`, returning how many moved.
    pub(crate) fn drain(&mut self, max: usize, out: &mut Vec<Vec<u8>>) -> usize {
        let take = max.min(self.buffer.len());
        out.extend(self.buffer.drain(..take));

        if self.state == CursorState::Buffered && self.buffer.is_empty() {
            self.buffer_origin = None;
            self.state = if self.continuation.is_some() {
                CursorState::AwaitingData
            } else {
                CursorState::Exhausted
            };
            tracing::trace!(partition_id = %self.partition_id, to = ?self.state, "cursor drained");
        }
        take
    }

    /// The continuation a fresh cursor should start from to resume this one,
    /// or `None` once exhausted.
    ///
    /// Undelivered buffered items are re-fetched on resume, so the position of
    /// the page that produced them is reported rather than the newest one.
    pub(crate) fn resume_point(&self) -> Option<Option<ContinuationToken>> {
        if self.is_exhausted() {
            None
        } else if self.buffer.is_empty() {
            Some(self.continuation.clone())
        } else {
            Some(self.buffer_origin.clone())
        }
    }

    pub(crate) fn release(&mut self) {
        self.buffer = VecDeque::new();
    }
}
