//! Feed range resolution against a partition map snapshot.
//!
//! Matching is **exact**: a feed range resolves to a partition only when both
//! bounds equal that partition's bounds byte for byte. Overlap or containment is
//! never considered. A caller's feed range is expected to have been derived from
//! a partition boundary at some earlier point (for example via [`feed_ranges`]);
//! after a split or merge that range stops matching and the caller must
//! re-resolve the partition map.
//!
//! Both functions are pure and safe to call concurrently on shared snapshots.

use crate::{FeedRange, PartitionKeyRangeId, PartitionKeyRangeProperties, PipelineError};

/// Resolves `range` to the id of the partition whose bounds equal it exactly.
///
/// # Errors
///
/// [`PipelineError::NotFound`] naming the queried bounds when no entry of
/// `ranges` matches.
pub fn match_feed_range(
    range: &FeedRange,
    ranges: &[PartitionKeyRangeProperties],
) -> crate::Result<PartitionKeyRangeId> {
    ranges
        .iter()
        .find(|pkr| pkr.has_bounds_of(range))
        .map(|pkr| pkr.id.clone())
        .ok_or_else(|| {
            tracing::debug!(%range, candidates = ranges.len(), "feed range has no exact match");
            PipelineError::NotFound {
                min_inclusive: range.min_inclusive().to_string(),
                max_exclusive: range.max_exclusive().to_string(),
            }
        })
}

/// Lists one feed range per partition in `ranges`, in snapshot order.
///
/// Entries with degenerate bounds cannot be expressed as a feed range and are
/// skipped.
pub fn feed_ranges(ranges: &[PartitionKeyRangeProperties]) -> Vec<FeedRange> {
    ranges
        .iter()
        .filter_map(|pkr| {
            let range = pkr.feed_range();
            if range.is_none() {
                tracing::warn!(
                    partition_id = %pkr.id,
                    min_inclusive = %pkr.min_inclusive,
                    max_exclusive = %pkr.max_exclusive,
                    "skipping partition key range with degenerate bounds"
                );
            }
            range
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkrange(id: &str, min: &str, max: &str) -> PartitionKeyRangeProperties {
        PartitionKeyRangeProperties::new(id, min, max).unwrap()
    }

    fn range(min: &str, max: &str) -> FeedRange {
        FeedRange::new(min, max).unwrap()
    }

    #[test]
    fn exact_bounds_match() {
        let ranges = vec![pkrange("0", "00", "FF")];
        let id = match_feed_range(&range("00", "FF"), &ranges).unwrap();
        assert_eq!(id.as_str(), "0");
    }

    #[test]
    fn contained_range_does_not_match() {
        let ranges = vec![pkrange("0", "00", "FF")];
        let err = match_feed_range(&range("10", "FF"), &ranges).unwrap_err();
        assert_eq!(
            err,
            PipelineError::NotFound {
                min_inclusive: "10".into(),
                max_exclusive: "FF".into(),
            }
        );
    }

    #[test]
    fn overlapping_range_spanning_two_partitions_does_not_match() {
        let ranges = vec![
            pkrange("1", "00", "80"),
            pkrange("2", "80", "FF"),
        ];
        assert!(match_feed_range(&range("40", "C0"), &ranges).is_err());
        assert!(match_feed_range(&range("00", "FF"), &ranges).is_err());
    }

    #[test]
    fn picks_the_matching_entry_among_many() {
        let ranges = vec![
            pkrange("1", "", "40"),
            pkrange("2", "40", "80"),
            pkrange("3", "80", "FF"),
        ];
        assert_eq!(match_feed_range(&range("40", "80"), &ranges).unwrap().as_str(), "2");
        assert_eq!(match_feed_range(&range("", "40"), &ranges).unwrap().as_str(), "1");
    }

    #[test]
    fn empty_snapshot_never_matches() {
        assert!(matches!(
            match_feed_range(&range("00", "FF"), &[]),
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[test]
    fn feed_ranges_round_trip_through_the_matcher() {
        let ranges = vec![
            pkrange("1", "", "40"),
            pkrange("2", "40", "40"),
            pkrange("3", "40", "FF"),
        ];
        let listed = feed_ranges(&ranges);
        assert_eq!(listed, vec![range("", "40"), range("40", "FF")]);

        let ids: Vec<String> = listed
            .iter()
            .map(|r| match_feed_range(r, &ranges).unwrap().into_inner())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
