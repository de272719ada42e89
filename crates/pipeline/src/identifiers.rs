//! Newtype identifiers and opaque service tokens.
//!
//! Every server-assigned name or opaque token the pipeline handles is a distinct
//! newtype wrapping a `String`. This prevents accidentally passing (for example)
//! a [`ContinuationToken`] where a [`PartitionKeyRangeId`] is expected even though
//! both are plain strings on the wire.
//!
//! The empty string is never a valid value. For continuations in particular this
//! is meaningful: "no continuation" (start of a partition, or end of its data) is
//! spelled `Option::<ContinuationToken>::None`, and `ContinuationToken::new("")`
//! returns `None`, so the service's empty-string convention maps onto it directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value, returning `None` if it is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the newtype, returning the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Server-assigned identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a partition key range as assigned by the service (e.g. `"0"`).
    ///
    /// Stable for the lifetime of the range; a split or merge retires the id
    /// and introduces new ones.
    PartitionKeyRangeId
}

string_id! {
    /// The service's resource id (`_rid`) of a container.
    ///
    /// Carried in composite continuation tokens so a token can be checked
    /// against the container it was produced for.
    ResourceId
}

// ---------------------------------------------------------------------------
// Opaque tokens
// ---------------------------------------------------------------------------

string_id! {
    /// An opaque "resume after this point" token for one partition's data stream.
    ContinuationToken
}

string_id! {
    /// A session consistency token returned by the service.
    SessionToken
}

string_id! {
    /// An entity tag; for change feeds, the per-partition position of the feed.
    ETag
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers (generated locally)
// ---------------------------------------------------------------------------

/// Correlates every per-partition request issued on behalf of one logical query.
///
/// Generated fresh for every [`crate::QueryOptions`] value and sent with each
/// single-partition request so the service can group them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelatedActivityId(Uuid);

impl CorrelatedActivityId {
    /// Generates a new random activity identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelatedActivityId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl std::fmt::Display for CorrelatedActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_continuation_means_none() {
        assert_eq!(ContinuationToken::new(""), None);
        assert_eq!(
            ContinuationToken::new("c1").map(ContinuationToken::into_inner),
            Some("c1".to_string())
        );
    }

    #[test]
    fn string_ids_serialize_as_plain_strings() {
        let id = PartitionKeyRangeId::new("7").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7\"");
    }

    #[test]
    fn activity_ids_are_distinct() {
        assert_ne!(
            CorrelatedActivityId::new_random(),
            CorrelatedActivityId::new_random()
        );
    }
}
