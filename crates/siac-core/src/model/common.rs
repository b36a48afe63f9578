use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a stored value came from.
///
/// Variant order is the tie-break priority when two records carry the same
/// `last_updated`: push beats snapshot beats optimistic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    Optimistic,
    Snapshot,
    Push,
}

/// A value plus the reconciliation metadata the store keeps for it.
#[derive(Debug)]
pub struct Record<T> {
    pub value: Arc<T>,
    pub last_updated: DateTime<Utc>,
    pub source: Source,
    /// Assigned by the collection on write; `0` until stored.
    pub revision: u64,
}

impl<T> Clone for Record<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            last_updated: self.last_updated,
            source: self.source,
            revision: self.revision,
        }
    }
}

impl<T> Record<T> {
    pub fn new(value: T, last_updated: DateTime<Utc>, source: Source) -> Self {
        Self {
            value: Arc::new(value),
            last_updated,
            source,
            revision: 0,
        }
    }

    pub fn snapshot(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self::new(value, fetched_at, Source::Snapshot)
    }

    pub fn push(value: T, at: DateTime<Utc>) -> Self {
        Self::new(value, at, Source::Push)
    }

    /// `true` if this record strictly wins over `current`: newer
    /// `last_updated`, or equal time and higher source priority.
    pub fn beats(&self, current: &Self) -> bool {
        (self.last_updated, self.source) > (current.last_updated, current.source)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn newer_timestamp_wins_regardless_of_source() {
        let t = Utc::now();
        let push = Record::push("a", t);
        let optimistic = Record::new("b", t + Duration::seconds(1), Source::Optimistic);
        assert!(optimistic.beats(&push));
        assert!(!push.beats(&optimistic));
    }

    #[test]
    fn ties_break_push_over_snapshot_over_optimistic() {
        let t = Utc::now();
        let push = Record::push("a", t);
        let snap = Record::snapshot("b", t);
        let optimistic = Record::new("c", t, Source::Optimistic);

        assert!(push.beats(&snap));
        assert!(snap.beats(&optimistic));
        assert!(!snap.beats(&push));
        assert!(!snap.beats(&snap.clone()));
    }
}
