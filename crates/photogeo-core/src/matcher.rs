use chrono::{NaiveDateTime, TimeDelta};

use crate::index::TimeOrderedIndex;
use crate::photo::PhotoRecord;
use crate::policy::MatchPolicy;

/// Closest GPS-tagged photo to a query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest<'a> {
    pub record: &'a PhotoRecord,
    /// Absolute distance between the query and `record.captured_at`
    pub delta: TimeDelta,
}

/// Outcome of matching one query against the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult<'a> {
    /// `None` only when the index is empty
    pub nearest: Option<Nearest<'a>>,
    pub accepted: bool,
}

impl<'a> MatchResult<'a> {
    pub fn record(&self) -> Option<&'a PhotoRecord> {
        self.nearest.map(|n| n.record)
    }

    pub fn delta(&self) -> Option<TimeDelta> {
        self.nearest.map(|n| n.delta)
    }
}

/// Find the tagged photo closest in time to `query`.
///
/// Uses the insertion point (first record not strictly before `query`) to pick
/// between the left and right neighbours. On an exact tie the right neighbour
/// wins.
pub fn find_nearest(index: &TimeOrderedIndex, query: NaiveDateTime) -> Option<Nearest<'_>> {
    let records = index.as_slice();
    let i = records.partition_point(|r| r.captured_at < query);

    let right = records.get(i).map(|r| Nearest {
        record: r,
        delta: r.captured_at - query,
    });
    let left = i.checked_sub(1).map(|j| Nearest {
        record: &records[j],
        delta: query - records[j].captured_at,
    });

    match (left, right) {
        (Some(l), Some(r)) if l.delta < r.delta => Some(l),
        (_, Some(r)) => Some(r),
        (l, None) => l,
    }
}

/// Nearest search plus threshold decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    policy: MatchPolicy,
}

impl Matcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn match_time<'a>(&self, index: &'a TimeOrderedIndex, query: NaiveDateTime) -> MatchResult<'a> {
        let nearest = find_nearest(index, query);
        let accepted = nearest.is_some_and(|n| self.policy.accept(n.delta));
        MatchResult { nearest, accepted }
    }

    pub fn match_photo<'a>(&self, index: &'a TimeOrderedIndex, photo: &PhotoRecord) -> MatchResult<'a> {
        self.match_time(index, photo.captured_at)
    }
}
