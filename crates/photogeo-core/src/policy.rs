use chrono::TimeDelta;

/// Default maximum gap between a photo and its GPS source.
pub const DEFAULT_MAX_GAP_MINUTES: i64 = 20;

/// `true` iff `delta <= max_gap`. Equality accepts.
pub fn accept(delta: TimeDelta, max_gap: TimeDelta) -> bool {
    delta <= max_gap
}

/// Threshold applied to the nearest match before its coordinate is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    max_gap: TimeDelta,
}

impl MatchPolicy {
    pub fn new(max_gap: TimeDelta) -> Self {
        Self { max_gap }
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(TimeDelta::minutes(minutes))
    }

    pub fn max_gap(&self) -> TimeDelta {
        self.max_gap
    }

    pub fn accept(&self, delta: TimeDelta) -> bool {
        accept(delta, self.max_gap)
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::from_minutes(DEFAULT_MAX_GAP_MINUTES)
    }
}
