//! Resolution tier assignment

use crate::config::SamplingConfig;
use crate::models::Tier;

/// Age boundaries of the `recent` and `hourly` tiers, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBounds {
    pub recent_secs: i64,
    pub hourly_secs: i64,
}

impl TierBounds {
    pub fn from_config(sampling: &SamplingConfig) -> Self {
        Self {
            recent_secs: sampling.recent_window_secs(),
            hourly_secs: sampling.hourly_window_secs(),
        }
    }

    /// age < recent → recent, age < hourly → hourly, else daily.
    pub fn classify(&self, timestamp: i64, now: i64) -> Tier {
        let age = now - timestamp;
        if age < self.recent_secs {
            Tier::Recent
        } else if age < self.hourly_secs {
            Tier::Hourly
        } else {
            Tier::Daily
        }
    }

    /// Newest timestamps that have aged out of `recent` and `hourly` at `now`,
    /// as consumed by `BlockQueries::retier`.
    pub fn cutoffs(&self, now: i64) -> (i64, i64) {
        (now - self.recent_secs, now - self.hourly_secs)
    }
}

impl Default for TierBounds {
    fn default() -> Self {
        TierBounds::from_config(&SamplingConfig::default())
    }
}
