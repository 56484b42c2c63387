//! Hashrate estimation from cumulative difficulty deltas

use crate::models::{BlockPoint, HeaderPoint};

/// Last persisted point an incremental run continues from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub timestamp: i64,
    pub total_difficulty: u64,
    pub hashrate: f64,
}

impl From<&BlockPoint> for Seed {
    fn from(point: &BlockPoint) -> Self {
        Seed {
            timestamp: point.timestamp,
            total_difficulty: point.total_difficulty,
            hashrate: point.hashrate,
        }
    }
}

/// Derive one hashrate value per header (graphs per second).
///
/// `headers` must be height-ascending. Each value is
/// `difficulty delta / time delta` against the preceding point when both
/// deltas are strictly positive, otherwise the preceding value is carried
/// forward. Without a seed the first value is 0.
pub fn estimate(seed: Option<Seed>, headers: &[HeaderPoint]) -> Vec<f64> {
    let mut out = Vec::with_capacity(headers.len());
    let mut prev: Option<(i64, u64, f64)> = seed.map(|s| (s.timestamp, s.total_difficulty, s.hashrate));

    for header in headers {
        let value = match prev {
            None => 0.0,
            Some((prev_ts, prev_diff, prev_rate)) => {
                let dt = header.timestamp - prev_ts;
                let dd = header.total_difficulty as i128 - prev_diff as i128;
                if dt > 0 && dd > 0 {
                    dd as f64 / dt as f64
                } else {
                    prev_rate
                }
            }
        };
        out.push(value);
        prev = Some((header.timestamp, header.total_difficulty, value));
    }
    out
}

/// Count of consecutive pairs whose time or difficulty did not advance.
pub fn anomalies(seed: Option<Seed>, headers: &[HeaderPoint]) -> usize {
    let mut prev = seed.map(|s| (s.timestamp, s.total_difficulty));
    let mut count = 0;
    for header in headers {
        if let Some((ts, diff)) = prev {
            if header.timestamp <= ts || header.total_difficulty <= diff {
                count += 1;
            }
        }
        prev = Some((header.timestamp, header.total_difficulty));
    }
    count
}
