//! Block ingestion: sampling, fetching, hashrate and tiering

pub mod backfill;
pub mod bucket;
pub mod fetcher;
pub mod hashrate;
pub mod updater;

pub use backfill::{Backfill, BackfillReport, SamplingPlan};
pub use bucket::TierBounds;
pub use updater::{UpdateReport, Updater};

use crate::models::{BlockPoint, HeaderPoint};
use hashrate::Seed;

/// Turn height-ascending headers into stored block points.
pub fn build_points(seed: Option<Seed>, headers: &[HeaderPoint], bounds: &TierBounds, now: i64) -> Vec<BlockPoint> {
    hashrate::estimate(seed, headers)
        .into_iter()
        .zip(headers)
        .map(|(hashrate, header)| BlockPoint {
            height: header.height,
            timestamp: header.timestamp,
            total_difficulty: header.total_difficulty,
            hashrate,
            tier: bounds.classify(header.timestamp, now),
        })
        .collect()
}
