//! Sampled history backfill

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::{Config, SamplingConfig};
use crate::database::{BlockQueries, Database, MetaQueries, TxFeeQueries};
use crate::error::{CollectorError, Result};
use crate::indexer::bucket::TierBounds;
use crate::indexer::fetcher::{fetch_block_stats, fetch_headers};
use crate::indexer::{build_points, hashrate};
use crate::rpc::NodeApi;

const PROGRESS_CHUNK: usize = 500;

/// Which heights a backfill reads: every `recent_stride` blocks inside the
/// recent window, every `hourly_stride` inside the hourly window and every
/// `daily_stride` before that, plus the tip itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub recent_blocks: u64,
    pub hourly_blocks: u64,
    pub recent_stride: u64,
    pub hourly_stride: u64,
    pub daily_stride: u64,
}

impl SamplingPlan {
    pub fn from_config(sampling: &SamplingConfig) -> Self {
        Self {
            recent_blocks: sampling.recent_hours * sampling.blocks_per_hour(),
            hourly_blocks: sampling.hourly_days * sampling.blocks_per_day(),
            recent_stride: sampling.recent_stride.max(1),
            hourly_stride: sampling.hourly_stride.max(1),
            daily_stride: sampling.daily_stride.max(1),
        }
    }

    /// Start heights of the recent and hourly ranges for `tip`.
    pub fn range_starts(&self, tip: u64) -> (u64, u64) {
        (tip.saturating_sub(self.recent_blocks), tip.saturating_sub(self.hourly_blocks))
    }

    pub fn heights(&self, tip: u64) -> Vec<u64> {
        let (recent_start, hourly_start) = self.range_starts(tip);
        let mut heights = BTreeSet::new();

        heights.extend((recent_start..=tip).step_by(self.recent_stride as usize));
        heights.extend((hourly_start..recent_start).step_by(self.hourly_stride as usize));
        heights.extend((0..hourly_start).step_by(self.daily_stride as usize));
        heights.insert(tip);

        heights.into_iter().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub tip_height: u64,
    pub sampled: usize,
    pub stored: usize,
    pub last_height: u64,
    pub tx_stats: usize,
}

pub struct Backfill<'a> {
    node: &'a dyn NodeApi,
    db: &'a Database,
    plan: SamplingPlan,
    bounds: TierBounds,
    header_concurrency: usize,
    block_concurrency: usize,
    tx_stats_blocks: u64,
}

impl<'a> Backfill<'a> {
    pub fn new(node: &'a dyn NodeApi, db: &'a Database, config: &Config) -> Self {
        Self {
            node,
            db,
            plan: SamplingPlan::from_config(&config.sampling),
            bounds: TierBounds::from_config(&config.sampling),
            header_concurrency: config.fetch.backfill_concurrency,
            block_concurrency: config.fetch.block_concurrency,
            tx_stats_blocks: config.sampling.tx_stats_days * config.sampling.blocks_per_day(),
        }
    }

    /// Replace the block series with a fresh sampled history, then load
    /// tx/fee statistics for the configured trailing window.
    pub async fn run(&self, now: i64) -> Result<BackfillReport> {
        info!("Fetching chain tip from {}", self.node.endpoint());
        let tip = self.node.get_tip().await.map_err(|e| CollectorError::TipUnavailable {
            url: self.node.endpoint().to_string(),
            reason: e.to_string(),
        })?;
        info!("Chain tip: {}", tip.height);

        let heights = self.plan.heights(tip.height);
        let (recent_start, hourly_start) = self.plan.range_starts(tip.height);
        info!("Sampling {} heights (out of {} blocks)", heights.len(), tip.height + 1);
        info!("  daily  : 0 -> {} (every {} blocks)", hourly_start, self.plan.daily_stride);
        info!("  hourly : {} -> {} (every {} blocks)", hourly_start, recent_start, self.plan.hourly_stride);
        info!("  recent : {} -> {} (every {} blocks)", recent_start, tip.height, self.plan.recent_stride);

        let mut headers = Vec::with_capacity(heights.len());
        let mut done = 0;
        for chunk in heights.chunks(PROGRESS_CHUNK) {
            headers.extend(fetch_headers(self.node, chunk, self.header_concurrency).await);
            done += chunk.len();
            info!("  progress: {}/{} ({}%)", done, heights.len(), done * 100 / heights.len());
        }
        headers.sort_by_key(|h| h.height);

        let anomalies = hashrate::anomalies(None, &headers);
        if anomalies > 0 {
            warn!("{} sampled pairs with non-advancing time or difficulty; hashrate carried forward", anomalies);
        }
        let points = build_points(None, &headers, &self.bounds, now);
        let Some(last_height) = points.last().map(|p| p.height) else {
            return Err(CollectorError::NoHeaders { tip: tip.height });
        };

        let mut tx = self.db.pool().begin().await?;
        let cleared = BlockQueries::reset(&mut tx).await?;
        BlockQueries::upsert(&mut tx, &points).await?;
        tx.commit().await?;
        info!("Stored {} block points (replaced {})", points.len(), cleared);

        let mut tx = self.db.pool().begin().await?;
        MetaQueries::set(&mut tx, MetaQueries::LAST_HEIGHT, last_height).await?;
        MetaQueries::set(&mut tx, MetaQueries::LAST_UPDATED, now).await?;
        tx.commit().await?;
        if last_height < tip.height {
            warn!("Tip header {} unavailable; resuming from {}", tip.height, last_height);
        }

        let tx_stats = self.backfill_tx_stats(tip.height).await?;

        Ok(BackfillReport {
            tip_height: tip.height,
            sampled: heights.len(),
            stored: points.len(),
            last_height,
            tx_stats,
        })
    }

    async fn backfill_tx_stats(&self, tip: u64) -> Result<usize> {
        let start = tip.saturating_sub(self.tx_stats_blocks);
        let heights: Vec<u64> = (start..=tip).collect();
        info!("Fetching tx/fee stats for {} blocks ({} -> {})", heights.len(), start, tip);

        let mut stats = Vec::with_capacity(heights.len());
        let mut done = 0;
        for chunk in heights.chunks(PROGRESS_CHUNK) {
            stats.extend(fetch_block_stats(self.node, chunk, self.block_concurrency).await);
            done += chunk.len();
            if done % (PROGRESS_CHUNK * 20) == 0 || done == heights.len() {
                info!("  block stats: {}/{}", done, heights.len());
            }
        }

        let mut tx = self.db.pool().begin().await?;
        TxFeeQueries::upsert(&mut tx, &stats).await?;
        tx.commit().await?;
        Ok(stats.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;
    use crate::test_support::FakeChain;
    use tempfile::{tempdir, TempDir};

    const GENESIS: i64 = 1_600_000_000;

    fn plan() -> SamplingPlan {
        SamplingPlan::from_config(&SamplingConfig::default())
    }

    async fn test_db() -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("stats.db")).await.unwrap();
        (dir, db)
    }

    #[test]
    fn short_chain_samples_every_height() {
        let heights = plan().heights(100);
        assert_eq!(heights, (0..=100).collect::<Vec<u64>>());
    }

    #[test]
    fn long_chain_uses_three_disjoint_strides() {
        let tip = 100_000;
        let heights = plan().heights(tip);
        let (recent_start, hourly_start) = plan().range_starts(tip);
        assert_eq!((recent_start, hourly_start), (98_560, 56_800));

        let daily = heights.iter().filter(|h| **h < hourly_start).count();
        let hourly = heights.iter().filter(|h| **h >= hourly_start && **h < recent_start).count();
        let recent = heights.iter().filter(|h| **h >= recent_start).count();

        assert_eq!(daily, 40); // 0, 1440, ..., 56160
        assert_eq!(hourly, 696); // (98560 - 56800) / 60
        assert_eq!(recent, 1441);
        assert_eq!(heights.last(), Some(&tip));
    }

    #[test]
    fn tip_is_included_when_off_stride() {
        let sparse = SamplingPlan { recent_blocks: 0, hourly_blocks: 0, recent_stride: 1, hourly_stride: 60, daily_stride: 1440 };
        let heights = sparse.heights(3_000);
        assert_eq!(heights, vec![0, 1440, 2880, 3000]);
    }

    #[tokio::test]
    async fn backfill_short_chain() {
        let (_dir, db) = test_db().await;
        let chain = FakeChain::new(100, GENESIS);
        let now = chain.timestamp_of(100) + 60;

        let mut config = Config::default();
        config.sampling.tx_stats_days = 1;
        let report = Backfill::new(&chain, &db, &config).run(now).await.unwrap();

        assert_eq!(report.tip_height, 100);
        assert_eq!(report.sampled, 101);
        assert_eq!(report.stored, 101);
        assert_eq!(report.last_height, 100);
        assert_eq!(report.tx_stats, 101);

        let genesis = BlockQueries::get(db.pool(), 0).await.unwrap().unwrap();
        assert_eq!(genesis.hashrate, 0.0);
        let latest = BlockQueries::get(db.pool(), 100).await.unwrap().unwrap();
        assert!((latest.hashrate - 1000.0 / 60.0).abs() < 1e-9);
        assert_eq!(latest.tier, Tier::Recent);
        assert_eq!(MetaQueries::last_height(db.pool()).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn failed_heights_only_thin_the_series() {
        let (_dir, db) = test_db().await;
        let chain = FakeChain::new(50, GENESIS);
        chain.fail_at([10, 11, 12]);

        let report = Backfill::new(&chain, &db, &Config::default())
            .run(chain.timestamp_of(50))
            .await
            .unwrap();

        assert_eq!(report.stored, 48);
        assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 48);
        assert!(BlockQueries::get(db.pool(), 11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_tip_aborts_without_writes() {
        let (_dir, db) = test_db().await;
        let mut chain = FakeChain::new(50, GENESIS);
        chain.reachable = false;

        let err = Backfill::new(&chain, &db, &Config::default()).run(GENESIS).await.unwrap_err();
        assert!(matches!(err, CollectorError::TipUnavailable { .. }));
        assert_eq!(chain.fetch_calls(), 0);
        assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 0);
        assert_eq!(MetaQueries::last_height(db.pool()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rerun_with_no_headers_keeps_stored_history() {
        let (_dir, db) = test_db().await;
        let chain = FakeChain::new(50, GENESIS);
        let config = Config::default();
        Backfill::new(&chain, &db, &config).run(chain.timestamp_of(50)).await.unwrap();
        let before = BlockQueries::latest(db.pool(), 100).await.unwrap();

        chain.fail_at(0..=50);
        let err = Backfill::new(&chain, &db, &config).run(chain.timestamp_of(50)).await.unwrap_err();
        assert!(matches!(err, CollectorError::NoHeaders { tip: 50 }));

        assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 51);
        assert_eq!(BlockQueries::latest(db.pool(), 100).await.unwrap(), before);
        assert_eq!(MetaQueries::last_height(db.pool()).await.unwrap(), Some(50));
        assert!(BlockQueries::get(db.pool(), 50).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rerun_replaces_previous_history() {
        let (_dir, db) = test_db().await;
        let chain = FakeChain::new(30, GENESIS);
        let config = Config::default();
        Backfill::new(&chain, &db, &config).run(chain.timestamp_of(30)).await.unwrap();

        chain.set_tip(20);
        Backfill::new(&chain, &db, &config).run(chain.timestamp_of(20)).await.unwrap();
        assert_eq!(BlockQueries::count(db.pool()).await.unwrap(), 21);
        assert_eq!(MetaQueries::last_height(db.pool()).await.unwrap(), Some(20));
    }
}
