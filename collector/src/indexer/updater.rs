//! Incremental sync from the last stored height to the current tip

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{BlockQueries, Database, MetaQueries, TxFeeQueries};
use crate::error::{CollectorError, Result};
use crate::indexer::bucket::TierBounds;
use crate::indexer::fetcher::{fetch_block_stats, fetch_headers};
use crate::indexer::hashrate::{self, Seed};
use crate::indexer::build_points;
use crate::models::HeaderPoint;
use crate::rpc::NodeApi;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub tip_height: u64,
    pub previous_height: u64,
    pub last_height: u64,
    pub fetched: usize,
    pub tx_stats: usize,
    pub moved_to_hourly: u64,
    pub moved_to_daily: u64,
}

impl UpdateReport {
    pub fn is_complete(&self) -> bool {
        self.last_height >= self.tip_height
    }
}

pub struct Updater<'a> {
    node: &'a dyn NodeApi,
    db: &'a Database,
    bounds: TierBounds,
    header_concurrency: usize,
    block_concurrency: usize,
}

impl<'a> Updater<'a> {
    pub fn new(node: &'a dyn NodeApi, db: &'a Database, config: &Config) -> Self {
        Self {
            node,
            db,
            bounds: TierBounds::from_config(&config.sampling),
            header_concurrency: config.fetch.update_concurrency,
            block_concurrency: config.fetch.block_concurrency,
        }
    }

    /// Store every block after `last_height` up to the tip and re-tier the
    /// whole series against `now`.
    ///
    /// `last_height` only moves over the contiguous run of fetched heights,
    /// so a height that failed this time is retried on the next run.
    pub async fn run(&self, now: i64) -> Result<UpdateReport> {
        let previous = MetaQueries::last_height(self.db.pool())
            .await?
            .ok_or(CollectorError::NotInitialised)?;

        let tip = self.node.get_tip().await.map_err(|e| CollectorError::TipUnavailable {
            url: self.node.endpoint().to_string(),
            reason: e.to_string(),
        })?;

        let mut report = UpdateReport {
            tip_height: tip.height,
            previous_height: previous,
            last_height: previous,
            ..Default::default()
        };

        if tip.height <= previous {
            info!("Already up to date at height {}", previous);
            let (hourly, daily) = self.retier(now).await?;
            report.moved_to_hourly = hourly;
            report.moved_to_daily = daily;

            let mut tx = self.db.pool().begin().await?;
            MetaQueries::set(&mut tx, MetaQueries::LAST_UPDATED, now).await?;
            tx.commit().await?;
            return Ok(report);
        }

        let heights: Vec<u64> = (previous + 1..=tip.height).collect();
        info!("Syncing {} new blocks ({} -> {})", heights.len(), previous + 1, tip.height);

        let headers = fetch_headers(self.node, &heights, self.header_concurrency).await;
        report.fetched = headers.len();

        let seed = BlockQueries::get(self.db.pool(), previous).await?.map(|p| Seed::from(&p));
        if seed.is_none() {
            warn!("No stored point at height {}; hashrate restarts from zero", previous);
        }
        let anomalies = hashrate::anomalies(seed, &headers);
        if anomalies > 0 {
            warn!("{} new blocks with non-advancing time or difficulty; hashrate carried forward", anomalies);
        }
        let points = build_points(seed, &headers, &self.bounds, now);

        let (recent_cutoff, hourly_cutoff) = self.bounds.cutoffs(now);
        let mut tx = self.db.pool().begin().await?;
        BlockQueries::upsert(&mut tx, &points).await?;
        let (hourly, daily) = BlockQueries::retier(&mut tx, recent_cutoff, hourly_cutoff).await?;
        tx.commit().await?;
        report.moved_to_hourly = hourly;
        report.moved_to_daily = daily;
        debug!("Re-tiered {} rows to hourly, {} to daily", hourly, daily);

        let advanced = contiguous_end(previous, &headers);
        if advanced > previous {
            let mut tx = self.db.pool().begin().await?;
            MetaQueries::set(&mut tx, MetaQueries::LAST_HEIGHT, advanced).await?;
            MetaQueries::set(&mut tx, MetaQueries::LAST_UPDATED, now).await?;
            tx.commit().await?;
            report.last_height = advanced;
        }
        if advanced < tip.height {
            warn!(
                "Fetched {}/{} blocks; last_height held at {} (tip {})",
                headers.len(),
                heights.len(),
                advanced,
                tip.height
            );
        }

        let stats = fetch_block_stats(self.node, &heights, self.block_concurrency).await;
        let mut tx = self.db.pool().begin().await?;
        TxFeeQueries::upsert(&mut tx, &stats).await?;
        tx.commit().await?;
        report.tx_stats = stats.len();

        info!("Stored {} block points, {} tx/fee rows", points.len(), stats.len());
        Ok(report)
    }

    async fn retier(&self, now: i64) -> Result<(u64, u64)> {
        let (recent_cutoff, hourly_cutoff) = self.bounds.cutoffs(now);
        let mut tx = self.db.pool().begin().await?;
        let moved = BlockQueries::retier(&mut tx, recent_cutoff, hourly_cutoff).await?;
        tx.commit().await?;
        Ok(moved)
    }
}

/// Highest height `h` such that every height in `previous+1..=h` was fetched.
fn contiguous_end(previous: u64, headers: &[HeaderPoint]) -> u64 {
    let mut end = previous;
    for header in headers {
        if header.height == end + 1 {
            end = header.height;
        } else if header.height > end + 1 {
            break;
        }
    }
    end
}
