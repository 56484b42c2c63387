//! Dataset export
//!
//! Every value written, `updated` included, comes from the store, so
//! exporting twice against the same store yields identical files.

pub mod datasets;
pub mod writer;

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{Config, SECONDS_PER_DAY, SECONDS_PER_HOUR};
use crate::database::{to_sql_int, BlockQueries, Database, MetaQueries, PeerQueries, SnapshotQueries, TxFeeQueries, TxMetric};
use crate::error::Result;
use crate::models::{BlockPoint, Tier};
use datasets::{round2, PeersDataset, SeriesDataset, SummaryDataset, TxDataset, VersionsDataset};
pub use writer::write_json;

/// Rows averaged for `avg_block_time`.
const BLOCK_TIME_WINDOW: i64 = 60;

pub struct Exporter<'a> {
    db: &'a Database,
    out_dir: PathBuf,
    recent_secs: i64,
    hourly_secs: i64,
    display_secs: i64,
}

impl<'a> Exporter<'a> {
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self {
            db,
            out_dir: config.storage.www_data.clone(),
            recent_secs: config.sampling.recent_window_secs(),
            hourly_secs: config.sampling.hourly_window_secs(),
            display_secs: config.peers.display_secs(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write every dataset.
    pub async fn export_all(&self) -> Result<()> {
        self.export_blocks().await?;
        self.export_peers().await?;
        info!("JSON exported to {}", self.out_dir.display());
        Ok(())
    }

    /// `hashrate`, `difficulty`, `transactions`, `fees` and `summary`.
    pub async fn export_blocks(&self) -> Result<()> {
        let pool = self.db.pool();
        let updated = MetaQueries::get_i64(pool, MetaQueries::LAST_UPDATED).await?.unwrap_or(0);
        let newest = BlockQueries::latest(pool, BLOCK_TIME_WINDOW).await?;
        let tip = newest.first();

        let mut hashrate = SeriesDataset {
            updated,
            current: round2(tip.map(|p| p.hashrate).unwrap_or(0.0)),
            daily: Vec::new(),
            hourly: Vec::new(),
            recent: Vec::new(),
        };
        let mut difficulty = SeriesDataset {
            updated,
            current: tip.map(|p| to_sql_int("total difficulty", p.total_difficulty)).transpose()?.unwrap_or(0),
            daily: Vec::new(),
            hourly: Vec::new(),
            recent: Vec::new(),
        };
        for tier in Tier::ALL {
            let rates: Vec<(i64, f64)> = BlockQueries::hashrate_series(pool, tier.as_str())
                .await?
                .into_iter()
                .map(|(ts, rate)| (ts, round2(rate)))
                .collect();
            let diffs = BlockQueries::difficulty_series(pool, tier.as_str()).await?;
            match tier {
                Tier::Daily => {
                    hashrate.daily = rates;
                    difficulty.daily = diffs;
                }
                Tier::Hourly => {
                    hashrate.hourly = rates;
                    difficulty.hourly = diffs;
                }
                Tier::Recent => {
                    hashrate.recent = rates;
                    difficulty.recent = diffs;
                }
            }
        }
        writer::write_json(&self.out_dir, "hashrate.json", &hashrate)?;
        writer::write_json(&self.out_dir, "difficulty.json", &difficulty)?;

        let (recent_cutoff, hourly_cutoff) = (updated - self.recent_secs, updated - self.hourly_secs);
        for (metric, name) in [(TxMetric::Transactions, "transactions.json"), (TxMetric::Fees, "fees.json")] {
            let dataset = TxDataset {
                updated,
                daily: TxFeeQueries::bucketed(pool, metric, SECONDS_PER_DAY, None, hourly_cutoff).await?,
                hourly: TxFeeQueries::bucketed(pool, metric, SECONDS_PER_HOUR, Some(hourly_cutoff), recent_cutoff)
                    .await?,
                recent: TxFeeQueries::raw_since(pool, metric, recent_cutoff).await?,
            };
            writer::write_json(&self.out_dir, name, &dataset)?;
        }

        let summary = SummaryDataset {
            updated,
            tip_height: tip.map(|p| p.height).unwrap_or(0),
            avg_block_time: average_block_time(&newest),
            current_hashrate: hashrate.current,
            current_difficulty: difficulty.current,
        };
        writer::write_json(&self.out_dir, "summary.json", &summary)?;
        Ok(())
    }

    /// `versions` and `peers`.
    pub async fn export_peers(&self) -> Result<()> {
        let pool = self.db.pool();
        let updated = MetaQueries::get_i64(pool, MetaQueries::PEERS_UPDATED).await?.unwrap_or(0);

        let versions = match SnapshotQueries::latest(pool).await? {
            Some((_, rows)) => VersionsDataset::from_snapshot(updated, rows),
            None => VersionsDataset::from_snapshot(updated, Vec::new()),
        };
        writer::write_json(&self.out_dir, "versions.json", &versions)?;

        let peers = PeerQueries::seen_since(pool, updated - self.display_secs).await?;
        let dataset = PeersDataset::new(updated, peers);
        info!("Peers written: {} mainnet, {} testnet", dataset.mainnet_count, dataset.testnet_count);
        writer::write_json(&self.out_dir, "peers.json", &dataset)?;
        Ok(())
    }
}

/// Seconds per block over `newest` (height-descending), rounded to 0.1.
/// The span is measured in heights, not rows.
pub fn average_block_time(newest: &[BlockPoint]) -> f64 {
    let (Some(first), Some(last)) = (newest.first(), newest.last()) else {
        return 0.0;
    };
    if first.height <= last.height {
        return 0.0;
    }
    let secs = (first.timestamp - last.timestamp) as f64;
    let blocks = (first.height - last.height) as f64;
    ((secs / blocks) * 10.0).round() / 10.0
}
