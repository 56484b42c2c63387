//! Published JSON documents

use serde::Serialize;

use crate::models::KnownPeer;

/// `hashrate.json` / `difficulty.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesDataset<V> {
    pub updated: i64,
    pub current: V,
    pub daily: Vec<(i64, V)>,
    pub hourly: Vec<(i64, V)>,
    pub recent: Vec<(i64, V)>,
}

/// `transactions.json` / `fees.json`. Hourly and daily entries are sums
/// over their bucket; recent entries are per block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxDataset {
    pub updated: i64,
    pub daily: Vec<(i64, i64)>,
    pub hourly: Vec<(i64, i64)>,
    pub recent: Vec<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionCount {
    pub label: String,
    pub count: i64,
}

/// `versions.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionsDataset {
    pub updated: i64,
    pub sampled_from: i64,
    pub versions: Vec<VersionCount>,
}

/// `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDataset {
    pub updated: i64,
    pub tip_height: u64,
    pub avg_block_time: f64,
    pub current_hashrate: f64,
    pub current_difficulty: i64,
}

/// `peers.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeersDataset {
    pub updated: i64,
    pub count: usize,
    pub mainnet_count: usize,
    pub testnet_count: usize,
    pub peers: Vec<KnownPeer>,
}

pub const TOP_VERSIONS: usize = 5;
pub const OTHER_LABEL: &str = "Other";

impl VersionsDataset {
    /// Keep the `TOP_VERSIONS` largest agents and fold the rest into "Other".
    /// `rows` must already be ordered by count, largest first.
    pub fn from_snapshot(updated: i64, rows: Vec<(String, i64)>) -> Self {
        let sampled_from: i64 = rows.iter().map(|(_, n)| n).sum();
        let other: i64 = rows.iter().skip(TOP_VERSIONS).map(|(_, n)| n).sum();

        let mut versions: Vec<VersionCount> = rows
            .into_iter()
            .take(TOP_VERSIONS)
            .map(|(label, count)| VersionCount { label, count })
            .collect();
        if other > 0 {
            versions.push(VersionCount {
                label: OTHER_LABEL.to_string(),
                count: other,
            });
        }

        Self {
            updated,
            sampled_from,
            versions,
        }
    }
}

impl PeersDataset {
    pub fn new(updated: i64, peers: Vec<KnownPeer>) -> Self {
        let mainnet_count = peers.iter().filter(|p| p.network == "mainnet").count();
        let testnet_count = peers.iter().filter(|p| p.network == "testnet").count();
        Self {
            updated,
            count: peers.len(),
            mainnet_count,
            testnet_count,
            peers,
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_versions_fold_into_other() {
        let rows: Vec<(String, i64)> = [("a", 40), ("b", 30), ("c", 10), ("d", 5), ("e", 4), ("f", 3), ("g", 1)]
            .into_iter()
            .map(|(l, n)| (l.to_string(), n))
            .collect();
        let dataset = VersionsDataset::from_snapshot(9, rows);

        assert_eq!(dataset.sampled_from, 93);
        assert_eq!(dataset.versions.len(), 6);
        assert_eq!(dataset.versions[5], VersionCount { label: "Other".to_string(), count: 4 });
    }

    #[test]
    fn no_other_bucket_when_few_versions() {
        let dataset = VersionsDataset::from_snapshot(0, vec![("MW/Grin 5.3.3".to_string(), 12)]);
        assert_eq!(dataset.versions.len(), 1);
        assert_eq!(dataset.sampled_from, 12);
    }

    #[test]
    fn series_serialises_pairs_as_arrays() {
        let dataset = SeriesDataset {
            updated: 5,
            current: 2.5,
            daily: vec![(1, 1.25)],
            hourly: Vec::new(),
            recent: vec![(2, 2.5)],
        };
        let json = serde_json::to_string(&dataset).unwrap();
        assert_eq!(json, r#"{"updated":5,"current":2.5,"daily":[[1,1.25]],"hourly":[],"recent":[[2,2.5]]}"#);
    }

    #[test]
    fn rounding_to_two_places() {
        assert_eq!(round2(16.666666), 16.67);
        assert_eq!(round2(0.0), 0.0);
    }
}
