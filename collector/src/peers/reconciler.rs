//! Merge discovered peers into the known-peer table

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::database::{Database, MetaQueries, PeerQueries, SnapshotQueries};
use crate::error::Result;
use crate::models::{DiscoveredPeer, KnownPeer, Network};
use crate::peers::geolocator::GeoResolver;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub discovered: usize,
    pub unique: usize,
    pub located: usize,
    pub pruned: u64,
    pub snapshot_agents: usize,
    /// Peers seen within the display horizon, newest first.
    pub displayed: Vec<KnownPeer>,
}

/// Keep the first entry for every (ip, network) pair, preserving order.
pub fn dedup_peers(peers: Vec<DiscoveredPeer>) -> Vec<DiscoveredPeer> {
    let mut seen = HashSet::new();
    peers
        .into_iter()
        .filter(|p| seen.insert((p.ip.clone(), p.network)))
        .collect()
}

/// Mainnet user-agent histogram, sorted by agent.
pub fn version_counts(peers: &[DiscoveredPeer]) -> Vec<(String, i64)> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for peer in peers.iter().filter(|p| p.network == Network::Mainnet) {
        *counts.entry(peer.user_agent.as_str()).or_default() += 1;
    }
    counts.into_iter().map(|(agent, n)| (agent.to_string(), n)).collect()
}

pub struct PeerReconciler<'a> {
    db: &'a Database,
    geo: &'a dyn GeoResolver,
    config: &'a PeerConfig,
}

impl<'a> PeerReconciler<'a> {
    pub fn new(db: &'a Database, geo: &'a dyn GeoResolver, config: &'a PeerConfig) -> Self {
        Self { db, geo, config }
    }

    /// Upsert this run's peers, prune stale rows and record the mainnet
    /// version snapshot, all in one transaction.
    ///
    /// With nothing discovered the store is left untouched.
    pub async fn reconcile(&self, discovered: Vec<DiscoveredPeer>, now: i64) -> Result<ReconcileReport> {
        let mut report = ReconcileReport {
            discovered: discovered.len(),
            ..Default::default()
        };

        if discovered.is_empty() {
            warn!("No peers found from any node; known peers left as they are");
            report.displayed = PeerQueries::seen_since(self.db.pool(), now - self.config.display_secs()).await?;
            return Ok(report);
        }

        let peers = dedup_peers(discovered);
        report.unique = peers.len();
        info!("Total unique peers: {} ({} discovered)", report.unique, report.discovered);

        let mut ips: Vec<String> = peers.iter().map(|p| p.ip.clone()).collect();
        ips.sort();
        ips.dedup();
        let located = self.geo.resolve(&ips).await;
        report.located = located.len();

        let rows: Vec<KnownPeer> = peers
            .iter()
            .map(|peer| {
                let geo = located.get(&peer.ip).cloned().unwrap_or_default();
                KnownPeer {
                    ip: peer.ip.clone(),
                    network: peer.network.as_str().to_string(),
                    port: i64::from(peer.port),
                    user_agent: peer.user_agent.clone(),
                    direction: peer.direction.clone(),
                    lat: geo.lat,
                    lng: geo.lng,
                    country: geo.country,
                    country_code: geo.country_code,
                    city: geo.city,
                    first_seen: now,
                    last_seen: now,
                }
            })
            .collect();
        let versions = version_counts(&peers);

        let mut tx = self.db.pool().begin().await?;
        PeerQueries::upsert(&mut tx, &rows).await?;
        report.pruned = PeerQueries::prune(&mut tx, now - self.config.retention_secs()).await?;
        if !versions.is_empty() && !SnapshotQueries::insert(&mut tx, now, &versions).await? {
            debug!("Version snapshot at {} already recorded", now);
        }
        SnapshotQueries::prune(&mut tx, now - self.config.snapshot_retention_secs()).await?;
        MetaQueries::set(&mut tx, MetaQueries::PEERS_UPDATED, now).await?;
        tx.commit().await?;

        report.snapshot_agents = versions.len();
        if report.pruned > 0 {
            info!("Pruned {} stale peers (>{}d)", report.pruned, self.config.retention_days);
        }

        report.displayed = PeerQueries::seen_since(self.db.pool(), now - self.config.display_secs()).await?;
        info!(
            "Peers displayed: {} (seen within {}d)",
            report.displayed.len(),
            self.config.display_days
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoInfo;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::{tempdir, TempDir};

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    struct FixedGeo;

    #[async_trait]
    impl GeoResolver for FixedGeo {
        async fn resolve(&self, ips: &[String]) -> HashMap<String, GeoInfo> {
            ips.iter()
                .filter(|ip| ip.starts_with("1."))
                .map(|ip| {
                    let info = GeoInfo {
                        lat: 1.5,
                        lng: 2.5,
                        country: "Netherlands".to_string(),
                        country_code: "NL".to_string(),
                        city: "Amsterdam".to_string(),
                    };
                    (ip.clone(), info)
                })
                .collect()
        }
    }

    fn found(ip: &str, network: Network, agent: &str) -> DiscoveredPeer {
        DiscoveredPeer {
            ip: ip.to_string(),
            port: network.default_p2p_port(),
            user_agent: agent.to_string(),
            direction: "Outbound".to_string(),
            network,
        }
    }

    async fn test_db() -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("stats.db")).await.unwrap();
        (dir, db)
    }

    #[test]
    fn dedup_keys_on_ip_and_network() {
        let peers = vec![
            found("1.1.1.1", Network::Mainnet, "a"),
            found("1.1.1.1", Network::Mainnet, "b"),
            found("1.1.1.1", Network::Testnet, "a"),
        ];
        let unique = dedup_peers(peers);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].user_agent, "a");
    }

    #[test]
    fn versions_count_mainnet_only() {
        let peers = vec![
            found("1.1.1.1", Network::Mainnet, "MW/Grin 5.3.3"),
            found("2.2.2.2", Network::Mainnet, "MW/Grin 5.3.3"),
            found("3.3.3.3", Network::Mainnet, "MW/Grin 5.2.0"),
            found("4.4.4.4", Network::Testnet, "MW/Grin 5.4.0-beta"),
        ];
        assert_eq!(
            version_counts(&peers),
            vec![("MW/Grin 5.2.0".to_string(), 1), ("MW/Grin 5.3.3".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn duplicate_sighting_persists_one_row() {
        let (_dir, db) = test_db().await;
        let config = PeerConfig::default();
        let reconciler = PeerReconciler::new(&db, &FixedGeo, &config);

        let report = reconciler
            .reconcile(
                vec![
                    found("1.1.1.1", Network::Mainnet, "a"),
                    found("5.5.5.5", Network::Mainnet, "a"),
                    found("1.1.1.1", Network::Mainnet, "b"),
                ],
                NOW,
            )
            .await
            .unwrap();

        assert_eq!(report.unique, 2);
        assert_eq!(report.located, 1);
        assert_eq!(PeerQueries::count(db.pool()).await.unwrap(), 2);

        let located = PeerQueries::get(db.pool(), "1.1.1.1", "mainnet").await.unwrap().unwrap();
        assert_eq!(located.city, "Amsterdam");
        let unknown = PeerQueries::get(db.pool(), "5.5.5.5", "mainnet").await.unwrap().unwrap();
        assert_eq!((unknown.lat, unknown.country.as_str()), (0.0, ""));
        assert_eq!(MetaQueries::get_i64(db.pool(), MetaQueries::PEERS_UPDATED).await.unwrap(), Some(NOW));
    }

    #[tokio::test]
    async fn first_seen_survives_and_stale_peers_are_pruned() {
        let (_dir, db) = test_db().await;
        let config = PeerConfig::default();
        let reconciler = PeerReconciler::new(&db, &FixedGeo, &config);

        reconciler
            .reconcile(vec![found("1.1.1.1", Network::Mainnet, "a"), found("6.6.6.6", Network::Testnet, "a")], NOW)
            .await
            .unwrap();

        let later = NOW + 31 * DAY;
        let report = reconciler
            .reconcile(vec![found("1.1.1.1", Network::Mainnet, "b")], later)
            .await
            .unwrap();

        assert_eq!(report.pruned, 1);
        let kept = PeerQueries::get(db.pool(), "1.1.1.1", "mainnet").await.unwrap().unwrap();
        assert_eq!((kept.first_seen, kept.last_seen), (NOW, later));
        assert_eq!(kept.user_agent, "b");
        assert!(PeerQueries::get(db.pool(), "6.6.6.6", "testnet").await.unwrap().is_none());
        assert_eq!(report.displayed.len(), 1);
    }

    #[tokio::test]
    async fn display_window_is_shorter_than_retention() {
        let (_dir, db) = test_db().await;
        let config = PeerConfig::default();
        let reconciler = PeerReconciler::new(&db, &FixedGeo, &config);

        reconciler.reconcile(vec![found("1.1.1.1", Network::Mainnet, "a")], NOW).await.unwrap();
        let report = reconciler
            .reconcile(vec![found("2.2.2.2", Network::Mainnet, "a")], NOW + 8 * DAY)
            .await
            .unwrap();

        assert_eq!(report.pruned, 0);
        assert_eq!(PeerQueries::count(db.pool()).await.unwrap(), 2);
        let shown: Vec<&str> = report.displayed.iter().map(|p| p.ip.as_str()).collect();
        assert_eq!(shown, vec!["2.2.2.2"]);
    }

    #[tokio::test]
    async fn empty_discovery_writes_nothing() {
        let (_dir, db) = test_db().await;
        let config = PeerConfig::default();
        let reconciler = PeerReconciler::new(&db, &FixedGeo, &config);

        let report = reconciler.reconcile(Vec::new(), NOW).await.unwrap();
        assert_eq!(report.discovered, 0);
        assert!(SnapshotQueries::latest(db.pool()).await.unwrap().is_none());
        assert_eq!(MetaQueries::get(db.pool(), MetaQueries::PEERS_UPDATED).await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_records_mainnet_agents() {
        let (_dir, db) = test_db().await;
        let config = PeerConfig::default();
        let reconciler = PeerReconciler::new(&db, &FixedGeo, &config);

        reconciler
            .reconcile(
                vec![
                    found("1.1.1.1", Network::Mainnet, "MW/Grin 5.3.3"),
                    found("2.2.2.2", Network::Mainnet, "MW/Grin 5.3.3"),
                    found("3.3.3.3", Network::Testnet, "MW/Grin 5.4.0"),
                ],
                NOW,
            )
            .await
            .unwrap();

        let (sampled_at, rows) = SnapshotQueries::latest(db.pool()).await.unwrap().unwrap();
        assert_eq!(sampled_at, NOW);
        assert_eq!(rows, vec![("MW/Grin 5.3.3".to_string(), 2)]);
    }
}
