//! Operational entry points shared by the CLI and the pipeline tests

use chrono::Utc;
use tracing::{error, info, warn};

use crate::cli::Command;
use crate::config::Config;
use crate::database::Database;
use crate::error::Result;
use crate::export::Exporter;
use crate::indexer::{Backfill, Updater};
use crate::models::Network;
use crate::peers::{self, GeoResolver, IpApiGeolocator, PeerReconciler};
use crate::rpc::{NodeApi, NodeClient};

pub struct Collector {
    config: Config,
    db: Database,
    /// Node the block series is read from.
    chain: Box<dyn NodeApi>,
    /// Nodes queried for peers, one per enabled network.
    peer_nodes: Vec<(Network, Box<dyn NodeApi>)>,
    geo: Box<dyn GeoResolver>,
}

impl Collector {
    /// Open the store and build node clients from `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let db = Database::open(&config.storage.db_path).await?;
        info!("Database ready at {:?}", config.storage.db_path);

        let chain: Box<dyn NodeApi> = Box::new(NodeClient::new(&config.mainnet, &config.fetch)?);
        let mut peer_nodes: Vec<(Network, Box<dyn NodeApi>)> = Vec::new();
        for network in config.networks() {
            let client = NodeClient::new(config.node(network), &config.fetch)?;
            peer_nodes.push((network, Box::new(client)));
        }
        let geo = Box::new(IpApiGeolocator::new(&config.geo, &config.fetch)?);

        Ok(Self::with_parts(config, db, chain, peer_nodes, geo))
    }

    pub fn with_parts(
        config: Config,
        db: Database,
        chain: Box<dyn NodeApi>,
        peer_nodes: Vec<(Network, Box<dyn NodeApi>)>,
        geo: Box<dyn GeoResolver>,
    ) -> Self {
        Self {
            config,
            db,
            chain,
            peer_nodes,
            geo,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        let now = Utc::now().timestamp();
        match command {
            Command::InitDb => Ok(()),
            Command::InitHistory => self.init_history(now).await,
            Command::Update => self.update(now).await,
            Command::PeersOnly => self.peers_only(now).await,
        }
    }

    /// Full backfill, then peers, then export. A missing tip aborts before
    /// anything is written.
    pub async fn init_history(&self, now: i64) -> Result<()> {
        info!("=== Grin stats: full history backfill ===");
        let report = Backfill::new(self.chain.as_ref(), &self.db, &self.config).run(now).await?;
        info!(
            "Backfill complete: {} of {} sampled heights stored, {} tx/fee rows",
            report.stored, report.sampled, report.tx_stats
        );

        self.refresh_peers(now).await;
        Exporter::new(&self.db, &self.config).export_all().await
    }

    /// Incremental update, then peers, then export.
    ///
    /// A block-phase failure still lets peers and export run; the failure is
    /// returned afterwards.
    pub async fn update(&self, now: i64) -> Result<()> {
        info!("=== Grin stats: incremental update ===");
        let blocks = Updater::new(self.chain.as_ref(), &self.db, &self.config).run(now).await;
        match &blocks {
            Ok(report) if report.fetched == 0 && report.tip_height <= report.previous_height => {
                info!("No new blocks (tip {})", report.tip_height)
            }
            Ok(report) => info!(
                "Update complete: height {} -> {} (tip {})",
                report.previous_height, report.last_height, report.tip_height
            ),
            Err(e) => error!("Block update failed: {}", e),
        }

        self.refresh_peers(now).await;
        Exporter::new(&self.db, &self.config).export_all().await?;
        blocks.map(|_| ())
    }

    pub async fn peers_only(&self, now: i64) -> Result<()> {
        info!("=== Grin stats: peer refresh ===");
        self.refresh_peers(now).await;
        Exporter::new(&self.db, &self.config).export_all().await
    }

    /// Discover and reconcile peers. Failures here never fail the run.
    async fn refresh_peers(&self, now: i64) {
        let nodes: Vec<(Network, &dyn NodeApi)> = self
            .peer_nodes
            .iter()
            .map(|(network, node)| (*network, node.as_ref()))
            .collect();
        let discovered = peers::discover_all(&nodes).await;

        let reconciler = PeerReconciler::new(&self.db, self.geo.as_ref(), &self.config.peers);
        if let Err(e) = reconciler.reconcile(discovered, now).await {
            warn!("Peer reconciliation failed: {}", e);
        }
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}

/// Create the schema and nothing else.
pub async fn init_db(config: &Config) -> Result<()> {
    let db = Database::open(&config.storage.db_path).await?;
    db.close().await;
    info!("Database initialised: {:?}", config.storage.db_path);
    Ok(())
}
