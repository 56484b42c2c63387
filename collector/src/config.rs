//! Collector configuration
//!
//! Built once at start-up: defaults, then an optional TOML file, then the
//! `GRIN_*` environment variables, then CLI overrides. Secrets are read from
//! their files into the struct so no component looks anything up later.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{CollectorError, Result};
use crate::models::Network;

pub const SECONDS_PER_HOUR: i64 = 3_600;
pub const SECONDS_PER_DAY: i64 = 86_400;

const MAINNET_API_PORT: u16 = 3413;
const TESTNET_API_PORT: u16 = 13413;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(deserialize_with = "mainnet_section")]
    pub mainnet: NodeConfig,
    #[serde(deserialize_with = "testnet_section")]
    pub testnet: NodeConfig,
    pub sampling: SamplingConfig,
    pub fetch: FetchConfig,
    pub peers: PeerConfig,
    pub geo: GeoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub www_data: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub enabled: bool,
    pub foreign_url: String,
    pub owner_url: String,
    pub api_secret_path: Option<PathBuf>,
    pub foreign_api_secret_path: Option<PathBuf>,
    #[serde(skip)]
    pub api_secret: Option<String>,
    #[serde(skip)]
    pub foreign_api_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Target block interval in seconds.
    pub block_interval_secs: u64,
    pub recent_hours: u64,
    pub hourly_days: u64,
    pub recent_stride: u64,
    pub hourly_stride: u64,
    pub daily_stride: u64,
    /// How many days of full blocks the backfill reads for tx/fee stats.
    pub tx_stats_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub backfill_concurrency: usize,
    pub block_concurrency: usize,
    pub update_concurrency: usize,
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub retention_days: i64,
    pub display_days: i64,
    pub snapshot_retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub url: String,
    pub batch_size: usize,
    pub pace_ms: u64,
}

impl Config {
    /// Load configuration from file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CollectorError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Apply `GRIN_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("GRIN_NODE_URL") {
            self.mainnet.foreign_url = url;
        }
        if let Some(path) = var("GRIN_API_SECRET_PATH") {
            self.mainnet.api_secret_path = Some(PathBuf::from(path));
        }
        if let Some(url) = var("GRIN_MAINNET_OWNER_URL") {
            self.mainnet.owner_url = url;
        }
        if let Some(url) = var("GRIN_TESTNET_OWNER_URL") {
            self.testnet.foreign_url = url.replace("/v2/owner", "/v2/foreign");
            self.testnet.owner_url = url;
        }
        if let Some(path) = var("GRIN_TESTNET_SECRET_PATH") {
            self.testnet.api_secret_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = var("GRIN_WWW_DATA") {
            self.storage.www_data = PathBuf::from(dir);
        }
        if let Some(path) = var("GRIN_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
    }

    /// Override config with CLI arguments
    pub fn apply_cli_overrides(&mut self, args: &crate::cli::Args) {
        if let Some(db_path) = &args.db_path {
            self.storage.db_path = db_path.clone();
        }
        if let Some(www_data) = &args.www_data {
            self.storage.www_data = www_data.clone();
        }
    }

    /// Read every configured secret file once.
    pub fn load_secrets(&mut self) {
        for node in [&mut self.mainnet, &mut self.testnet] {
            node.api_secret = node.api_secret_path.as_deref().and_then(read_secret);
            node.foreign_api_secret = node.foreign_api_secret_path.as_deref().and_then(read_secret);
        }
    }

    pub fn node(&self, network: Network) -> &NodeConfig {
        match network {
            Network::Mainnet => &self.mainnet,
            Network::Testnet => &self.testnet,
        }
    }

    /// Enabled chain instances in a fixed order.
    pub fn networks(&self) -> Vec<Network> {
        [Network::Mainnet, Network::Testnet]
            .into_iter()
            .filter(|n| self.node(*n).enabled)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.sampling;
        if s.block_interval_secs == 0 || s.recent_stride == 0 || s.hourly_stride == 0 || s.daily_stride == 0 {
            return Err(CollectorError::Config("block interval and sampling strides must be positive".into()));
        }
        if s.recent_hours == 0 || s.hourly_days == 0 || s.recent_hours >= s.hourly_days * 24 {
            return Err(CollectorError::Config("recent window must be non-empty and shorter than the hourly window".into()));
        }
        let f = &self.fetch;
        if f.backfill_concurrency == 0 || f.block_concurrency == 0 || f.update_concurrency == 0 {
            return Err(CollectorError::Config("fetch concurrency must be positive".into()));
        }
        if f.max_attempts == 0 {
            return Err(CollectorError::Config("max_attempts must be at least 1".into()));
        }
        let p = &self.peers;
        if p.display_days <= 0 || p.display_days >= p.retention_days {
            return Err(CollectorError::Config("peer display horizon must be positive and shorter than retention".into()));
        }
        if self.geo.batch_size == 0 || self.geo.batch_size > 100 {
            return Err(CollectorError::Config("geo batch size must be within 1..=100".into()));
        }
        Ok(())
    }
}

impl SamplingConfig {
    pub fn blocks_per_hour(&self) -> u64 {
        (SECONDS_PER_HOUR as u64 / self.block_interval_secs).max(1)
    }

    pub fn blocks_per_day(&self) -> u64 {
        (SECONDS_PER_DAY as u64 / self.block_interval_secs).max(1)
    }

    pub fn recent_window_secs(&self) -> i64 {
        self.recent_hours as i64 * SECONDS_PER_HOUR
    }

    pub fn hourly_window_secs(&self) -> i64 {
        self.hourly_days as i64 * SECONDS_PER_DAY
    }
}

impl FetchConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PeerConfig {
    pub fn retention_secs(&self) -> i64 {
        self.retention_days * SECONDS_PER_DAY
    }

    pub fn display_secs(&self) -> i64 {
        self.display_days * SECONDS_PER_DAY
    }

    pub fn snapshot_retention_secs(&self) -> i64 {
        self.snapshot_retention_days * SECONDS_PER_DAY
    }
}

fn read_secret(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let secret = raw.trim().to_string();
            (!secret.is_empty()).then_some(secret)
        }
        Err(e) => {
            warn!("Cannot read API secret {:?}: {}", path, e);
            None
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/grin-stats/stats.db"),
            www_data: PathBuf::from("/var/www/grin-stats/data"),
        }
    }
}

impl NodeConfig {
    fn local(port: u16) -> Self {
        Self {
            enabled: true,
            foreign_url: format!("http://127.0.0.1:{}/v2/foreign", port),
            owner_url: format!("http://127.0.0.1:{}/v2/owner", port),
            api_secret_path: None,
            foreign_api_secret_path: None,
            api_secret: None,
            foreign_api_secret: None,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig::local(MAINNET_API_PORT)
    }
}

/// A `[mainnet]` / `[testnet]` table as written; absent keys keep the
/// network's own defaults.
#[derive(Deserialize)]
struct NodeSection {
    enabled: Option<bool>,
    foreign_url: Option<String>,
    owner_url: Option<String>,
    api_secret_path: Option<PathBuf>,
    foreign_api_secret_path: Option<PathBuf>,
}

impl NodeSection {
    fn over(self, mut base: NodeConfig) -> NodeConfig {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(url) = self.foreign_url {
            base.foreign_url = url;
        }
        if let Some(url) = self.owner_url {
            base.owner_url = url;
        }
        base.api_secret_path = self.api_secret_path.or(base.api_secret_path);
        base.foreign_api_secret_path = self.foreign_api_secret_path.or(base.foreign_api_secret_path);
        base
    }
}

fn mainnet_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NodeConfig, D::Error> {
    NodeSection::deserialize(d).map(|s| s.over(NodeConfig::local(MAINNET_API_PORT)))
}

fn testnet_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<NodeConfig, D::Error> {
    NodeSection::deserialize(d).map(|s| s.over(NodeConfig::local(TESTNET_API_PORT)))
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            block_interval_secs: 60,
            recent_hours: 24,
            hourly_days: 30,
            recent_stride: 1,
            hourly_stride: 60,
            daily_stride: 1440,
            tx_stats_days: 90,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backfill_concurrency: 8,
            block_concurrency: 4,
            update_concurrency: 4,
            max_attempts: 3,
            backoff_step_ms: 1_000,
            request_timeout_secs: 15,
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            display_days: 7,
            snapshot_retention_days: 365,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            url: "http://ip-api.com/batch?fields=status,lat,lon,country,countryCode,city,query".to_string(),
            batch_size: 100,
            pace_ms: 1_500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            mainnet: NodeConfig::local(MAINNET_API_PORT),
            testnet: NodeConfig::local(TESTNET_API_PORT),
            sampling: SamplingConfig::default(),
            fetch: FetchConfig::default(),
            peers: PeerConfig::default(),
            geo: GeoConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.sampling.blocks_per_hour(), 60);
        assert_eq!(config.sampling.blocks_per_day(), 1440);
        assert_eq!(config.networks(), vec![Network::Mainnet, Network::Testnet]);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        fs::write(
            &path,
            r#"
            [peers]
            retention_days = 60
            display_days = 3
            snapshot_retention_days = 365

            [testnet]
            enabled = false
            foreign_url = "http://127.0.0.1:13413/v2/foreign"
            owner_url = "http://127.0.0.1:13413/v2/owner"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.peers.retention_days, 60);
        assert_eq!(config.sampling.daily_stride, 1440);
        assert_eq!(config.networks(), vec![Network::Mainnet]);
    }

    #[test]
    fn node_section_with_one_key_keeps_network_defaults() {
        let config: Config = toml::from_str("[testnet]\nenabled = false\n").unwrap();
        assert_eq!(config.networks(), vec![Network::Mainnet]);
        assert_eq!(config.testnet.foreign_url, "http://127.0.0.1:13413/v2/foreign");
        assert_eq!(config.testnet.owner_url, "http://127.0.0.1:13413/v2/owner");

        let config: Config = toml::from_str("[mainnet]\napi_secret_path = \"/etc/grin/.api_secret\"\n").unwrap();
        assert_eq!(config.mainnet.foreign_url, "http://127.0.0.1:3413/v2/foreign");
        assert_eq!(config.mainnet.api_secret_path, Some(PathBuf::from("/etc/grin/.api_secret")));
        assert!(config.testnet.enabled);
    }

    #[test]
    fn environment_overrides_paths_and_urls() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GRIN_DB_PATH", "/tmp/stats.db"),
            ("GRIN_NODE_URL", "http://10.0.0.2:3413/v2/foreign"),
            ("GRIN_TESTNET_OWNER_URL", "http://10.0.0.3:13413/v2/owner"),
            ("GRIN_WWW_DATA", ""),
        ]);
        let mut config = Config::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/stats.db"));
        assert_eq!(config.mainnet.foreign_url, "http://10.0.0.2:3413/v2/foreign");
        assert_eq!(config.testnet.foreign_url, "http://10.0.0.3:13413/v2/foreign");
        // Empty values are ignored
        assert_eq!(config.storage.www_data, StorageConfig::default().www_data);
    }

    #[test]
    fn secrets_are_trimmed_and_empty_files_mean_none() {
        let dir = tempdir().unwrap();
        let secret = dir.path().join(".api_secret");
        let empty = dir.path().join(".empty_secret");
        fs::write(&secret, "s3cr3t\n").unwrap();
        fs::write(&empty, "  \n").unwrap();

        let mut config = Config::default();
        config.mainnet.api_secret_path = Some(secret);
        config.testnet.api_secret_path = Some(empty);
        config.load_secrets();

        assert_eq!(config.mainnet.api_secret.as_deref(), Some("s3cr3t"));
        assert_eq!(config.testnet.api_secret, None);
    }

    #[test]
    fn display_horizon_must_be_shorter_than_retention() {
        let mut config = Config::default();
        config.peers.display_days = 30;
        assert!(config.validate().is_err());
    }
}
