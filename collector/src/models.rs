//! Data models for the collector

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CollectorError;

/// Resolution tier of a stored block point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Recent,
    Hourly,
    Daily,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Daily, Tier::Hourly, Tier::Recent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Recent => "recent",
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" => Ok(Tier::Recent),
            "hourly" => Ok(Tier::Hourly),
            "daily" => Ok(Tier::Daily),
            other => Err(CollectorError::Decode(format!("unknown tier '{}'", other))),
        }
    }
}

/// One of the (at most two) chain instances the collector watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    pub fn default_p2p_port(&self) -> u16 {
        match self {
            Network::Mainnet => 3414,
            Network::Testnet => 13414,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current chain tip as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub height: u64,
    pub total_difficulty: u64,
}

/// Lightweight header fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPoint {
    pub height: u64,
    pub timestamp: i64,
    pub total_difficulty: u64,
}

/// A stored per-height block metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPoint {
    pub height: u64,
    pub timestamp: i64,
    pub total_difficulty: u64,
    pub hashrate: f64,
    pub tier: Tier,
}

/// Per-height transaction and fee statistics decoded from a full block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFeePoint {
    pub height: u64,
    pub timestamp: i64,
    pub tx_count: u64,
    pub fee_total: u64,
    pub output_count: u64,
}

/// A peer as reported by one network instance, before geolocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub ip: String,
    pub port: u16,
    pub user_agent: String,
    pub direction: String,
    pub network: Network,
}

/// Geographic metadata for one IP address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInfo {
    pub lat: f64,
    pub lng: f64,
    pub country: String,
    pub country_code: String,
    pub city: String,
}

/// A row of the durable known-peer table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnownPeer {
    pub ip: String,
    pub network: String,
    pub port: i64,
    pub user_agent: String,
    pub direction: String,
    pub lat: f64,
    pub lng: f64,
    pub country: String,
    pub country_code: String,
    pub city: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// One row of a point-in-time version histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PeerSnapshotCount {
    pub sampled_at: i64,
    pub user_agent: String,
    pub count: i64,
}
