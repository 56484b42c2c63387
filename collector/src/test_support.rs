//! In-memory node used by unit tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{CollectorError, Result};
use crate::models::{HeaderPoint, Tip, TxFeePoint};
use crate::rpc::model::PeerResponse;
use crate::rpc::NodeApi;

/// A chain of `tip + 1` blocks, one per minute, difficulty growing 1000 per block.
pub struct FakeChain {
    pub tip: Mutex<u64>,
    pub genesis_ts: i64,
    pub failing: Mutex<HashSet<u64>>,
    pub reachable: bool,
    pub credential: bool,
    pub known_peers: Option<Vec<PeerResponse>>,
    pub connected_peers: Option<Vec<PeerResponse>>,
    pub tip_calls: AtomicUsize,
    pub header_calls: AtomicUsize,
    pub block_calls: AtomicUsize,
    pub peer_calls: AtomicUsize,
    pub connected_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new(tip: u64, genesis_ts: i64) -> Self {
        Self {
            tip: Mutex::new(tip),
            genesis_ts,
            failing: Mutex::new(HashSet::new()),
            reachable: true,
            credential: false,
            known_peers: None,
            connected_peers: None,
            tip_calls: AtomicUsize::new(0),
            header_calls: AtomicUsize::new(0),
            block_calls: AtomicUsize::new(0),
            peer_calls: AtomicUsize::new(0),
            connected_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        *self.tip.lock().unwrap() = tip;
    }

    pub fn fail_at(&self, heights: impl IntoIterator<Item = u64>) {
        self.failing.lock().unwrap().extend(heights);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn timestamp_of(&self, height: u64) -> i64 {
        self.genesis_ts + height as i64 * 60
    }

    pub fn fetch_calls(&self) -> usize {
        self.header_calls.load(Ordering::SeqCst) + self.block_calls.load(Ordering::SeqCst)
    }

    fn check(&self, height: u64) -> Result<()> {
        if height > *self.tip.lock().unwrap() || self.failing.lock().unwrap().contains(&height) {
            return Err(CollectorError::Remote {
                method: "get_header".to_string(),
                message: format!("NotFound({})", height),
            });
        }
        Ok(())
    }
}

pub fn peer(addr: &str, user_agent: &str, flags: Option<&str>) -> PeerResponse {
    PeerResponse {
        addr: addr.to_string(),
        user_agent: user_agent.to_string(),
        direction: Some("Outbound".to_string()),
        flags: flags.map(|f| serde_json::Value::String(f.to_string())),
    }
}

#[async_trait]
impl NodeApi for FakeChain {
    async fn get_tip(&self) -> Result<Tip> {
        self.tip_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(CollectorError::Http { status: 502, url: "fake".to_string() });
        }
        let height = *self.tip.lock().unwrap();
        Ok(Tip { height, total_difficulty: height * 1000 })
    }

    async fn get_header(&self, height: u64) -> Result<HeaderPoint> {
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        self.check(height)?;
        Ok(HeaderPoint {
            height,
            timestamp: self.timestamp_of(height),
            total_difficulty: height * 1000,
        })
    }

    async fn get_block(&self, height: u64) -> Result<TxFeePoint> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.check(height)?;
        Ok(TxFeePoint {
            height,
            timestamp: self.timestamp_of(height),
            tx_count: height % 3,
            fee_total: (height % 3) * 1_000_000,
            output_count: height % 3 + 1,
        })
    }

    async fn get_peers(&self) -> Result<Vec<PeerResponse>> {
        self.peer_calls.fetch_add(1, Ordering::SeqCst);
        self.known_peers.clone().ok_or_else(|| CollectorError::Http { status: 401, url: "owner".to_string() })
    }

    async fn get_connected_peers(&self) -> Result<Vec<PeerResponse>> {
        self.connected_calls.fetch_add(1, Ordering::SeqCst);
        self.connected_peers
            .clone()
            .ok_or_else(|| CollectorError::Http { status: 502, url: "foreign".to_string() })
    }

    fn has_owner_credential(&self) -> bool {
        self.credential
    }

    async fn is_listening(&self) -> bool {
        self.reachable
    }

    fn endpoint(&self) -> &str {
        "fake://node"
    }
}
