//! Node API trait definitions

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{HeaderPoint, Tip, TxFeePoint};
use crate::rpc::model::PeerResponse;

/// The subset of a Grin node's JSON-RPC surface the collector consumes.
#[async_trait]
pub trait NodeApi: Send + Sync {
    // Chain methods (foreign API)
    async fn get_tip(&self) -> Result<Tip>;
    async fn get_header(&self, height: u64) -> Result<HeaderPoint>;
    async fn get_block(&self, height: u64) -> Result<TxFeePoint>;

    // Peer methods
    /// All known peers; privileged (owner API).
    async fn get_peers(&self) -> Result<Vec<PeerResponse>>;
    /// Currently connected peers; unprivileged (foreign API).
    async fn get_connected_peers(&self) -> Result<Vec<PeerResponse>>;

    /// Whether a credential for privileged calls was configured.
    fn has_owner_credential(&self) -> bool;

    /// Cheap liveness check run before peer discovery.
    async fn is_listening(&self) -> bool;

    /// Endpoint label for log lines.
    fn endpoint(&self) -> &str;
}
