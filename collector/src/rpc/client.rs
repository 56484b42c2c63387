//! JSON-RPC client for a Grin node

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::Url;

use crate::config::{FetchConfig, NodeConfig};
use crate::error::{CollectorError, Result};
use crate::models::{HeaderPoint, Tip, TxFeePoint};
use crate::rpc::api::NodeApi;
use crate::rpc::model::{
    decode, BlockResponse, HeaderResponse, JsonRpcRequest, JsonRpcResponse, PeerResponse, TipResponse,
};

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);
const AUTH_USER: &str = "grin";

/// Which API of the node a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Foreign,
    Owner,
}

pub struct NodeClient {
    http: reqwest::Client,
    foreign_url: String,
    owner_url: String,
    foreign_secret: Option<String>,
    owner_secret: Option<String>,
    max_attempts: u32,
    backoff_step: Duration,
    next_id: AtomicU64,
}

impl NodeClient {
    pub fn new(node: &NodeConfig, fetch: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch.request_timeout())
            .build()?;

        Ok(Self {
            http,
            foreign_url: node.foreign_url.clone(),
            owner_url: node.owner_url.clone(),
            foreign_secret: node.foreign_api_secret.clone().or_else(|| node.api_secret.clone()),
            owner_secret: node.api_secret.clone(),
            max_attempts: fetch.max_attempts.max(1),
            backoff_step: fetch.backoff_step(),
            next_id: AtomicU64::new(1),
        })
    }

    fn target(&self, endpoint: Endpoint) -> (&str, Option<&str>) {
        match endpoint {
            Endpoint::Foreign => (self.foreign_url.as_str(), self.foreign_secret.as_deref()),
            Endpoint::Owner => (self.owner_url.as_str(), self.owner_secret.as_deref()),
        }
    }

    /// Call `method`, retrying transient transport failures with linear backoff.
    pub async fn call(&self, endpoint: Endpoint, method: &str, params: Value) -> Result<Value> {
        let (url, credential) = self.target(endpoint);
        let mut attempt = 1;
        loop {
            match self.call_once(url, credential, method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_step * attempt;
                    warn!(
                        "{} {} attempt {}/{} failed: {}; retrying in {:?}",
                        url, method, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, url: &str, credential: Option<&str>, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.http.post(url).json(&request);
        if let Some(secret) = credential {
            builder = builder.basic_auth(AUTH_USER, Some(secret));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await?;
        let body: JsonRpcResponse = serde_json::from_str(&text)
            .map_err(|e| CollectorError::Decode(format!("{} envelope: {}", method, e)))?;
        body.into_result(method)
    }

    async fn call_as<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let value = self.call(endpoint, method, params).await?;
        decode(method, value)
    }
}

fn by_height(height: u64) -> Value {
    json!({ "height": height, "hash": null, "commit": null })
}

#[async_trait]
impl NodeApi for NodeClient {
    async fn get_tip(&self) -> Result<Tip> {
        let tip: TipResponse = self.call_as(Endpoint::Foreign, "get_tip", json!([])).await?;
        Ok(tip.into())
    }

    async fn get_header(&self, height: u64) -> Result<HeaderPoint> {
        let header: HeaderResponse = self.call_as(Endpoint::Foreign, "get_header", by_height(height)).await?;
        HeaderPoint::try_from(header)
    }

    async fn get_block(&self, height: u64) -> Result<TxFeePoint> {
        let block: BlockResponse = self.call_as(Endpoint::Foreign, "get_block", by_height(height)).await?;
        TxFeePoint::try_from(block)
    }

    async fn get_peers(&self) -> Result<Vec<PeerResponse>> {
        self.call_as(Endpoint::Owner, "get_peers", json!({ "peer_addr": null })).await
    }

    async fn get_connected_peers(&self) -> Result<Vec<PeerResponse>> {
        self.call_as(Endpoint::Foreign, "get_connected_peers", json!([])).await
    }

    fn has_owner_credential(&self) -> bool {
        self.owner_secret.is_some()
    }

    async fn is_listening(&self) -> bool {
        let Some((host, port)) = socket_target(&self.foreign_url) else {
            return false;
        };
        match tokio::time::timeout(LIVENESS_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("{} not reachable: {}", self.foreign_url, e);
                false
            }
            Err(_) => {
                debug!("{} liveness check timed out", self.foreign_url);
                false
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.foreign_url
    }
}

fn socket_target(raw: &str) -> Option<(String, u16)> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.trim_matches(|c| c == '[' || c == ']').to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}
