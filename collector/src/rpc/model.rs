//! Wire types of the Grin node API and their decoding into domain models

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CollectorError, Result};
use crate::models::{HeaderPoint, Tip, TxFeePoint};

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    /// Unwrap the envelope. Grin wraps results as `{"Ok": ..}` / `{"Err": ..}`.
    pub fn into_result(self, method: &str) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(CollectorError::Remote {
                method: method.to_string(),
                message: format!("{} ({})", error.message, error.code),
            });
        }
        match self.result {
            Some(Value::Object(mut map)) => {
                if let Some(err) = map.remove("Err") {
                    return Err(CollectorError::Remote {
                        method: method.to_string(),
                        message: err.to_string(),
                    });
                }
                match map.remove("Ok") {
                    Some(ok) => Ok(ok),
                    None => Ok(Value::Object(map)),
                }
            }
            Some(other) => Ok(other),
            None => Ok(Value::Null),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TipResponse {
    pub height: u64,
    #[serde(default)]
    pub total_difficulty: u64,
}

#[derive(Debug, Deserialize)]
pub struct HeaderResponse {
    pub height: u64,
    pub timestamp: String,
    pub total_difficulty: u64,
}

#[derive(Debug, Deserialize)]
pub struct KernelResponse {
    #[serde(default)]
    pub features: Value,
    #[serde(default)]
    pub fee: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BlockResponse {
    pub header: HeaderResponse,
    #[serde(default)]
    pub kernels: Vec<KernelResponse>,
    #[serde(default)]
    pub outputs: Vec<Value>,
}

/// Peer entry shared by `get_peers` (owner) and `get_connected_peers` (foreign).
#[derive(Debug, Clone, Deserialize)]
pub struct PeerResponse {
    pub addr: String,
    #[serde(default = "unknown_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub flags: Option<Value>,
}

fn unknown_agent() -> String {
    "unknown".to_string()
}

impl PeerResponse {
    pub fn is_banned(&self) -> bool {
        self.flags
            .as_ref()
            .map(|f| f.to_string().contains("Banned"))
            .unwrap_or(false)
    }
}

impl KernelResponse {
    pub fn is_coinbase(&self) -> bool {
        match &self.features {
            Value::String(s) => s == "Coinbase",
            Value::Object(map) => map.contains_key("Coinbase"),
            _ => false,
        }
    }
}

impl From<TipResponse> for Tip {
    fn from(tip: TipResponse) -> Self {
        Tip {
            height: tip.height,
            total_difficulty: tip.total_difficulty,
        }
    }
}

impl TryFrom<HeaderResponse> for HeaderPoint {
    type Error = CollectorError;

    fn try_from(header: HeaderResponse) -> Result<Self> {
        Ok(HeaderPoint {
            height: header.height,
            timestamp: parse_timestamp(&header.timestamp)?,
            total_difficulty: header.total_difficulty,
        })
    }
}

impl TryFrom<BlockResponse> for TxFeePoint {
    type Error = CollectorError;

    fn try_from(block: BlockResponse) -> Result<Self> {
        // Coinbase kernels are issuance, not user transactions
        let (tx_count, fee_total) = block
            .kernels
            .iter()
            .filter(|k| !k.is_coinbase())
            .fold((0u64, 0u64), |(count, fees), k| {
                (count + 1, fees.saturating_add(k.fee.unwrap_or(0)))
            });

        Ok(TxFeePoint {
            height: block.header.height,
            timestamp: parse_timestamp(&block.header.timestamp)?,
            tx_count,
            fee_total,
            output_count: block.outputs.len() as u64,
        })
    }
}

/// Normalize a node timestamp to Unix seconds.
pub fn parse_timestamp(raw: &str) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    // Offset-less form, sub-seconds dropped
    let trimmed = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
        .map_err(|e| CollectorError::Decode(format!("bad timestamp '{}': {}", raw, e)))
}

pub fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| CollectorError::Decode(format!("{} response: {}", method, e)))
}
