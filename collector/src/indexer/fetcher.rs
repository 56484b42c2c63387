//! Concurrent header / full-block fetching with per-height failure isolation

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::models::{HeaderPoint, TxFeePoint};
use crate::rpc::NodeApi;

/// Fetch headers for `heights`, at most `concurrency` in flight.
///
/// Failed heights are logged and left out. The result is sorted by height.
pub async fn fetch_headers(node: &dyn NodeApi, heights: &[u64], concurrency: usize) -> Vec<HeaderPoint> {
    let mut headers: Vec<HeaderPoint> = stream::iter(heights.iter().copied())
        .map(|height| async move {
            match node.get_header(height).await {
                Ok(header) => Some(header),
                Err(e) => {
                    warn!("header {}: {}", height, e);
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|header| async move { header })
        .collect()
        .await;

    headers.sort_by_key(|h| h.height);
    headers.dedup_by_key(|h| h.height);
    debug!("fetched {}/{} headers", headers.len(), heights.len());
    headers
}

/// Fetch full blocks and reduce them to tx/fee statistics.
pub async fn fetch_block_stats(node: &dyn NodeApi, heights: &[u64], concurrency: usize) -> Vec<TxFeePoint> {
    let mut stats: Vec<TxFeePoint> = stream::iter(heights.iter().copied())
        .map(|height| async move {
            match node.get_block(height).await {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!("block {}: {}", height, e);
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|point| async move { point })
        .collect()
        .await;

    stats.sort_by_key(|p| p.height);
    stats.dedup_by_key(|p| p.height);
    debug!("fetched {}/{} blocks", stats.len(), heights.len());
    stats
}
