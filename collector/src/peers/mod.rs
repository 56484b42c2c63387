//! Peer discovery, geolocation and the known-peer table

pub mod discovery;
pub mod geolocator;
pub mod reconciler;

pub use discovery::{discover, Strategy};
pub use geolocator::{GeoResolver, IpApiGeolocator};
pub use reconciler::{dedup_peers, PeerReconciler, ReconcileReport};

use crate::models::{DiscoveredPeer, Network};
use crate::rpc::NodeApi;

/// Discover peers on every given network instance, one after another.
pub async fn discover_all(nodes: &[(Network, &dyn NodeApi)]) -> Vec<DiscoveredPeer> {
    let mut peers = Vec::new();
    for (network, node) in nodes {
        peers.extend(discover(*node, *network).await);
    }
    peers
}
