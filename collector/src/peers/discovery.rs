//! Peer discovery against one network's node

use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info, warn};

use crate::models::{DiscoveredPeer, Network};
use crate::rpc::model::PeerResponse;
use crate::rpc::NodeApi;

/// Ways of asking a node for its peers, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `get_peers` on the owner API: every peer the node knows about.
    AllKnown,
    /// `get_connected_peers` on the foreign API: live connections only.
    Connected,
}

/// Outcome of one strategy.
#[derive(Debug)]
pub enum Attempt {
    Found(Vec<PeerResponse>),
    Unavailable(String),
}

impl Strategy {
    /// Strategies worth trying against `node`. Without an owner credential
    /// the privileged query is not attempted at all.
    pub fn plan(node: &dyn NodeApi) -> Vec<Strategy> {
        if node.has_owner_credential() {
            vec![Strategy::AllKnown, Strategy::Connected]
        } else {
            vec![Strategy::Connected]
        }
    }

    pub async fn attempt(&self, node: &dyn NodeApi) -> Attempt {
        let result = match self {
            Strategy::AllKnown => node.get_peers().await,
            Strategy::Connected => node.get_connected_peers().await,
        };
        match result {
            Ok(peers) if peers.is_empty() => Attempt::Unavailable("empty peer list".to_string()),
            Ok(peers) => Attempt::Found(peers),
            Err(e) => Attempt::Unavailable(e.to_string()),
        }
    }
}

/// Discover the public, non-banned peers of one network instance.
///
/// An unreachable node yields no peers; so does a node on which every
/// strategy came back unavailable.
pub async fn discover(node: &dyn NodeApi, network: Network) -> Vec<DiscoveredPeer> {
    if !node.is_listening().await {
        info!("{} node at {} not running; skipping its peers", network, node.endpoint());
        return Vec::new();
    }

    for strategy in Strategy::plan(node) {
        match strategy.attempt(node).await {
            Attempt::Found(raw) => {
                let total = raw.len();
                let peers = filter_peers(raw, network);
                info!("{}: {} usable peers of {} via {:?}", network, peers.len(), total, strategy);
                return peers;
            }
            Attempt::Unavailable(reason) => {
                warn!("{}: {:?} unavailable: {}", network, strategy, reason);
            }
        }
    }
    Vec::new()
}

/// Drop banned peers and addresses that cannot be geolocated, tagging the
/// rest with `network`.
pub fn filter_peers(raw: Vec<PeerResponse>, network: Network) -> Vec<DiscoveredPeer> {
    raw.into_iter()
        .filter_map(|peer| {
            if peer.is_banned() {
                debug!("skipping banned peer {}", peer.addr);
                return None;
            }
            let (ip, port) = parse_addr(&peer.addr, network.default_p2p_port())?;
            if !is_public(&ip) {
                debug!("skipping non-public peer {}", peer.addr);
                return None;
            }
            Some(DiscoveredPeer {
                ip: ip.to_string(),
                port,
                user_agent: peer.user_agent,
                direction: peer.direction.unwrap_or_else(|| "Outbound".to_string()),
                network,
            })
        })
        .collect()
}

/// Split `ip:port`, `[v6]:port` or a bare address. IPv4-mapped v6
/// addresses are reported as v4.
pub fn parse_addr(addr: &str, default_port: u16) -> Option<(IpAddr, u16)> {
    let addr = addr.trim();
    let (ip, port) = if let Ok(socket) = addr.parse::<SocketAddr>() {
        (socket.ip(), socket.port())
    } else {
        let bare = addr.trim_start_matches('[').trim_end_matches(']');
        (bare.parse::<IpAddr>().ok()?, default_port)
    };

    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };
    Some((ip, if port == 0 { default_port } else { port }))
}

pub fn is_public(ip: &IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !(v4.is_private() || v4.is_link_local() || v4.is_broadcast()),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            (first & 0xfe00) != 0xfc00 && (first & 0xffc0) != 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{peer, FakeChain};
    use std::sync::atomic::Ordering;

    #[test]
    fn parses_address_shapes() {
        assert_eq!(parse_addr("8.8.8.8:3414", 1).unwrap(), ("8.8.8.8".parse().unwrap(), 3414));
        assert_eq!(parse_addr("[2001:db8::1]:13414", 1).unwrap(), ("2001:db8::1".parse().unwrap(), 13414));
        assert_eq!(parse_addr("8.8.4.4", 3414).unwrap(), ("8.8.4.4".parse().unwrap(), 3414));
        assert_eq!(parse_addr("[::ffff:1.2.3.4]:3414", 1).unwrap(), ("1.2.3.4".parse().unwrap(), 3414));
        assert!(parse_addr("seed.grin.mw:3414", 3414).is_none());
        assert!(parse_addr("", 3414).is_none());
    }

    #[test]
    fn local_ranges_are_not_public() {
        for ip in ["127.0.0.1", "10.1.2.3", "192.168.1.1", "172.16.0.9", "169.254.1.1", "0.0.0.0", "::1", "fe80::1", "fd00::5"] {
            assert!(!is_public(&ip.parse().unwrap()), "{} should be filtered", ip);
        }
        for ip in ["8.8.8.8", "172.32.0.1", "2001:db8::1"] {
            assert!(is_public(&ip.parse().unwrap()), "{} should pass", ip);
        }
    }

    #[test]
    fn filter_drops_banned_and_private() {
        let raw = vec![
            peer("1.1.1.1:3414", "MW/Grin 5.3.3", Some("Healthy")),
            peer("2.2.2.2:3414", "MW/Grin 5.3.3", Some("Banned")),
            peer("192.168.0.10:3414", "MW/Grin 5.3.3", None),
            peer("[2001:db8::7]", "MW/Grin 5.2.0", None),
        ];
        let peers = filter_peers(raw, Network::Testnet);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].ip, "1.1.1.1");
        assert_eq!(peers[1].port, 13414);
        assert!(peers.iter().all(|p| p.network == Network::Testnet));
    }

    #[tokio::test]
    async fn privileged_query_preferred_with_credential() {
        let mut node = FakeChain::new(0, 0);
        node.credential = true;
        node.known_peers = Some(vec![peer("1.1.1.1:3414", "a", None), peer("3.3.3.3:3414", "b", None)]);
        node.connected_peers = Some(vec![peer("9.9.9.9:3414", "c", None)]);

        let peers = discover(&node, Network::Mainnet).await;
        assert_eq!(peers.len(), 2);
        assert_eq!(node.connected_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_connected_peers() {
        let mut node = FakeChain::new(0, 0);
        node.credential = true;
        node.connected_peers = Some(vec![peer("9.9.9.9:3414", "c", None)]);

        let peers = discover(&node, Network::Mainnet).await;
        assert_eq!(peers.len(), 1);
        assert_eq!(node.peer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(node.connected_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_credential_skips_privileged_query() {
        let mut node = FakeChain::new(0, 0);
        node.known_peers = Some(vec![peer("1.1.1.1:3414", "a", None)]);
        node.connected_peers = Some(vec![peer("9.9.9.9:3414", "c", None)]);

        let peers = discover(&node, Network::Mainnet).await;
        assert_eq!(peers[0].ip, "9.9.9.9");
        assert_eq!(node.peer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_node_is_skipped() {
        let mut node = FakeChain::new(0, 0);
        node.reachable = false;
        node.connected_peers = Some(vec![peer("9.9.9.9:3414", "c", None)]);

        assert!(discover(&node, Network::Testnet).await.is_empty());
        assert_eq!(node.connected_calls.load(Ordering::SeqCst), 0);
    }
}
