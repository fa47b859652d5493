use std::net::{Ipv4Addr, SocketAddrV4};

/// A successful announce: how long to wait before the next one, swarm
/// counters when the tracker provides them, and the peer list.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds the tracker wants us to wait before re-announcing.
    pub interval: u32,
    /// Number of seeders, if reported.
    pub seeders: Option<u32>,
    /// Number of leechers, if reported.
    pub leechers: Option<u32>,
    /// Peer endpoints extracted from the compact peer list.
    pub peers: Vec<SocketAddrV4>,
}

impl AnnounceResponse {
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            seeders: None,
            leechers: None,
            peers: Vec::new(),
        }
    }
}

/// Parses a compact peer list: 6 bytes per peer, 4 bytes IPv4 followed by
/// a big-endian port.
///
/// A length that is not a multiple of 6 rejects the whole list rather than
/// truncating to complete records.
pub fn parse_compact_peers(data: &[u8]) -> Option<Vec<SocketAddrV4>> {
    if data.len() % 6 != 0 {
        return None;
    }

    Some(
        data.chunks_exact(6)
            .map(|chunk| {
                let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                SocketAddrV4::new(ip, port)
            })
            .collect(),
    )
}
