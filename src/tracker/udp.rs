use rand::Rng as _;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceResponse};
use crate::constants::{
    TRACKER_NUM_WANT, UDP_ACTION_ANNOUNCE, UDP_ACTION_CONNECT, UDP_ACTION_ERROR,
    UDP_TRACKER_PROTOCOL_ID, UDP_TRACKER_TIMEOUT,
};
use crate::metainfo::Sha1Hash;

/// A UDP tracker client ([BEP-15]).
///
/// The protocol is connectionless and two-phase: a `connect` exchange
/// yields a connection id, which authenticates the following `announce`
/// exchange. Both responses echo the caller's transaction id.
///
/// [BEP-15]: http://bittorrent.org/beps/bep_0015.html
pub struct UdpTracker {
    /// `host:port` part of the announce URL.
    authority: String,
    url: String,
}

impl UdpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        let authority = parse_udp_url(url)?;
        Ok(Self {
            authority,
            url: url.to_string(),
        })
    }

    /// Runs a full connect + announce exchange under one overall deadline.
    #[allow(clippy::too_many_arguments)]
    pub async fn announce(
        &self,
        info_hash: &Sha1Hash,
        peer_id: &[u8; 20],
        port: u16,
        uploaded: u64,
        downloaded: u64,
        left: u64,
    ) -> Result<AnnounceResponse, TrackerError> {
        match timeout(
            UDP_TRACKER_TIMEOUT,
            self.exchange(info_hash, peer_id, port, uploaded, downloaded, left),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TrackerError::Timeout),
        }
    }

    async fn exchange(
        &self,
        info_hash: &Sha1Hash,
        peer_id: &[u8; 20],
        port: u16,
        uploaded: u64,
        downloaded: u64,
        left: u64,
    ) -> Result<AnnounceResponse, TrackerError> {
        let addr = lookup_host(&self.authority)
            .await?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| TrackerError::InvalidUrl(self.url.clone()))?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        let connection_id = Self::connect_exchange(&socket).await?;

        let transaction_id: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(98);
        request.extend_from_slice(&connection_id.to_be_bytes());
        request.extend_from_slice(&UDP_ACTION_ANNOUNCE.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());
        request.extend_from_slice(info_hash.as_bytes());
        request.extend_from_slice(peer_id);
        request.extend_from_slice(&downloaded.to_be_bytes());
        request.extend_from_slice(&left.to_be_bytes());
        request.extend_from_slice(&uploaded.to_be_bytes());
        request.extend_from_slice(&0u32.to_be_bytes()); // event (0 = none)
        request.extend_from_slice(&0u32.to_be_bytes()); // IP address (0 = sender)
        request.extend_from_slice(&0u32.to_be_bytes()); // key
        request.extend_from_slice(&(TRACKER_NUM_WANT as i32).to_be_bytes());
        request.extend_from_slice(&port.to_be_bytes());

        socket.send(&request).await?;

        let mut buf = vec![0u8; 2048];
        let n = socket.recv(&mut buf).await?;
        let response = &buf[..n];

        if n < 8 {
            return Err(TrackerError::Protocol("announce response too short".into()));
        }

        let action = u32::from_be_bytes([response[0], response[1], response[2], response[3]]);
        let resp_tid = u32::from_be_bytes([response[4], response[5], response[6], response[7]]);

        if action == UDP_ACTION_ERROR {
            let message = String::from_utf8_lossy(&response[8..]).to_string();
            return Err(TrackerError::Failure(message));
        }

        if n < 20 {
            return Err(TrackerError::Protocol("announce response too short".into()));
        }

        if action != UDP_ACTION_ANNOUNCE || resp_tid != transaction_id {
            return Err(TrackerError::Protocol(
                "announce response mismatch".into(),
            ));
        }

        let interval = u32::from_be_bytes([response[8], response[9], response[10], response[11]]);
        let leechers = u32::from_be_bytes([response[12], response[13], response[14], response[15]]);
        let seeders = u32::from_be_bytes([response[16], response[17], response[18], response[19]]);

        let peers = parse_compact_peers(&response[20..])
            .ok_or_else(|| TrackerError::Protocol("peer list length not a multiple of 6".into()))?;

        let mut announce = AnnounceResponse::new(interval);
        announce.seeders = Some(seeders);
        announce.leechers = Some(leechers);
        announce.peers = peers;

        Ok(announce)
    }

    async fn connect_exchange(socket: &UdpSocket) -> Result<u64, TrackerError> {
        let transaction_id: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(16);
        request.extend_from_slice(&UDP_TRACKER_PROTOCOL_ID.to_be_bytes());
        request.extend_from_slice(&UDP_ACTION_CONNECT.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());

        socket.send(&request).await?;

        let mut buf = [0u8; 16];
        let n = socket.recv(&mut buf).await?;

        if n < 16 {
            return Err(TrackerError::Protocol("connect response too short".into()));
        }

        let action = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let resp_tid = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        if action != UDP_ACTION_CONNECT || resp_tid != transaction_id {
            return Err(TrackerError::Protocol("connect response mismatch".into()));
        }

        Ok(u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn parse_udp_url(url: &str) -> Result<String, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let authority = rest.split('/').next().unwrap_or(rest);

    if authority.is_empty() || !authority.contains(':') {
        return Err(TrackerError::InvalidUrl(url.to_string()));
    }

    Ok(authority.to_string())
}
