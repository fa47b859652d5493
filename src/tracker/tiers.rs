use std::net::SocketAddrV4;
use std::time::Duration;

use tracing::{debug, info};

use super::error::TrackerError;
use super::http::HttpTracker;
use super::response::AnnounceResponse;
use super::udp::UdpTracker;
use crate::constants::DEFAULT_ANNOUNCE_INTERVAL;
use crate::metainfo::Sha1Hash;

/// A tracker of either protocol, selected by URL scheme.
pub enum Tracker {
    Http(HttpTracker),
    Udp(UdpTracker),
}

impl Tracker {
    /// Builds a tracker for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnsupportedProtocol`] for schemes other
    /// than `http(s)` and `udp`.
    pub fn from_url(url: &str) -> Result<Self, TrackerError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(Tracker::Http(HttpTracker::new(url)?))
        } else if url.starts_with("udp://") {
            Ok(Tracker::Udp(UdpTracker::new(url)?))
        } else {
            Err(TrackerError::UnsupportedProtocol(url.to_string()))
        }
    }

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
        match self {
            Tracker::Http(t) => {
                t.announce(info_hash, peer_id, port, uploaded, downloaded, left)
                    .await
            }
            Tracker::Udp(t) => {
                t.announce(info_hash, peer_id, port, uploaded, downloaded, left)
                    .await
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Tracker::Http(t) => t.url(),
            Tracker::Udp(t) => t.url(),
        }
    }
}

/// Walks the tiered announce list ([BEP-12]) and remembers what worked.
///
/// The most recent successful tracker is tried first on every call. On
/// failure the tiers are walked in order; a tracker that answers is
/// promoted to the front of its tier so later walks reach it sooner.
///
/// [BEP-12]: http://bittorrent.org/beps/bep_0012.html
pub struct AnnounceTiers {
    tiers: Vec<Vec<String>>,
    current: Option<Tracker>,
    interval: Duration,
    info_hash: Sha1Hash,
    peer_id: [u8; 20],
    port: u16,
    total_length: u64,
}

impl AnnounceTiers {
    /// Builds the tier list from the torrent's `announce` and optional
    /// `announce-list`. When the tiered list is present it takes
    /// precedence; otherwise the single announce URL forms one tier.
    pub fn new(
        announce: &str,
        announce_list: &[Vec<String>],
        info_hash: Sha1Hash,
        peer_id: [u8; 20],
        port: u16,
        total_length: u64,
    ) -> Self {
        let tiers = if announce_list.iter().any(|tier| !tier.is_empty()) {
            announce_list.to_vec()
        } else {
            vec![vec![announce.to_string()]]
        };

        Self {
            tiers,
            current: None,
            interval: DEFAULT_ANNOUNCE_INTERVAL,
            info_hash,
            peer_id,
            port,
            total_length,
        }
    }

    /// Announces with the given transfer totals and returns the peer list,
    /// or `None` when every tracker in every tier failed.
    pub async fn retrieve_peers(
        &mut self,
        downloaded: u64,
        uploaded: u64,
    ) -> Option<Vec<SocketAddrV4>> {
        let left = self.total_length.saturating_sub(downloaded);

        if let Some(tracker) = self.current.take() {
            match self.announce_to(&tracker, downloaded, uploaded, left).await {
                Ok(response) => {
                    self.remember_interval(&response);
                    self.current = Some(tracker);
                    return Some(response.peers);
                }
                Err(e) => debug!(url = tracker.url(), error = %e, "current tracker failed"),
            }
        }

        for tier_idx in 0..self.tiers.len() {
            for url_idx in 0..self.tiers[tier_idx].len() {
                let url = self.tiers[tier_idx][url_idx].clone();

                let tracker = match Tracker::from_url(&url) {
                    Ok(tracker) => tracker,
                    Err(e) => {
                        debug!(url, error = %e, "skipping tracker");
                        continue;
                    }
                };

                match self.announce_to(&tracker, downloaded, uploaded, left).await {
                    Ok(response) => {
                        info!(url, peers = response.peers.len(), "tracker announce ok");
                        self.tiers[tier_idx].swap(0, url_idx);
                        self.remember_interval(&response);
                        self.current = Some(tracker);
                        return Some(response.peers);
                    }
                    Err(e) => {
                        debug!(url, error = %e, "tracker announce failed");
                    }
                }
            }
        }

        None
    }

    async fn announce_to(
        &self,
        tracker: &Tracker,
        downloaded: u64,
        uploaded: u64,
        left: u64,
    ) -> Result<AnnounceResponse, TrackerError> {
        tracker
            .announce(
                &self.info_hash,
                &self.peer_id,
                self.port,
                uploaded,
                downloaded,
                left,
            )
            .await
    }

    /// The re-announce interval requested by the last successful tracker.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn remember_interval(&mut self, response: &AnnounceResponse) {
        if response.interval > 0 {
            self.interval = Duration::from_secs(response.interval as u64);
        }
    }

    #[cfg(test)]
    pub(crate) fn tier_urls(&self) -> &[Vec<String>] {
        &self.tiers
    }
}
