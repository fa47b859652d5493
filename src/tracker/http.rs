use reqwest::Client;

use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceResponse};
use crate::bencode::decode;
use crate::constants::HTTP_TRACKER_TIMEOUT;
use crate::metainfo::Sha1Hash;

/// An HTTP(S) tracker client ([BEP-3]).
///
/// Announces are plain GET requests with the torrent and transfer state in
/// the query string; the response is a bencoded dictionary with a compact
/// peer list.
///
/// [BEP-3]: http://bittorrent.org/beps/bep_0003.html
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(HTTP_TRACKER_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Announces to the tracker and returns the parsed response.
    ///
    /// `left` is the number of bytes still missing; the tracker uses it to
    /// tell leechers from seeders.
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
        let url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            info_hash.url_encode(),
            url_encode(peer_id),
            port,
            uploaded,
            downloaded,
            left
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(TrackerError::InvalidResponse(format!(
                "http status {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;

        let value = decode(&bytes)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| TrackerError::InvalidResponse("expected dict".into()))?;

        if let Some(failure) = dict
            .get(b"failure reason".as_slice())
            .and_then(|v| v.as_str())
        {
            return Err(TrackerError::Failure(failure.to_string()));
        }

        let interval = dict
            .get(b"interval".as_slice())
            .and_then(|v| v.as_integer())
            .ok_or_else(|| TrackerError::InvalidResponse("missing interval".into()))?
            as u32;

        let mut announce = AnnounceResponse::new(interval);

        announce.seeders = dict
            .get(b"complete".as_slice())
            .and_then(|v| v.as_integer())
            .map(|v| v as u32);

        announce.leechers = dict
            .get(b"incomplete".as_slice())
            .and_then(|v| v.as_integer())
            .map(|v| v as u32);

        let peers = dict
            .get(b"peers".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| TrackerError::InvalidResponse("missing peers".into()))?;

        announce.peers = parse_compact_peers(peers)
            .ok_or_else(|| TrackerError::Protocol("peer list length not a multiple of 6".into()))?;

        Ok(announce)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn url_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
                format!("{}", b as char)
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
