//! The download orchestrator.
//!
//! [`TorrentClient`] wires the subsystems together: it parses the torrent,
//! opens the output files, builds the scheduler and peer manager, keeps
//! announcing to trackers on their requested cadence, and watches for
//! completion. It also exposes the status and statistics surface an
//! embedding UI polls.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::constants::COMPLETION_POLL_INTERVAL;
use crate::metainfo::{Metainfo, MetainfoError};
use crate::peer::{PeerId, PeerManager};
use crate::scheduler::PieceScheduler;
use crate::storage::{FileSet, StorageError};
use crate::tracker::AnnounceTiers;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to parse torrent: {0}")]
    Metainfo(#[from] MetainfoError),

    #[error("no tracker returned any peers")]
    NoPeers,

    #[error("disk error: {0}")]
    Storage(#[from] StorageError),
}

/// Coarse lifecycle of a download, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DownloadStatus {
    Stopped = 0,
    Downloading = 1,
    Finished = 2,
}

impl DownloadStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DownloadStatus::Downloading,
            2 => DownloadStatus::Finished,
            _ => DownloadStatus::Stopped,
        }
    }
}

/// A point-in-time snapshot of download progress for external UI.
#[derive(Debug, Clone)]
pub struct DownloadStats {
    /// Bytes verified and written so far.
    pub downloaded_bytes: u64,
    /// Total torrent size in bytes.
    pub total_bytes: u64,
    /// Average download rate in bytes per second.
    pub download_rate: f64,
    /// Estimated time to completion; `None` until data is flowing.
    pub eta: Option<Duration>,
    /// Peers currently past the handshake.
    pub connected_peers: usize,
}

/// Drives one torrent from descriptor to fully-written files.
///
/// # Examples
///
/// ```no_run
/// use riptide::client::TorrentClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = TorrentClient::new(
///     Path::new("debian.torrent"),
///     Path::new("."),
///     6881,
/// )?;
/// client.start_download().await?;
/// # Ok(())
/// # }
/// ```
pub struct TorrentClient {
    metainfo: Metainfo,
    scheduler: Arc<PieceScheduler>,
    peer_manager: Arc<PeerManager>,
    tracker: tokio::sync::Mutex<AnnounceTiers>,
    status: AtomicU8,
    started_at: parking_lot::Mutex<Option<Instant>>,
}

impl TorrentClient {
    /// Parses the torrent and prepares every subsystem. Output files are
    /// created (and truncated) under `output_dir` immediately.
    pub fn new(torrent_path: &Path, output_dir: &Path, port: u16) -> Result<Self, ClientError> {
        let metainfo = Metainfo::from_file(torrent_path)?;

        info!(
            name = %metainfo.name,
            size = metainfo.total_length,
            pieces = metainfo.piece_count(),
            info_hash = %metainfo.info_hash,
            "loaded torrent"
        );

        let writer = FileSet::create(&metainfo.files, output_dir)?;

        let scheduler = Arc::new(PieceScheduler::new(
            metainfo.piece_length,
            metainfo.total_length,
            metainfo.pieces.clone(),
            writer,
        ));

        let peer_id = PeerId::generate();
        let peer_manager = PeerManager::new(scheduler.clone(), metainfo.info_hash, peer_id);

        let tracker = AnnounceTiers::new(
            &metainfo.announce,
            &metainfo.announce_list,
            metainfo.info_hash,
            *peer_id.as_bytes(),
            port,
            metainfo.total_length,
        );

        Ok(Self {
            metainfo,
            scheduler,
            peer_manager,
            tracker: tokio::sync::Mutex::new(tracker),
            status: AtomicU8::new(DownloadStatus::Stopped as u8),
            started_at: parking_lot::Mutex::new(None),
        })
    }

    /// Runs the download to completion.
    ///
    /// Announces, feeds the returned peers to the manager, then loops:
    /// re-announce with fresh totals whenever the tracker's interval
    /// elapses, until the scheduler signals the last piece. A first
    /// announce that yields nothing at all is fatal.
    pub async fn start_download(&self) -> Result<(), ClientError> {
        let peers = self
            .tracker
            .lock()
            .await
            .retrieve_peers(0, 0)
            .await
            .ok_or(ClientError::NoPeers)?;

        *self.started_at.lock() = Some(Instant::now());
        self.set_status(DownloadStatus::Downloading);

        self.peer_manager.add_peers(peers);

        let mut next_announce = Instant::now() + self.tracker.lock().await.interval();

        while !self.scheduler.is_finished() {
            sleep(COMPLETION_POLL_INTERVAL).await;

            if Instant::now() >= next_announce {
                let downloaded = self.scheduler.downloaded_bytes();
                let mut tracker = self.tracker.lock().await;

                match tracker.retrieve_peers(downloaded, 0).await {
                    Some(peers) => self.peer_manager.add_peers(peers),
                    None => warn!("re-announce failed on every tracker"),
                }

                next_announce = Instant::now() + tracker.interval();
            }
        }

        self.peer_manager.stop();

        if let Some(failure) = self.scheduler.take_failure() {
            self.set_status(DownloadStatus::Stopped);
            return Err(failure.into());
        }

        self.set_status(DownloadStatus::Finished);
        info!(name = %self.metainfo.name, "download complete");
        Ok(())
    }

    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Snapshots progress for a UI; cheap enough to poll every frame.
    pub fn stats(&self) -> DownloadStats {
        let downloaded_bytes = self.scheduler.downloaded_bytes();
        let total_bytes = self.metainfo.total_length;

        let started_at = *self.started_at.lock();
        let elapsed = started_at
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let download_rate = if elapsed > 0.0 {
            downloaded_bytes as f64 / elapsed
        } else {
            0.0
        };

        let eta = if download_rate > 0.0 && downloaded_bytes < total_bytes {
            let remaining = (total_bytes - downloaded_bytes) as f64;
            Some(Duration::from_secs_f64(remaining / download_rate))
        } else {
            None
        };

        DownloadStats {
            downloaded_bytes,
            total_bytes,
            download_rate,
            eta,
            connected_peers: self.peer_manager.connected_peers(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metainfo.name
    }

    fn set_status(&self, status: DownloadStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(
            DownloadStatus::from_u8(DownloadStatus::Stopped as u8),
            DownloadStatus::Stopped
        );
        assert_eq!(
            DownloadStatus::from_u8(DownloadStatus::Downloading as u8),
            DownloadStatus::Downloading
        );
        assert_eq!(
            DownloadStatus::from_u8(DownloadStatus::Finished as u8),
            DownloadStatus::Finished
        );
    }
}
