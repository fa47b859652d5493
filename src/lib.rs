//! riptide - a BitTorrent download client
//!
//! Given a `.torrent` descriptor, riptide discovers peers through HTTP and
//! UDP trackers, speaks the peer wire protocol with many peers in
//! parallel, schedules block requests rarest-first, verifies every
//! completed piece against its SHA-1 reference hash, and writes verified
//! data to the right place in the output files. Download only: the client
//! announces as a leech and never serves blocks.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode decoding with source-span tracking
//! - [`metainfo`] - torrent file parsing and info-hash computation
//! - [`tracker`] - HTTP (BEP-3) and UDP (BEP-15) announce behind a tiered list (BEP-12)
//! - [`scheduler`] - rarest-first piece/block scheduling, verification, writeback
//! - [`storage`] - mapping piece data onto the torrent's files
//! - [`peer`] - peer wire protocol and connection lifecycle
//! - [`client`] - the orchestrator tying it all together

pub mod bencode;
pub mod client;
pub mod constants;
pub mod metainfo;
pub mod peer;
pub mod scheduler;
pub mod storage;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value, ValueKind};
pub use client::{ClientError, DownloadStats, DownloadStatus, TorrentClient};
pub use metainfo::{FileInfo, Metainfo, MetainfoError, Sha1Hash};
pub use peer::{
    Bitfield, Handshake, Message, PeerConnection, PeerError, PeerId, PeerManager, PeerState,
};
pub use scheduler::{BlockRequest, PieceScheduler};
pub use storage::{FileSet, StorageError};
pub use tracker::{AnnounceResponse, AnnounceTiers, HttpTracker, TrackerError, UdpTracker};
