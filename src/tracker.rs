//! Tracker protocols ([BEP-3], [BEP-12], [BEP-15]).
//!
//! Trackers are servers that help peers find each other. This module
//! implements the HTTP and UDP announce protocols behind one interface,
//! plus the tiered announce-list walk that picks which tracker to talk to.
//!
//! # Overview
//!
//! When downloading a torrent, clients "announce" to trackers to register
//! themselves in the swarm, report transfer totals, and fetch a list of
//! peer endpoints. [`AnnounceTiers`] drives the whole process: it tries the
//! last tracker that answered, falls back through the tiers on failure,
//! and promotes whatever works to the front of its tier.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html
//! [BEP-12]: http://bittorrent.org/beps/bep_0012.html
//! [BEP-15]: http://bittorrent.org/beps/bep_0015.html

mod error;
mod http;
mod response;
mod tiers;
mod udp;

pub use error::TrackerError;
pub use http::HttpTracker;
pub use response::{parse_compact_peers, AnnounceResponse};
pub use tiers::{AnnounceTiers, Tracker};
pub use udp::UdpTracker;
