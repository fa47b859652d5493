//! Torrent metainfo handling (BEP-3, BEP-12)
//!
//! Parses `.torrent` files into the metadata the download pipeline works
//! with: tracker tiers, piece geometry and hashes, the file layout, and
//! the info hash computed over the raw bytes of the `info` dictionary.

mod error;
mod sha1;
mod torrent;

pub use error::MetainfoError;
pub use sha1::{Sha1Hash, SHA1_LEN};
pub use torrent::{FileInfo, Metainfo};

#[cfg(test)]
mod tests;
