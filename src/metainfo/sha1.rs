use super::error::MetainfoError;
use std::fmt;

/// Number of bytes in a SHA-1 digest.
pub const SHA1_LEN: usize = 20;

/// A 20-byte SHA-1 digest.
///
/// Used for both the torrent's info hash and the per-piece reference
/// hashes. Provides value equality, hex formatting, and the percent
/// encoding trackers expect in announce URLs.
///
/// # Examples
///
/// ```
/// use riptide::metainfo::Sha1Hash;
///
/// let hash = Sha1Hash::digest(b"hello");
/// assert_eq!(hash.to_hex(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
/// assert_eq!(hash, Sha1Hash::digest(b"hello"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Hash(pub [u8; SHA1_LEN]);

impl Sha1Hash {
    /// Creates a hash from raw bytes.
    pub fn from_bytes(bytes: [u8; SHA1_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a hash from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`MetainfoError::InvalidHashLength`] if the slice is not
    /// exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MetainfoError> {
        if bytes.len() != SHA1_LEN {
            return Err(MetainfoError::InvalidHashLength);
        }
        let mut arr = [0u8; SHA1_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Computes the SHA-1 digest of `data`.
    pub fn digest(data: &[u8]) -> Self {
        use sha1::{Digest, Sha1};
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Returns the raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; SHA1_LEN] {
        &self.0
    }

    /// Converts to a lowercase hexadecimal string.
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(40), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
    }

    /// Percent-encodes the hash for use in tracker announce requests.
    ///
    /// Every byte is encoded (e.g., `%ab%cd...`).
    pub fn url_encode(&self) -> String {
        self.0.iter().fold(String::with_capacity(60), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "%{:02x}", b);
            s
        })
    }
}

impl fmt::Debug for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha1Hash({})", self.to_hex())
    }
}

impl fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
