use super::error::MetainfoError;
use super::sha1::{Sha1Hash, SHA1_LEN};
use crate::bencode::{decode, Value};
use std::path::{Path, PathBuf};

/// A parsed `.torrent` file.
///
/// Contains everything the download pipeline needs: tracker URLs, the
/// piece geometry with reference hashes, the file layout, and the info
/// hash identifying the torrent on trackers and in peer handshakes.
///
/// # Examples
///
/// ```no_run
/// use riptide::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let metainfo = Metainfo::from_file("example.torrent")?;
///
/// println!("Torrent: {}", metainfo.name);
/// println!("Size: {} bytes", metainfo.total_length);
/// println!("Info hash: {}", metainfo.info_hash);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// Suggested name for the file or directory.
    pub name: String,
    /// Primary tracker URL.
    pub announce: String,
    /// Multi-tier tracker list ([BEP-12](http://bittorrent.org/beps/bep_0012.html)).
    pub announce_list: Vec<Vec<String>>,
    /// Number of bytes per piece (final piece may be shorter).
    pub piece_length: u32,
    /// SHA-1 reference hash of each piece.
    pub pieces: Vec<Sha1Hash>,
    /// Files in the torrent, sorted by offset, tiling `[0, total_length)`.
    pub files: Vec<FileInfo>,
    /// Total size of all files combined.
    pub total_length: u64,
    /// SHA-1 of the exact source bytes of the `info` dictionary.
    pub info_hash: Sha1Hash,
}

/// A file within a torrent.
///
/// For single-file torrents there is one entry named after the torrent.
/// For multi-file torrents, paths are `name/component/...`.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path to the file (relative to the download directory).
    pub path: PathBuf,
    /// Byte offset of this file within the torrent's piece data.
    pub offset: u64,
    /// Size of the file in bytes.
    pub length: u64,
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    ///
    /// The info hash is computed over the byte range the `info` dictionary
    /// occupies in `data`, not over a re-encoding, so torrents whose
    /// dictionaries are not in canonical key order still hash correctly.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid bencode, a required field
    /// is missing or has the wrong type, the info dictionary describes no
    /// files, or the `pieces` string is not a multiple of 20 bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(MetainfoError::FieldType("root"))?;

        let announce = dict
            .get(b"announce".as_slice())
            .ok_or(MetainfoError::MissingField("announce"))?
            .as_str()
            .ok_or(MetainfoError::FieldType("announce"))?
            .to_string();

        let announce_list = dict
            .get(b"announce-list".as_slice())
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|tier| {
                        tier.as_list().map(|urls| {
                            urls.iter()
                                .filter_map(|u| u.as_str().map(String::from))
                                .collect()
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;

        let info_hash = Sha1Hash::digest(info_value.raw(data));

        let (name, piece_length, pieces, files, total_length) = parse_info(info_value)?;

        Ok(Self {
            name,
            announce,
            announce_list,
            piece_length,
            pieces,
            files,
            total_length,
            info_hash,
        })
    }

    /// Reads and parses a torrent file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MetainfoError> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Returns the number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Returns the size of a piece; the final piece is shorter unless the
    /// total length is an exact multiple of the piece length.
    pub fn piece_size(&self, index: u32) -> u32 {
        if index as usize == self.pieces.len() - 1 {
            (1 + (self.total_length - 1) % self.piece_length as u64) as u32
        } else {
            self.piece_length
        }
    }
}

type InfoContent = (String, u32, Vec<Sha1Hash>, Vec<FileInfo>, u64);

fn parse_info(value: &Value) -> Result<InfoContent, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::FieldType("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .ok_or(MetainfoError::MissingField("name"))?
        .as_str()
        .ok_or(MetainfoError::FieldType("name"))?
        .to_string();

    let piece_length = dict
        .get(b"piece length".as_slice())
        .ok_or(MetainfoError::MissingField("piece length"))?
        .as_integer()
        .ok_or(MetainfoError::FieldType("piece length"))? as u32;

    let pieces_bytes = dict
        .get(b"pieces".as_slice())
        .ok_or(MetainfoError::MissingField("pieces"))?
        .as_bytes()
        .ok_or(MetainfoError::FieldType("pieces"))?;

    if pieces_bytes.len() % SHA1_LEN != 0 {
        return Err(MetainfoError::InvalidPieceHashes);
    }

    let pieces: Vec<Sha1Hash> = pieces_bytes
        .chunks_exact(SHA1_LEN)
        .map(|chunk| {
            let mut arr = [0u8; SHA1_LEN];
            arr.copy_from_slice(chunk);
            Sha1Hash::from_bytes(arr)
        })
        .collect();

    let (files, total_length) = if let Some(length) = dict.get(b"length".as_slice()) {
        // Single-file torrent: `name` is the file name.
        let length = length
            .as_integer()
            .ok_or(MetainfoError::FieldType("length"))? as u64;
        let file = FileInfo {
            path: PathBuf::from(&name),
            offset: 0,
            length,
        };
        (vec![file], length)
    } else if let Some(files_value) = dict.get(b"files".as_slice()) {
        // Multi-file torrent: `name` is the root directory.
        let files_list = files_value
            .as_list()
            .ok_or(MetainfoError::FieldType("files"))?;

        let mut files = Vec::with_capacity(files_list.len());
        let mut offset = 0u64;

        for file_value in files_list {
            let file_dict = file_value
                .as_dict()
                .ok_or(MetainfoError::FieldType("files"))?;

            let length = file_dict
                .get(b"length".as_slice())
                .ok_or(MetainfoError::MissingField("length"))?
                .as_integer()
                .ok_or(MetainfoError::FieldType("length"))? as u64;

            let path_list = file_dict
                .get(b"path".as_slice())
                .ok_or(MetainfoError::MissingField("path"))?
                .as_list()
                .ok_or(MetainfoError::FieldType("path"))?;

            let path: PathBuf = std::iter::once(name.clone())
                .chain(
                    path_list
                        .iter()
                        .filter_map(|p| p.as_str().map(String::from)),
                )
                .collect();

            files.push(FileInfo {
                path,
                offset,
                length,
            });

            offset += length;
        }

        (files, offset)
    } else {
        return Err(MetainfoError::InvalidInfoDict);
    };

    Ok((name, piece_length, pieces, files, total_length))
}
