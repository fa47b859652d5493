use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use super::error::StorageError;
use crate::metainfo::FileInfo;

struct FileSlot {
    offset: u64,
    length: u64,
    file: File,
}

/// Writes piece data at global torrent offsets across the file table.
///
/// The torrent's files tile the byte range `[0, total_length)`
/// contiguously; a write that starts in one file continues into the next
/// until the data is exhausted. Files are created (with parent
/// directories) and truncated to zero when the set is opened, so a fresh
/// download always starts from empty files.
///
/// Writes are blocking `std::fs` calls: they happen only when a piece
/// completes verification and are serialized by the scheduler, so there is
/// no benefit to routing them through the async runtime.
pub struct FileSet {
    files: Vec<FileSlot>,
    total_length: u64,
}

impl FileSet {
    /// Opens the file set under `dest_dir`, creating directories and
    /// truncating existing files.
    pub fn create(infos: &[FileInfo], dest_dir: &Path) -> Result<Self, StorageError> {
        let mut files = Vec::with_capacity(infos.len());

        for info in infos {
            let path = dest_dir.join(&info.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;

            files.push(FileSlot {
                offset: info.offset,
                length: info.length,
                file,
            });
        }

        let total_length = infos.iter().map(|f| f.length).sum();

        Ok(Self {
            files,
            total_length,
        })
    }

    /// Writes `data` starting at the global torrent offset, spanning file
    /// boundaries as needed.
    pub fn write(&mut self, mut data: &[u8], mut offset: u64) -> Result<(), StorageError> {
        // First file whose byte range reaches past the offset. Zero-length
        // files hold no range and are passed over.
        let mut index = self
            .files
            .partition_point(|f| f.offset + f.length <= offset);

        while !data.is_empty() {
            let slot = self
                .files
                .get_mut(index)
                .ok_or(StorageError::OffsetOutOfRange { offset })?;

            if slot.length == 0 {
                index += 1;
                continue;
            }

            let within = offset - slot.offset;
            let writable = ((slot.length - within) as usize).min(data.len());

            slot.file.seek(SeekFrom::Start(within))?;
            slot.file.write_all(&data[..writable])?;

            data = &data[writable..];
            offset += writable as u64;
            index += 1;
        }

        Ok(())
    }

    /// Total size of all files in the set.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }
}
