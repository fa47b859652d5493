use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::piece::Piece;
use super::pool::BufferPool;
use crate::constants::{BLOCK_REQUEST_TIMEOUT, MAX_MEMPOOL_SIZE};
use crate::metainfo::Sha1Hash;
use crate::peer::Bitfield;
use crate::storage::{FileSet, StorageError};

/// A block the scheduler wants requested from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    /// The piece index.
    pub piece_index: u32,
    /// Byte offset within the piece.
    pub offset: u32,
    /// Length of the block in bytes.
    pub length: u32,
}

struct SchedulerState {
    /// Number of connected peers advertising each piece.
    piece_avail: Vec<u16>,
    piece_completed: Vec<bool>,
    /// Piece indices ordered by availability when `availability_changed`
    /// is false; resorted lazily on the next request.
    sorted_pieces: Vec<u32>,
    availability_changed: bool,
    active: HashMap<u32, Piece>,
    writer: FileSet,
    failure: Option<StorageError>,
}

/// Decides which block to request next, assembles incoming blocks into
/// pieces, verifies completed pieces against their reference hashes, and
/// writes verified data to disk.
///
/// Piece selection is rarest-first: pieces few peers advertise are fetched
/// before common ones. Memory is bounded by capping the number of
/// concurrently active pieces to `MAX_MEMPOOL_SIZE / piece_size` and
/// drawing piece buffers from a fixed pool.
///
/// Every method takes `&self`; one internal mutex serializes calls from
/// the peer-connection tasks. Completion and progress are additionally
/// published through atomics so the orchestrator can poll them without
/// taking the lock.
pub struct PieceScheduler {
    piece_size: u32,
    torrent_size: u64,
    piece_count: usize,
    max_active: usize,
    request_timeout: Duration,
    hashes: Vec<Sha1Hash>,
    pool: BufferPool,
    state: Mutex<SchedulerState>,
    pieces_left: AtomicUsize,
    downloaded: AtomicU64,
    finished: AtomicBool,
}

impl PieceScheduler {
    /// Creates a scheduler for a torrent of `torrent_size` bytes in pieces
    /// of `piece_size`, with one reference hash per piece.
    pub fn new(
        piece_size: u32,
        torrent_size: u64,
        hashes: Vec<Sha1Hash>,
        writer: FileSet,
    ) -> Self {
        let max_active = MAX_MEMPOOL_SIZE.div_ceil(piece_size as usize);
        Self::with_limits(
            piece_size,
            torrent_size,
            hashes,
            writer,
            max_active,
            BLOCK_REQUEST_TIMEOUT,
        )
    }

    fn with_limits(
        piece_size: u32,
        torrent_size: u64,
        hashes: Vec<Sha1Hash>,
        writer: FileSet,
        max_active: usize,
        request_timeout: Duration,
    ) -> Self {
        let piece_count = hashes.len();
        debug_assert_eq!(
            piece_count as u64,
            torrent_size.div_ceil(piece_size as u64),
            "piece hashes do not match the torrent geometry"
        );

        let max_active = max_active.min(piece_count.max(1));

        Self {
            piece_size,
            torrent_size,
            piece_count,
            max_active,
            request_timeout,
            hashes,
            pool: BufferPool::new(max_active),
            state: Mutex::new(SchedulerState {
                piece_avail: vec![0; piece_count],
                piece_completed: vec![false; piece_count],
                sorted_pieces: (0..piece_count as u32).collect(),
                availability_changed: false,
                active: HashMap::new(),
                writer,
                failure: None,
            }),
            pieces_left: AtomicUsize::new(piece_count),
            downloaded: AtomicU64::new(0),
            // An empty torrent is complete before it starts.
            finished: AtomicBool::new(piece_count == 0),
        }
    }

    /// Counts a newly connected peer's pieces into the availability table.
    pub fn add_peer_bitfield(&self, bitfield: &Bitfield) {
        let mut state = self.state.lock();
        for i in 0..self.piece_count {
            if bitfield.has_piece(i) {
                state.piece_avail[i] += 1;
            }
        }
        state.availability_changed = true;
    }

    /// Removes a departing peer's pieces from the availability table.
    pub fn remove_peer_bitfield(&self, bitfield: &Bitfield) {
        let mut state = self.state.lock();
        for i in 0..self.piece_count {
            if bitfield.has_piece(i) {
                state.piece_avail[i] = state.piece_avail[i].saturating_sub(1);
            }
        }
        state.availability_changed = true;
    }

    /// Raises the availability of one piece (a `have` message).
    ///
    /// When the sorted order is clean it is repaired in place: the piece
    /// swaps with the last entry of equal availability, so the increment
    /// cannot break the ascending order and no resort is needed.
    pub fn add_available_piece(&self, piece_index: u32) {
        let index = piece_index as usize;
        if index >= self.piece_count {
            return;
        }

        let mut state = self.state.lock();
        let SchedulerState {
            piece_avail,
            sorted_pieces,
            availability_changed,
            ..
        } = &mut *state;

        if !*availability_changed {
            let avail = piece_avail[index];
            let upper = sorted_pieces.partition_point(|&p| piece_avail[p as usize] <= avail);
            let last_equal = upper - 1;

            let mut pos = last_equal;
            while pos > 0 && sorted_pieces[pos] != piece_index {
                pos -= 1;
            }

            sorted_pieces.swap(pos, last_equal);
        }

        piece_avail[index] += 1;
    }

    /// Picks the next block to request from a peer advertising `bitfield`.
    ///
    /// Walks pieces lowest-availability-first, skipping completed pieces
    /// and pieces the peer does not have. A piece not yet in flight is
    /// activated only while the active-piece cap has room. Within a piece,
    /// blocks already requested recently are skipped, so a timed-out block
    /// can be re-offered to another peer.
    pub fn request_next_block(&self, bitfield: &Bitfield) -> Option<BlockRequest> {
        if self.is_finished() {
            return None;
        }

        let mut state = self.state.lock();

        if state.availability_changed {
            let SchedulerState {
                piece_avail,
                sorted_pieces,
                ..
            } = &mut *state;
            sorted_pieces.sort_by_key(|&p| piece_avail[p as usize]);
            state.availability_changed = false;
        }

        for sorted_index in 0..self.piece_count {
            let piece_index = state.sorted_pieces[sorted_index];

            if state.piece_completed[piece_index as usize]
                || !bitfield.has_piece(piece_index as usize)
            {
                continue;
            }

            if !state.active.contains_key(&piece_index) {
                if state.active.len() >= self.max_active {
                    continue;
                }
                match self.allocate_piece(piece_index) {
                    Some(piece) => {
                        state.active.insert(piece_index, piece);
                    }
                    None => continue,
                }
            }

            let piece = state
                .active
                .get_mut(&piece_index)
                .expect("piece activated above");

            if let Some((offset, length)) = piece.request_next_block() {
                return Some(BlockRequest {
                    piece_index,
                    offset,
                    length,
                });
            }
        }

        None
    }

    /// Accepts a block received from a peer.
    ///
    /// Blocks for pieces that are not active (already completed, discarded
    /// or never requested) are ignored, as are duplicates. When the last
    /// block of a piece arrives the piece is hashed: a match writes it to
    /// disk and marks it completed; a mismatch discards it for
    /// re-download. Either way the piece leaves the active set and its
    /// buffers return to the pool.
    pub fn receive_block(&self, piece_index: u32, offset: u32, data: &[u8]) {
        let mut state = self.state.lock();

        let Some(piece) = state.active.get_mut(&piece_index) else {
            return;
        };

        piece.receive_block(data, offset);
        debug!(piece = piece_index, offset, "received block");

        if !piece.is_complete() {
            return;
        }

        let piece = state
            .active
            .remove(&piece_index)
            .expect("piece present above");

        let hash = Sha1Hash::digest(piece.data());

        if hash == self.hashes[piece_index as usize] {
            let global_offset = piece_index as u64 * self.piece_size as u64;
            match state.writer.write(piece.data(), global_offset) {
                Ok(()) => {
                    state.piece_completed[piece_index as usize] = true;
                    self.downloaded
                        .fetch_add(piece.data().len() as u64, Ordering::AcqRel);
                    let left = self.pieces_left.fetch_sub(1, Ordering::AcqRel) - 1;
                    debug!(piece = piece_index, left, "piece verified and written");
                    if left == 0 {
                        self.finished.store(true, Ordering::Release);
                    }
                }
                Err(e) => {
                    error!(piece = piece_index, error = %e, "disk write failed");
                    state.failure = Some(e);
                    // Latch so every peer loop winds down; the orchestrator
                    // picks the failure up.
                    self.finished.store(true, Ordering::Release);
                }
            }
        } else {
            warn!(piece = piece_index, "piece hash mismatch, discarding");
        }

        let (buf, remaining, positions) = piece.into_buffers();
        self.pool.return_piece_buffer(buf);
        self.pool.return_index_vec(remaining);
        self.pool.return_index_vec(positions);
    }

    fn allocate_piece(&self, piece_index: u32) -> Option<Piece> {
        // The active-piece cap makes exhaustion unreachable; fail soft if
        // the accounting is ever wrong.
        let Some(buf) = self.pool.get_piece_buffer() else {
            debug_assert!(false, "piece buffer pool exhausted");
            return None;
        };
        let Some(remaining) = self.pool.get_index_vec() else {
            debug_assert!(false, "index vector pool exhausted");
            self.pool.return_piece_buffer(buf);
            return None;
        };
        let Some(positions) = self.pool.get_index_vec() else {
            debug_assert!(false, "index vector pool exhausted");
            self.pool.return_piece_buffer(buf);
            self.pool.return_index_vec(remaining);
            return None;
        };

        Some(Piece::new(
            self.piece_size_of(piece_index),
            buf,
            remaining,
            positions,
            self.request_timeout,
        ))
    }

    fn piece_size_of(&self, piece_index: u32) -> u32 {
        if piece_index as usize == self.piece_count - 1 {
            (1 + (self.torrent_size - 1) % self.piece_size as u64) as u32
        } else {
            self.piece_size
        }
    }

    /// True once every piece is verified and written, or a fatal disk
    /// failure latched the download.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Number of pieces still missing.
    pub fn pieces_left(&self) -> usize {
        self.pieces_left.load(Ordering::Acquire)
    }

    /// Bytes verified and written so far.
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// Total number of pieces in the torrent.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Takes the fatal disk failure, if one happened.
    pub fn take_failure(&self) -> Option<StorageError> {
        self.state.lock().failure.take()
    }

    #[cfg(test)]
    pub(crate) fn availability_snapshot(&self) -> Vec<u16> {
        self.state.lock().piece_avail.clone()
    }

    #[cfg(test)]
    pub(crate) fn sorted_snapshot(&self) -> (Vec<u32>, bool) {
        let state = self.state.lock();
        (state.sorted_pieces.clone(), state.availability_changed)
    }

    #[cfg(test)]
    pub(crate) fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    #[cfg(test)]
    pub(crate) fn test_with_limits(
        piece_size: u32,
        torrent_size: u64,
        hashes: Vec<Sha1Hash>,
        writer: FileSet,
        max_active: usize,
        request_timeout: Duration,
    ) -> Self {
        Self::with_limits(
            piece_size,
            torrent_size,
            hashes,
            writer,
            max_active,
            request_timeout,
        )
    }
}
