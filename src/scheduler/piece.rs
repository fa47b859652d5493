use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::constants::BLOCK_SIZE;

/// Block bookkeeping for one actively-downloaded piece.
///
/// Received/unreceived blocks are tracked with a partition-by-swap pair of
/// vectors: the first `blocks_left` entries of `remaining` are exactly the
/// block indices not yet received, and `pos_in_remaining[i]` says where
/// block `i` currently sits in `remaining`. Marking a block received is two
/// swaps and a decrement; scanning for a block to request never touches
/// completed blocks.
///
/// Invariant: `block_received(i) ⇔ pos_in_remaining[i] >= blocks_left`.
pub(super) struct Piece {
    size: u32,
    blocks_count: u32,
    blocks_left: u32,
    data: BytesMut,
    remaining: Vec<u16>,
    pos_in_remaining: Vec<u16>,
    last_request: Vec<Option<Instant>>,
    request_timeout: Duration,
}

impl Piece {
    /// Builds the bookkeeping for a piece of `size` bytes, reusing pooled
    /// buffers.
    pub fn new(
        size: u32,
        mut data: BytesMut,
        mut remaining: Vec<u16>,
        mut pos_in_remaining: Vec<u16>,
        request_timeout: Duration,
    ) -> Self {
        let blocks_count = size.div_ceil(BLOCK_SIZE);

        data.clear();
        data.resize(size as usize, 0);

        remaining.clear();
        remaining.extend(0..blocks_count as u16);

        pos_in_remaining.clear();
        pos_in_remaining.extend(0..blocks_count as u16);

        Self {
            size,
            blocks_count,
            blocks_left: blocks_count,
            data,
            remaining,
            pos_in_remaining,
            last_request: vec![None; blocks_count as usize],
            request_timeout,
        }
    }

    pub fn block_received(&self, block: u32) -> bool {
        self.pos_in_remaining[block as usize] as u32 >= self.blocks_left
    }

    pub fn is_complete(&self) -> bool {
        self.blocks_left == 0
    }

    pub fn blocks_left(&self) -> u32 {
        self.blocks_left
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copies a received block into the piece and marks it received.
    /// Duplicate and malformed blocks are ignored.
    pub fn receive_block(&mut self, block_data: &[u8], offset: u32) {
        if offset % BLOCK_SIZE != 0 {
            return;
        }

        let block = offset / BLOCK_SIZE;
        if block >= self.blocks_count || self.block_received(block) {
            return;
        }

        let end = offset as usize + block_data.len();
        if end > self.size as usize {
            return;
        }

        self.data[offset as usize..end].copy_from_slice(block_data);

        // Two swaps move the block past the partition boundary.
        let last = (self.blocks_left - 1) as usize;
        let swapped_block = self.remaining[last] as usize;
        let pos = self.pos_in_remaining[block as usize] as usize;
        self.remaining.swap(pos, last);
        self.pos_in_remaining.swap(block as usize, swapped_block);

        self.blocks_left -= 1;
    }

    /// Picks the first unreceived block that has never been requested or
    /// whose last request has timed out, stamps it, and returns its
    /// `(offset, length)`.
    pub fn request_next_block(&mut self) -> Option<(u32, u32)> {
        let now = Instant::now();

        for i in 0..self.blocks_left as usize {
            let block = self.remaining[i] as u32;

            if let Some(at) = self.last_request[block as usize] {
                if now.duration_since(at) < self.request_timeout {
                    continue;
                }
            }

            self.last_request[block as usize] = Some(now);

            let offset = block * BLOCK_SIZE;
            let length = if block == self.blocks_count - 1 {
                1 + (self.size - 1) % BLOCK_SIZE
            } else {
                BLOCK_SIZE
            };

            return Some((offset, length));
        }

        None
    }

    /// Tears the piece down, handing its pooled buffers back.
    pub fn into_buffers(self) -> (BytesMut, Vec<u16>, Vec<u16>) {
        (self.data, self.remaining, self.pos_in_remaining)
    }
}
