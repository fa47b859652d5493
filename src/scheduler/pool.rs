use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

/// Fixed-capacity pools for piece buffers and block-index vectors.
///
/// The scheduler bounds how many pieces are in flight, so both pools are
/// sized once up front: one piece buffer per active piece and two index
/// vectors (remaining blocks + positions) per active piece. Slots start
/// empty and grow to their working size on first use; returned buffers
/// keep their capacity, so steady-state memory is proportional to the
/// number of pieces actually in flight, never more than the cap.
pub struct BufferPool {
    piece_buffers: ArrayQueue<BytesMut>,
    index_vecs: ArrayQueue<Vec<u16>>,
}

impl BufferPool {
    /// Creates pools for at most `capacity` concurrently active pieces.
    pub fn new(capacity: usize) -> Self {
        let pool = Self {
            piece_buffers: ArrayQueue::new(capacity),
            index_vecs: ArrayQueue::new(2 * capacity),
        };

        for _ in 0..capacity {
            let _ = pool.piece_buffers.push(BytesMut::new());
        }
        for _ in 0..2 * capacity {
            let _ = pool.index_vecs.push(Vec::new());
        }

        pool
    }

    /// Takes a piece buffer, or `None` when the pool is exhausted.
    pub fn get_piece_buffer(&self) -> Option<BytesMut> {
        self.piece_buffers.pop()
    }

    pub fn return_piece_buffer(&self, mut buf: BytesMut) {
        buf.clear();
        let _ = self.piece_buffers.push(buf);
    }

    /// Takes a block-index vector, or `None` when the pool is exhausted.
    pub fn get_index_vec(&self) -> Option<Vec<u16>> {
        self.index_vecs.pop()
    }

    pub fn return_index_vec(&self, mut vec: Vec<u16>) {
        vec.clear();
        let _ = self.index_vecs.push(vec);
    }

    pub fn piece_buffers_available(&self) -> usize {
        self.piece_buffers.len()
    }

    pub fn index_vecs_available(&self) -> usize {
        self.index_vecs.len()
    }
}
