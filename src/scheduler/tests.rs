use super::*;
use crate::metainfo::{FileInfo, Sha1Hash};
use crate::peer::Bitfield;
use crate::storage::FileSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BLOCK: u32 = 16384;

/// Deterministic payload so piece hashes are reproducible.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}

fn piece_hashes(data: &[u8], piece_size: u32) -> Vec<Sha1Hash> {
    data.chunks(piece_size as usize).map(Sha1Hash::digest).collect()
}

fn file_set(dir: &Path, sizes: &[u64]) -> FileSet {
    let mut offset = 0;
    let infos: Vec<FileInfo> = sizes
        .iter()
        .enumerate()
        .map(|(i, &length)| {
            let info = FileInfo {
                path: PathBuf::from(format!("file{}", i)),
                offset,
                length,
            };
            offset += length;
            info
        })
        .collect();
    FileSet::create(&infos, dir).unwrap()
}

fn read_files(dir: &Path, count: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..count {
        data.extend(std::fs::read(dir.join(format!("file{}", i))).unwrap());
    }
    data
}

fn only_piece(count: usize, index: usize) -> Bitfield {
    let mut bf = Bitfield::new(count);
    bf.set_piece(index);
    bf
}

#[test]
fn test_availability_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let data = payload(4 * BLOCK as usize);
    let scheduler = PieceScheduler::new(
        BLOCK,
        data.len() as u64,
        piece_hashes(&data, BLOCK),
        file_set(dir.path(), &[data.len() as u64]),
    );

    let mut bf = Bitfield::new(4);
    bf.set_piece(1);
    bf.set_piece(3);

    scheduler.add_peer_bitfield(&bf);
    assert_eq!(scheduler.availability_snapshot(), vec![0, 1, 0, 1]);

    scheduler.remove_peer_bitfield(&bf);
    assert_eq!(scheduler.availability_snapshot(), vec![0, 0, 0, 0]);
}

#[test]
fn test_rarest_piece_requested_first() {
    let dir = tempfile::tempdir().unwrap();
    let piece_size = BLOCK;
    let data = payload(4 * piece_size as usize);
    let scheduler = PieceScheduler::new(
        piece_size,
        data.len() as u64,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &[data.len() as u64]),
    );

    let everything = Bitfield::full(4);
    scheduler.add_peer_bitfield(&everything);
    scheduler.add_peer_bitfield(&only_piece(4, 2));

    // Piece 2 is held by two peers, the rest by one; a rarer piece wins.
    let request = scheduler.request_next_block(&everything).unwrap();
    assert_ne!(request.piece_index, 2);

    let (sorted, dirty) = scheduler.sorted_snapshot();
    assert!(!dirty);
    let avail = scheduler.availability_snapshot();
    for pair in sorted.windows(2) {
        assert!(avail[pair[0] as usize] <= avail[pair[1] as usize]);
    }
}

#[test]
fn test_incremental_sort_repair() {
    let dir = tempfile::tempdir().unwrap();
    let piece_size = BLOCK;
    let data = payload(8 * piece_size as usize);
    let scheduler = PieceScheduler::new(
        piece_size,
        data.len() as u64,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &[data.len() as u64]),
    );

    let everything = Bitfield::full(8);
    scheduler.add_peer_bitfield(&everything);
    // Sort once so the incremental repair path is the one exercised.
    scheduler.request_next_block(&everything).unwrap();

    for &piece in &[3u32, 3, 5, 0, 3, 7, 7, 1] {
        scheduler.add_available_piece(piece);

        let (sorted, dirty) = scheduler.sorted_snapshot();
        assert!(!dirty);

        let mut seen = sorted.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>(), "not a permutation");

        let avail = scheduler.availability_snapshot();
        for pair in sorted.windows(2) {
            assert!(
                avail[pair[0] as usize] <= avail[pair[1] as usize],
                "sorted order broken after add_available_piece({})",
                piece
            );
        }
    }
}

#[test]
fn test_blocks_not_reoffered_until_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let piece_size = 2 * BLOCK;
    let data = payload(piece_size as usize);
    let scheduler = PieceScheduler::test_with_limits(
        piece_size,
        data.len() as u64,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &[data.len() as u64]),
        4,
        Duration::from_millis(50),
    );

    let everything = Bitfield::full(1);
    scheduler.add_peer_bitfield(&everything);

    let first = scheduler.request_next_block(&everything).unwrap();
    let second = scheduler.request_next_block(&everything).unwrap();
    assert_ne!(first.offset, second.offset);
    assert!(scheduler.request_next_block(&everything).is_none());

    // After the request timeout both blocks are offerable again.
    std::thread::sleep(Duration::from_millis(60));
    assert!(scheduler.request_next_block(&everything).is_some());
}

#[test]
fn test_final_block_of_final_piece_is_short() {
    let dir = tempfile::tempdir().unwrap();
    // One piece of 1.25 blocks.
    let total = BLOCK as u64 + 4096;
    let data = payload(total as usize);
    let scheduler = PieceScheduler::new(
        BLOCK * 2,
        total,
        piece_hashes(&data, BLOCK * 2),
        file_set(dir.path(), &[total]),
    );

    let everything = Bitfield::full(1);
    scheduler.add_peer_bitfield(&everything);

    let first = scheduler.request_next_block(&everything).unwrap();
    assert_eq!((first.offset, first.length), (0, BLOCK));
    let second = scheduler.request_next_block(&everything).unwrap();
    assert_eq!((second.offset, second.length), (BLOCK, 4096));
}

#[test]
fn test_active_piece_cap() {
    let dir = tempfile::tempdir().unwrap();
    let piece_size = BLOCK;
    let data = payload(2 * piece_size as usize);
    let scheduler = PieceScheduler::test_with_limits(
        piece_size,
        data.len() as u64,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &[data.len() as u64]),
        1,
        Duration::ZERO,
    );

    scheduler.add_peer_bitfield(&Bitfield::full(2));

    let request = scheduler.request_next_block(&only_piece(2, 0)).unwrap();
    assert_eq!(request.piece_index, 0);
    assert_eq!(scheduler.active_count(), 1);

    // The cap keeps piece 1 out until piece 0 resolves.
    assert!(scheduler.request_next_block(&only_piece(2, 1)).is_none());

    scheduler.receive_block(0, 0, &data[..piece_size as usize]);
    assert_eq!(scheduler.active_count(), 0);
    assert!(scheduler.request_next_block(&only_piece(2, 1)).is_some());
}

#[test]
fn test_duplicate_block_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let piece_size = 2 * BLOCK;
    let data = payload(piece_size as usize);
    let scheduler = PieceScheduler::new(
        piece_size,
        data.len() as u64,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &[data.len() as u64]),
    );

    let everything = Bitfield::full(1);
    scheduler.add_peer_bitfield(&everything);
    scheduler.request_next_block(&everything).unwrap();

    scheduler.receive_block(0, 0, &data[..BLOCK as usize]);
    // A second copy with different bytes must not clobber the first.
    scheduler.receive_block(0, 0, &vec![0xFF; BLOCK as usize]);
    assert!(!scheduler.is_finished());

    scheduler.receive_block(0, BLOCK, &data[BLOCK as usize..]);
    assert!(scheduler.is_finished());
    assert_eq!(read_files(dir.path(), 1), data);
}

#[test]
fn test_hash_mismatch_discards_piece() {
    let dir = tempfile::tempdir().unwrap();
    // A 6-block piece spanning three files.
    let piece_size = 6 * BLOCK;
    let data = payload(piece_size as usize);
    let sizes = [2 * BLOCK as u64, BLOCK as u64, 3 * BLOCK as u64];
    let scheduler = PieceScheduler::test_with_limits(
        piece_size,
        data.len() as u64,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &sizes),
        4,
        Duration::ZERO,
    );

    let everything = Bitfield::full(1);
    scheduler.add_peer_bitfield(&everything);
    scheduler.request_next_block(&everything).unwrap();

    // Blocks 0-4 intact, block 5 with its first byte flipped.
    for block in 0..5u32 {
        let offset = block * BLOCK;
        scheduler.receive_block(0, offset, &data[offset as usize..(offset + BLOCK) as usize]);
    }
    let mut corrupt = data[5 * BLOCK as usize..].to_vec();
    corrupt[0] ^= 0xFF;
    scheduler.receive_block(0, 5 * BLOCK, &corrupt);

    // Discarded: nothing written, nothing completed.
    assert!(!scheduler.is_finished());
    assert_eq!(scheduler.pieces_left(), 1);
    assert_eq!(scheduler.downloaded_bytes(), 0);
    for i in 0..3 {
        let len = std::fs::metadata(dir.path().join(format!("file{}", i)))
            .unwrap()
            .len();
        assert_eq!(len, 0, "file{} written despite hash mismatch", i);
    }

    // The piece can be fetched again and completes cleanly.
    scheduler.request_next_block(&everything).unwrap();
    for block in 0..6u32 {
        let offset = block * BLOCK;
        scheduler.receive_block(0, offset, &data[offset as usize..(offset + BLOCK) as usize]);
    }
    assert!(scheduler.is_finished());
    assert_eq!(read_files(dir.path(), 3), data);
}

#[test]
fn test_multi_piece_multi_file_out_of_order() {
    let dir = tempfile::tempdir().unwrap();
    // Three files of 2, 4 and 5.25 blocks, 2-block pieces: six pieces with
    // a short final piece whose final block is short too.
    let sizes = [
        2 * BLOCK as u64,
        4 * BLOCK as u64,
        5 * BLOCK as u64 + BLOCK as u64 / 4,
    ];
    let total: u64 = sizes.iter().sum();
    let piece_size = 2 * BLOCK;
    let data = payload(total as usize);
    let scheduler = PieceScheduler::test_with_limits(
        piece_size,
        total,
        piece_hashes(&data, piece_size),
        file_set(dir.path(), &sizes),
        8,
        Duration::ZERO,
    );

    let piece_count = scheduler.piece_count();
    assert_eq!(piece_count, 6);

    scheduler.add_peer_bitfield(&Bitfield::full(piece_count));

    // Activate every piece, then deliver all blocks out of order: last
    // piece first, second block of each piece before the first.
    for p in (0..piece_count).rev() {
        let request = scheduler
            .request_next_block(&only_piece(piece_count, p))
            .unwrap();
        assert_eq!(request.piece_index as usize, p);
    }

    for p in (0..piece_count as u32).rev() {
        let piece_start = p as u64 * piece_size as u64;
        let piece_len = (total - piece_start).min(piece_size as u64) as u32;
        let block_count = piece_len.div_ceil(BLOCK);

        for b in (0..block_count).rev() {
            let offset = b * BLOCK;
            let len = (piece_len - offset).min(BLOCK);
            let start = (piece_start + offset as u64) as usize;
            scheduler.receive_block(p, offset, &data[start..start + len as usize]);
        }
    }

    assert!(scheduler.is_finished());
    assert_eq!(scheduler.pieces_left(), 0);
    assert_eq!(scheduler.downloaded_bytes(), total);
    assert_eq!(scheduler.active_count(), 0);
    assert_eq!(read_files(dir.path(), 3), data);
}

#[test]
fn test_block_for_inactive_piece_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let data = payload(BLOCK as usize);
    let scheduler = PieceScheduler::new(
        BLOCK,
        data.len() as u64,
        piece_hashes(&data, BLOCK),
        file_set(dir.path(), &[data.len() as u64]),
    );

    // Never requested: the block is dropped on the floor.
    scheduler.receive_block(0, 0, &data);
    assert!(!scheduler.is_finished());
    assert_eq!(scheduler.pieces_left(), 1);
}
