use super::*;
use crate::metainfo::{FileInfo, Sha1Hash};
use crate::scheduler::PieceScheduler;
use crate::storage::FileSet;
use bytes::Bytes;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const BLOCK: u32 = 16384;

#[test]
fn test_handshake_roundtrip() {
    let info_hash = Sha1Hash::digest(b"torrent");
    let handshake = Handshake::new(info_hash, *b"-RT0001-123456789012");

    let encoded = handshake.encode();
    assert_eq!(encoded.len(), 68);
    assert_eq!(encoded[0], 19);
    assert_eq!(&encoded[1..20], b"BitTorrent protocol");

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, info_hash);
    assert_eq!(&decoded.peer_id, b"-RT0001-123456789012");
}

#[test]
fn test_handshake_rejects_wrong_protocol() {
    let mut data = Handshake::new(Sha1Hash::digest(b"x"), [0u8; 20])
        .encode()
        .to_vec();
    data[5] ^= 0xFF;
    assert!(Handshake::decode(&data).is_err());

    assert!(Handshake::decode(&data[..67]).is_err());
}

#[test]
fn test_handshake_ignores_reserved_bits() {
    let mut data = Handshake::new(Sha1Hash::digest(b"x"), [7u8; 20])
        .encode()
        .to_vec();
    // Peers advertising extensions set reserved bits; we must not care.
    data[20] = 0xFF;
    data[27] = 0x05;
    let decoded = Handshake::decode(&data).unwrap();
    assert_eq!(decoded.peer_id, [7u8; 20]);
}

#[test]
fn test_message_roundtrip() {
    let request = Message::Request {
        index: 3,
        begin: 16384,
        length: 16384,
    };
    let encoded = request.encode();
    assert_eq!(encoded.len(), 17);

    match Message::decode(encoded).unwrap() {
        Message::Request {
            index,
            begin,
            length,
        } => {
            assert_eq!((index, begin, length), (3, 16384, 16384));
        }
        other => panic!("unexpected message: {:?}", other),
    }

    match Message::decode(Message::KeepAlive.encode()).unwrap() {
        Message::KeepAlive => {}
        other => panic!("unexpected message: {:?}", other),
    }

    let piece = Message::Piece {
        index: 1,
        begin: 0,
        data: Bytes::from_static(b"block data"),
    };
    match Message::decode(piece.encode()).unwrap() {
        Message::Piece { index, begin, data } => {
            assert_eq!((index, begin), (1, 0));
            assert_eq!(data.as_ref(), b"block data");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_unknown_message_id_is_tolerated() {
    // Fast-extension message id 14 (have-all); we don't speak it.
    let frame = Bytes::from_static(&[0, 0, 0, 1, 14]);
    match Message::decode(frame).unwrap() {
        Message::Unknown { id } => assert_eq!(id, 14),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_bitfield_msb_first() {
    let bf = Bitfield::from_bytes(&Bytes::from_static(&[0b1010_0000]), 4);
    assert!(bf.has_piece(0));
    assert!(!bf.has_piece(1));
    assert!(bf.has_piece(2));
    assert!(!bf.has_piece(3));
    assert_eq!(bf.count(), 2);
}

#[test]
fn test_bitfield_padding_bits_ignored() {
    // 5 pieces in one byte: the low 3 bits are padding and must vanish
    // even when the peer (wrongly) sets them.
    let bf = Bitfield::from_bytes(&Bytes::from_static(&[0b1111_1111]), 5);
    assert_eq!(bf.count(), 5);
    assert!(!bf.has_piece(5));
    assert!(!bf.has_piece(6));
    assert!(!bf.has_piece(7));
    assert_eq!(bf.as_bytes(), &[0b1111_1000]);
}

#[test]
fn test_bitfield_resizes_short_and_long_payloads() {
    let short = Bitfield::from_bytes(&Bytes::from_static(&[0xFF]), 20);
    assert_eq!(short.count(), 8);

    let long = Bitfield::from_bytes(&Bytes::from_static(&[0xFF, 0xFF, 0xFF]), 8);
    assert_eq!(long.count(), 8);
    assert_eq!(long.as_bytes().len(), 1);
}

#[test]
fn test_peer_id_format() {
    let id = PeerId::generate();
    assert_eq!(&id.as_bytes()[..8], b"-RT0001-");
    assert!(id.as_bytes()[8..].iter().all(u8::is_ascii_digit));

    // Stable, not a fresh id per call site access.
    assert_eq!(id.as_bytes(), id.as_bytes());
}

// ---------------------------------------------------------------------------
// Wire-level tests against an in-process remote peer
// ---------------------------------------------------------------------------

fn test_scheduler(data: &[u8], piece_size: u32, dir: &std::path::Path) -> Arc<PieceScheduler> {
    let hashes = data
        .chunks(piece_size as usize)
        .map(Sha1Hash::digest)
        .collect();
    let files = vec![FileInfo {
        path: PathBuf::from("payload.bin"),
        offset: 0,
        length: data.len() as u64,
    }];
    let writer = FileSet::create(&files, dir).unwrap();
    Arc::new(PieceScheduler::new(
        piece_size,
        data.len() as u64,
        hashes,
        writer,
    ))
}

fn v4(addr: SocketAddr) -> SocketAddrV4 {
    match addr {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => panic!("expected an ipv4 listener"),
    }
}

async fn read_frame(stream: &mut TcpStream) -> Option<Message> {
    let mut len_buf = [0u8; 4];
    if stream.read_exact(&mut len_buf).await.is_err() {
        return None;
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&len_buf);
    frame.resize(4 + len, 0);
    if len > 0 && stream.read_exact(&mut frame[4..]).await.is_err() {
        return None;
    }

    Some(Message::decode(Bytes::from(frame)).unwrap())
}

/// A remote peer that seeds `data` over a real socket: handshake,
/// bitfield, unchoke, then answers every request until the client hangs
/// up.
async fn run_seeder(listener: TcpListener, info_hash: Sha1Hash, data: Vec<u8>, piece_size: u32) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut handshake = [0u8; 68];
    stream.read_exact(&mut handshake).await.unwrap();
    let received = Handshake::decode(&handshake).unwrap();
    assert_eq!(received.info_hash, info_hash);

    let reply = Handshake::new(info_hash, *b"-SD0001-000000000000");
    stream.write_all(&reply.encode()).await.unwrap();

    let piece_count = data.len().div_ceil(piece_size as usize);
    let bitfield = Bitfield::full(piece_count);
    let bits = Message::Bitfield(Bytes::copy_from_slice(bitfield.as_bytes()));
    stream.write_all(&bits.encode()).await.unwrap();
    stream.write_all(&Message::Unchoke.encode()).await.unwrap();

    while let Some(message) = read_frame(&mut stream).await {
        if let Message::Request {
            index,
            begin,
            length,
        } = message
        {
            let start = index as usize * piece_size as usize + begin as usize;
            let block = Bytes::copy_from_slice(&data[start..start + length as usize]);
            let piece = Message::Piece {
                index,
                begin,
                data: block,
            };
            stream.write_all(&piece.encode()).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_connection_downloads_from_seeder() {
    let piece_size = 2 * BLOCK;
    let data: Vec<u8> = (0..piece_size as usize + 8192)
        .map(|i| (i % 251) as u8)
        .collect();
    let info_hash = Sha1Hash::digest(b"wire test torrent");

    let dir = tempfile::tempdir().unwrap();
    let scheduler = test_scheduler(&data, piece_size, dir.path());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = v4(listener.local_addr().unwrap());
    let seeder = tokio::spawn(run_seeder(listener, info_hash, data.clone(), piece_size));

    let connection = PeerConnection::new(addr, info_hash, PeerId::generate(), scheduler.clone());

    let transport = connection.connect().await.expect("handshake should pass");
    assert_eq!(connection.state(), PeerState::Connected);

    connection.run(transport).await;

    assert!(scheduler.is_finished());
    assert_eq!(scheduler.pieces_left(), 0);
    assert_eq!(connection.state(), PeerState::Disconnected);
    // The departed peer no longer counts toward availability.
    assert_eq!(scheduler.availability_snapshot(), vec![0, 0]);

    assert_eq!(std::fs::read(dir.path().join("payload.bin")).unwrap(), data);

    seeder.await.unwrap();
}

#[tokio::test]
async fn test_connect_rejects_info_hash_mismatch() {
    let info_hash = Sha1Hash::digest(b"ours");
    let dir = tempfile::tempdir().unwrap();
    let scheduler = test_scheduler(&[0u8; 100], BLOCK, dir.path());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = v4(listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        let reply = Handshake::new(Sha1Hash::digest(b"theirs"), [0u8; 20]);
        stream.write_all(&reply.encode()).await.unwrap();
    });

    let connection = PeerConnection::new(addr, info_hash, PeerId::generate(), scheduler);
    assert!(connection.connect().await.is_none());
    assert_eq!(connection.state(), PeerState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_consumes_retry() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = test_scheduler(&[0u8; 100], BLOCK, dir.path());

    // Bind then drop to get a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = v4(listener.local_addr().unwrap());
    drop(listener);

    let connection = PeerConnection::new(addr, Sha1Hash::digest(b"x"), PeerId::generate(), scheduler);
    assert_eq!(connection.retries_left(), 3);
    assert!(connection.connect().await.is_none());
    assert_eq!(connection.state(), PeerState::Disconnected);
    assert_eq!(connection.retries_left(), 2);
}

#[tokio::test]
async fn test_cancelled_connection_unwinds_availability() {
    let piece_size = BLOCK;
    let data = vec![3u8; 2 * piece_size as usize];
    let info_hash = Sha1Hash::digest(b"abort test");

    let dir = tempfile::tempdir().unwrap();
    let scheduler = test_scheduler(&data, piece_size, dir.path());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = v4(listener.local_addr().unwrap());

    // A peer that advertises everything and then goes silent.
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        let reply = Handshake::new(info_hash, [1u8; 20]);
        stream.write_all(&reply.encode()).await.unwrap();
        let bits = Message::Bitfield(Bytes::copy_from_slice(Bitfield::full(2).as_bytes()));
        stream.write_all(&bits.encode()).await.unwrap();
        // Keep the socket open until the client is torn down.
        let mut sink = [0u8; 64];
        while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
    });

    let connection = Arc::new(PeerConnection::new(
        addr,
        info_hash,
        PeerId::generate(),
        scheduler.clone(),
    ));

    let transport = connection.connect().await.expect("handshake should pass");
    let task = tokio::spawn({
        let connection = connection.clone();
        async move { connection.run(transport).await }
    });

    // Wait until the bitfield registered.
    for _ in 0..50 {
        if scheduler.availability_snapshot() == vec![1, 1] {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(scheduler.availability_snapshot(), vec![1, 1]);

    // Cancelling the task mid-run must still undo the registration.
    task.abort();
    let _ = task.await;
    assert_eq!(scheduler.availability_snapshot(), vec![0, 0]);
}
