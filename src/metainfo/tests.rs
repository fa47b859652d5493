use super::*;
use std::path::PathBuf;

fn single_file_torrent() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce35:http://tracker.example.com/announce");
    data.extend_from_slice(b"13:announce-listll35:http://tracker.example.com/announce30:udp://tracker.example.com:6969el25:http://backup.example.orgee");
    data.extend_from_slice(b"4:infod");
    data.extend_from_slice(b"6:lengthi1048576e");
    data.extend_from_slice(b"4:name8:test.bin");
    data.extend_from_slice(b"12:piece lengthi262144e");
    data.extend_from_slice(b"6:pieces80:");
    data.extend_from_slice(&[0xabu8; 80]);
    data.extend_from_slice(b"ee");
    data
}

#[test]
fn test_parse_single_file() {
    let metainfo = Metainfo::from_bytes(&single_file_torrent()).unwrap();

    assert_eq!(metainfo.name, "test.bin");
    assert_eq!(metainfo.announce, "http://tracker.example.com/announce");
    assert_eq!(metainfo.piece_length, 262144);
    assert_eq!(metainfo.piece_count(), 4);
    assert_eq!(metainfo.total_length, 1048576);

    assert_eq!(metainfo.files.len(), 1);
    assert_eq!(metainfo.files[0].path, PathBuf::from("test.bin"));
    assert_eq!(metainfo.files[0].offset, 0);
    assert_eq!(metainfo.files[0].length, 1048576);
}

#[test]
fn test_parse_announce_list_tiers() {
    let metainfo = Metainfo::from_bytes(&single_file_torrent()).unwrap();

    assert_eq!(metainfo.announce_list.len(), 2);
    assert_eq!(metainfo.announce_list[0].len(), 2);
    assert_eq!(
        metainfo.announce_list[1],
        vec!["http://backup.example.org".to_string()]
    );
}

#[test]
fn test_parse_multi_file() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce9:http://t/4:infod");
    data.extend_from_slice(b"5:filesl");
    data.extend_from_slice(b"d6:lengthi100e4:pathl1:a2:bbee");
    data.extend_from_slice(b"d6:lengthi200e4:pathl1:cee");
    data.extend_from_slice(b"e");
    data.extend_from_slice(b"4:name4:dir012:piece lengthi65536e6:pieces20:");
    data.extend_from_slice(&[0u8; 20]);
    data.extend_from_slice(b"ee");

    let metainfo = Metainfo::from_bytes(&data).unwrap();

    assert_eq!(metainfo.total_length, 300);
    assert_eq!(metainfo.files.len(), 2);
    assert_eq!(metainfo.files[0].path, PathBuf::from("dir0/a/bb"));
    assert_eq!(metainfo.files[0].offset, 0);
    assert_eq!(metainfo.files[1].path, PathBuf::from("dir0/c"));
    assert_eq!(metainfo.files[1].offset, 100);
    assert_eq!(metainfo.files[1].length, 200);
}

#[test]
fn test_info_hash_uses_source_bytes() {
    // Known torrent layout with an empty pieces string; the hash covers
    // exactly the bytes of the info dictionary as they appear in the file.
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce35:http://tracker.example.com/announce4:info");
    data.extend_from_slice(
        b"d6:lengthi661651456e4:name31:debian-12.6.0-amd64-netinst.iso12:piece lengthi262144e6:pieces0:e",
    );
    data.extend_from_slice(b"e");

    let metainfo = Metainfo::from_bytes(&data).unwrap();
    assert_eq!(
        metainfo.info_hash.to_hex(),
        "a4040da237a2f9513c4a61f792fb62a05ac9d436"
    );
}

#[test]
fn test_missing_announce() {
    let data = b"d4:infod6:lengthi1e4:name1:x12:piece lengthi16384e6:pieces0:ee";
    assert!(matches!(
        Metainfo::from_bytes(data),
        Err(MetainfoError::MissingField("announce"))
    ));
}

#[test]
fn test_wrong_field_type() {
    let data = b"d8:announcei42e4:infod6:lengthi1e4:name1:x12:piece lengthi16384e6:pieces0:ee";
    assert!(matches!(
        Metainfo::from_bytes(data),
        Err(MetainfoError::FieldType("announce"))
    ));
}

#[test]
fn test_invalid_piece_hashes() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce9:http://t/4:infod");
    data.extend_from_slice(b"6:lengthi1e4:name1:x12:piece lengthi16384e6:pieces19:");
    data.extend_from_slice(&[0u8; 19]);
    data.extend_from_slice(b"ee");

    assert!(matches!(
        Metainfo::from_bytes(&data),
        Err(MetainfoError::InvalidPieceHashes)
    ));
}

#[test]
fn test_no_length_or_files() {
    let data = b"d8:announce9:http://t/4:infod4:name1:x12:piece lengthi16384e6:pieces0:ee";
    assert!(matches!(
        Metainfo::from_bytes(data),
        Err(MetainfoError::InvalidInfoDict)
    ));
}

#[test]
fn test_final_piece_is_short() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce9:http://t/4:infod");
    data.extend_from_slice(b"6:lengthi40000e4:name1:x12:piece lengthi16384e6:pieces60:");
    data.extend_from_slice(&[0u8; 60]);
    data.extend_from_slice(b"ee");

    let metainfo = Metainfo::from_bytes(&data).unwrap();
    assert_eq!(metainfo.piece_size(0), 16384);
    assert_eq!(metainfo.piece_size(1), 16384);
    // 40000 - 2 * 16384
    assert_eq!(metainfo.piece_size(2), 7232);
}

#[test]
fn test_sha1_digest() {
    let hash = Sha1Hash::digest(b"hello");
    assert_eq!(hash.to_hex(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    assert_eq!(hash, Sha1Hash::from_slice(hash.as_bytes()).unwrap());
    assert!(Sha1Hash::from_slice(&[0u8; 19]).is_err());
}

#[test]
fn test_sha1_url_encode() {
    let hash = Sha1Hash::from_bytes([0x12; 20]);
    assert!(hash.url_encode().starts_with("%12%12"));
    assert_eq!(hash.url_encode().len(), 60);
}
