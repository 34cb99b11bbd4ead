//! Tests for the stream framer
//!
//! These tests verify:
//! - Magic and stream header layout
//! - Atom framing and payload decoding
//! - Rejection of bad magic, unknown kinds, oversized and truncated atoms

use std::io::Cursor;

use o3db::archive::records::{EndOfArchiveRecord, StreamHeader, StringRecord};
use o3db::archive::{
    read_header, write_header, AtomKind, AtomReader, AtomWriter, ATOM_HEADER_SIZE, MAGIC,
};
use o3db::{ArchiveError, Compression};

// =============================================================================
// Helper Functions
// =============================================================================

fn framed(records: &[(AtomKind, &[u8])]) -> Vec<u8> {
    let mut writer = AtomWriter::new(Vec::new());
    for (kind, payload) in records {
        writer.write_atom(*kind, payload).unwrap();
    }
    writer.into_inner()
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_starts_with_magic() {
    let mut bytes = Vec::new();
    write_header(
        &mut bytes,
        &StreamHeader {
            compression: Compression::Gzip,
        },
    )
    .unwrap();

    assert_eq!(&bytes[..4], b"O3DB");
    assert_eq!(&bytes[..4], &MAGIC.to_le_bytes());

    let header = read_header(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(header.compression, Compression::Gzip);
}

#[test]
fn test_compression_mode_tags() {
    for (mode, tag) in [
        (Compression::None, 0u8),
        (Compression::Gzip, 1),
        (Compression::Lzma, 2),
    ] {
        let mut bytes = Vec::new();
        write_header(&mut bytes, &StreamHeader { compression: mode }).unwrap();
        // magic, u32 length, one varint tag
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(bytes[8], tag);
    }
}

#[test]
fn test_bad_magic_rejected() {
    let bytes = b"PK\x03\x04\x01\x00\x00\x00\x00".to_vec();
    match read_header(&mut Cursor::new(bytes)) {
        Err(ArchiveError::MagicMismatch { found }) => assert_eq!(&found, b"PK\x03\x04"),
        other => panic!("Expected MagicMismatch, got {:?}", other),
    }
}

#[test]
fn test_short_header_is_truncated() {
    let bytes = MAGIC.to_le_bytes()[..3].to_vec();
    match read_header(&mut Cursor::new(bytes)) {
        Err(ArchiveError::TruncatedAtom(_)) => {}
        other => panic!("Expected TruncatedAtom, got {:?}", other),
    }
}

// =============================================================================
// Atom Tests
// =============================================================================

#[test]
fn test_atom_layout() {
    let bytes = framed(&[(AtomKind::Attachment, &[7, 8, 9])]);
    assert_eq!(bytes.len(), ATOM_HEADER_SIZE + 3);
    assert_eq!(bytes[0], 2);
    assert_eq!(&bytes[1..5], &3u32.to_le_bytes());
    assert_eq!(&bytes[5..], &[7, 8, 9]);
}

#[test]
fn test_records_roundtrip_in_order() {
    let mut writer = AtomWriter::new(Vec::new());
    writer
        .write_record(
            AtomKind::String,
            &StringRecord {
                value: Some("Transform".to_string()),
            },
        )
        .unwrap();
    writer
        .write_record(AtomKind::EndOfArchive, &EndOfArchiveRecord { root: 300 })
        .unwrap();
    assert_eq!(writer.atoms_written(), 2);
    let bytes_written = writer.bytes_written();
    let bytes = writer.into_inner();
    assert_eq!(bytes_written, bytes.len() as u64);

    let mut reader = AtomReader::new(Cursor::new(bytes), 1024);
    let first = reader.read_atom().unwrap();
    assert_eq!(first.kind, AtomKind::String);
    let record: StringRecord = first.decode().unwrap();
    assert_eq!(record.value.as_deref(), Some("Transform"));

    let second = reader.read_atom().unwrap();
    assert_eq!(second.kind, AtomKind::EndOfArchive);
    let end: EndOfArchiveRecord = second.decode().unwrap();
    assert_eq!(end.root, 300);
    assert_eq!(reader.atoms_read(), 2);
}

#[test]
fn test_unknown_atom_kind() {
    let mut bytes = framed(&[(AtomKind::Object, &[0])]);
    bytes[0] = 0x07;

    let mut reader = AtomReader::new(Cursor::new(bytes), 1024);
    match reader.read_atom() {
        Err(ArchiveError::MalformedAtom(msg)) => assert!(msg.contains("0x07")),
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }
}

#[test]
fn test_oversized_atom_rejected() {
    let bytes = framed(&[(AtomKind::String, &[0u8; 64])]);
    let mut reader = AtomReader::new(Cursor::new(bytes), 16);
    match reader.read_atom() {
        Err(ArchiveError::MalformedAtom(msg)) => assert!(msg.contains("too large")),
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }
}

#[test]
fn test_truncated_payload() {
    let mut bytes = framed(&[(AtomKind::String, &[1, 2, 3, 4, 5, 6])]);
    bytes.truncate(bytes.len() - 2);

    let mut reader = AtomReader::new(Cursor::new(bytes), 1024);
    match reader.read_atom() {
        Err(ArchiveError::TruncatedAtom(msg)) => assert!(msg.contains("STRING")),
        other => panic!("Expected TruncatedAtom, got {:?}", other),
    }
}

#[test]
fn test_empty_stream_is_truncated() {
    let mut reader = AtomReader::new(Cursor::new(Vec::new()), 1024);
    match reader.read_atom() {
        Err(ArchiveError::TruncatedAtom(_)) => {}
        other => panic!("Expected TruncatedAtom, got {:?}", other),
    }
}

#[test]
fn test_payload_with_trailing_bytes_is_malformed() {
    let bytes = framed(&[(AtomKind::EndOfArchive, &[5, 0, 0])]);
    let mut reader = AtomReader::new(Cursor::new(bytes), 1024);
    let atom = reader.read_atom().unwrap();
    match atom.decode::<EndOfArchiveRecord>() {
        Err(ArchiveError::MalformedAtom(_)) => {}
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }
}
