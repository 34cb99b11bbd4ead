//! Tests for the compression adapter
//!
//! These tests verify:
//! - Every mode round-trips arbitrary bytes
//! - The header stays raw and names the mode
//! - Corrupt compressed data surfaces as a compression failure

use std::io::{Cursor, Read, Write};
use std::str::FromStr;

use o3db::archive::{Compressor, Decompressor};
use o3db::scene::Pack;
use o3db::{ArchiveError, Archiver, Compression, Config};

use crate::common::{build_scene, config, load, objects, publish};

// =============================================================================
// Helper Functions
// =============================================================================

fn compress(data: &[u8], mode: Compression) -> Vec<u8> {
    let mut compressor = Compressor::new(Vec::new(), mode, &Config::default());
    compressor.write_all(data).unwrap();
    compressor.finish().unwrap()
}

fn decompress(data: &[u8], mode: Compression) -> Vec<u8> {
    let mut out = Vec::new();
    Decompressor::new(Cursor::new(data), mode)
        .read_to_end(&mut out)
        .unwrap();
    out
}

const MODES: [Compression; 3] = [Compression::None, Compression::Gzip, Compression::Lzma];

// =============================================================================
// Adapter Tests
// =============================================================================

#[test]
fn test_modes_roundtrip_bytes() {
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    for mode in MODES {
        let compressed = compress(&data, mode);
        assert_eq!(decompress(&compressed, mode), data, "mode {}", mode);
    }
}

#[test]
fn test_none_is_passthrough() {
    let data = b"not compressed".to_vec();
    assert_eq!(compress(&data, Compression::None), data);
}

#[test]
fn test_container_signatures() {
    let gzip = compress(b"abc", Compression::Gzip);
    assert_eq!(&gzip[..2], &[0x1f, 0x8b]);

    let xz = compress(b"abc", Compression::Lzma);
    assert_eq!(&xz[..6], &[0xfd, b'7', b'z', b'X', b'Z', 0x00]);
}

#[test]
fn test_mode_names() {
    assert_eq!(Compression::from_str("none").unwrap(), Compression::None);
    assert_eq!(Compression::from_str("GZIP").unwrap(), Compression::Gzip);
    assert_eq!(Compression::from_str("xz").unwrap(), Compression::Lzma);
    assert!(matches!(
        Compression::from_str("zip"),
        Err(ArchiveError::Compression(_))
    ));
    assert_eq!(Compression::Lzma.to_string(), "lzma");
}

// =============================================================================
// Archive Tests
// =============================================================================

#[test]
fn test_every_mode_loads_the_same_graph() {
    let scene = build_scene();
    let mut object_counts = Vec::new();

    for mode in MODES {
        let bytes = publish(&scene.pack, scene.root, mode);
        assert_eq!(&bytes[..4], b"O3DB", "header stays raw under {}", mode);

        let (pack, root) = load(&bytes);
        assert_eq!(pack.object(root).unwrap().name, "root");
        object_counts.push(pack.len());
    }
    assert!(object_counts.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_identical_atoms_in_every_mode() {
    let scene = build_scene();
    let plain = objects(&publish(&scene.pack, scene.root, Compression::None));
    for mode in [Compression::Gzip, Compression::Lzma] {
        let other = objects(&publish(&scene.pack, scene.root, mode));
        assert_eq!(plain.len(), other.len());
        for (a, b) in plain.iter().zip(&other) {
            assert_eq!(a.record, b.record);
        }
    }
}

#[test]
fn test_compressed_archive_is_smaller() {
    let mut scene = build_scene();
    for i in 0..200 {
        let param = scene
            .pack
            .create_param(scene.root, &format!("weight{}", i), "ParamFloat")
            .unwrap();
        scene
            .pack
            .set_param_value(param, o3db::scene::ParamValue::Float(0.5))
            .unwrap();
    }

    let plain = publish(&scene.pack, scene.root, Compression::None).len();
    let lzma = publish(&scene.pack, scene.root, Compression::Lzma).len();
    let gzip = publish(&scene.pack, scene.root, Compression::Gzip).len();
    assert!(gzip < plain);
    assert!(lzma < plain);
}

#[test]
fn test_corrupt_body_is_compression_failure() {
    for mode in [Compression::Gzip, Compression::Lzma] {
        let scene = build_scene();
        let mut bytes = publish(&scene.pack, scene.root, mode);
        // magic + length + one-byte header
        let body = 9;
        for b in bytes[body..].iter_mut() {
            *b = 0xAB;
        }

        let mut pack = Pack::new();
        match Archiver::new(config(mode)).load(&mut pack, Cursor::new(bytes)) {
            Err(ArchiveError::Compression(_)) => {}
            other => panic!("Expected Compression under {}, got {:?}", mode, other),
        }
        assert!(pack.is_empty());
    }
}
