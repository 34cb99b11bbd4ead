//! Tests for the object graph reader
//!
//! These tests verify:
//! - Each error kind on crafted and damaged streams
//! - A failed load leaves the target pack untouched
//! - Declared sizes are bounded before anything is allocated
//! - Index width substitution and its overflow check
//! - Texture reconstruction through the resource collaborators

use std::io::Cursor;
use std::sync::Arc;

use o3db::archive::records::{
    AttachmentRecord, BufferRecord, EndOfArchiveRecord, FieldRecord, ObjectHeader,
    ObjectPayload, ObjectRecord, ParamRecord, StreamHeader, TransformRecord,
};
use o3db::archive::{write_header, AtomKind, AtomWriter, StringEncoder};
use o3db::resource::{Bitmap, ImageBitmapDecoder, MemoryResourceProvider};
use o3db::scene::{
    FieldData, FieldType, ParamValue, RefTarget, ERROR_TEXTURE_URI, ORIGINAL_URI_PARAM,
};
use o3db::{ArchiveError, Archiver, Compression, Config, IndexWidth, Pack};

use crate::common::{build_scene, load, publish};

// =============================================================================
// Helper Functions
// =============================================================================

/// Hand-built NONE-mode archive
fn craft(build: impl FnOnce(&mut AtomWriter<Vec<u8>>, &mut StringEncoder)) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_header(
        &mut bytes,
        &StreamHeader {
            compression: Compression::None,
        },
    )
    .unwrap();
    let mut atoms = AtomWriter::new(bytes);
    let mut strings = StringEncoder::new();
    build(&mut atoms, &mut strings);
    atoms.into_inner()
}

fn write_object(
    atoms: &mut AtomWriter<Vec<u8>>,
    strings: &mut StringEncoder,
    id: u32,
    class: &str,
    payload: ObjectPayload,
) {
    let type_name = strings.intern(atoms, class).unwrap();
    let record = ObjectRecord {
        header: ObjectHeader {
            id,
            type_name,
            name: None,
        },
        payload,
    };
    atoms.write_record(AtomKind::Object, &record).unwrap();
}

fn write_end(atoms: &mut AtomWriter<Vec<u8>>, root: u32) {
    atoms
        .write_record(AtomKind::EndOfArchive, &EndOfArchiveRecord { root })
        .unwrap();
}

fn float_field(id: u32, num_components: u32, values: Vec<f32>) -> FieldRecord {
    FieldRecord {
        id,
        name: None,
        num_components,
        field_type: FieldType::Float,
        value_float: values,
        value_uint: Vec::new(),
        value_byte: None,
    }
}

/// Archive holding a single vertex buffer as its root
fn buffer_archive(num_elements: u32, fields: Vec<FieldRecord>) -> Vec<u8> {
    craft(|atoms, strings| {
        write_object(
            atoms,
            strings,
            1,
            "VertexBuffer",
            ObjectPayload::Buffer(BufferRecord {
                num_elements,
                fields,
            }),
        );
        write_end(atoms, 1);
    })
}

/// Load into a fresh pack, expecting failure; the pack must stay empty
fn load_err(bytes: Vec<u8>, config: Config) -> ArchiveError {
    let mut pack = Pack::new();
    let err = Archiver::new(config)
        .load(&mut pack, Cursor::new(bytes))
        .unwrap_err();
    assert!(pack.is_empty(), "failed load left {} objects", pack.len());
    err
}

fn index_scene(indices: Vec<u32>) -> (Pack, u32) {
    let mut scene = build_scene();
    let pack = &mut scene.pack;
    let buffer = pack.create_object("IndexBuffer").unwrap();
    pack.set_name(buffer, "indices").unwrap();
    pack.allocate_elements(buffer, indices.len() as u32).unwrap();
    let field = pack.object(buffer).unwrap().as_buffer().unwrap().fields[0];
    pack.set_field_data(field, FieldData::UInt32(indices)).unwrap();
    pack.set_index_buffer(scene.primitive, Some(buffer)).unwrap();
    (scene.pack, scene.root)
}

fn loaded_index_data(pack: &Pack) -> FieldData {
    let buffer = pack.objects().find(|o| o.name == "indices").unwrap();
    let field = buffer.as_buffer().unwrap().fields[0];
    pack.object(field).unwrap().as_field().unwrap().data.clone()
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_bad_magic() {
    let scene = build_scene();
    let mut bytes = publish(&scene.pack, scene.root, Compression::None);
    bytes[0] = b'X';
    match load_err(bytes, Config::default()) {
        ArchiveError::MagicMismatch { .. } => {}
        other => panic!("Expected MagicMismatch, got {:?}", other),
    }
}

#[test]
fn test_unknown_type() {
    let bytes = craft(|atoms, strings| {
        write_object(atoms, strings, 1, "Gizmo", ObjectPayload::Empty);
        write_end(atoms, 1);
    });
    match load_err(bytes, Config::default()).root_cause() {
        ArchiveError::UnknownType(class) => assert_eq!(class, "Gizmo"),
        other => panic!("Expected UnknownType, got {:?}", other),
    }
}

#[test]
fn test_unresolved_parent() {
    let bytes = craft(|atoms, strings| {
        write_object(
            atoms,
            strings,
            5,
            "Transform",
            ObjectPayload::Transform(TransformRecord {
                parent_ref: Some(99),
            }),
        );
        write_end(atoms, 5);
    });
    let err = load_err(bytes, Config::default());
    match &err {
        ArchiveError::InObject { id, class, .. } => {
            assert_eq!(*id, 5);
            assert_eq!(class, "Transform");
        }
        other => panic!("Expected InObject, got {:?}", other),
    }
    match err.root_cause() {
        ArchiveError::UnresolvedReference { id, .. } => assert_eq!(*id, 99),
        other => panic!("Expected UnresolvedReference, got {:?}", other),
    }
}

#[test]
fn test_unresolved_attachment() {
    let bytes = craft(|atoms, strings| {
        write_object(
            atoms,
            strings,
            1,
            "Transform",
            ObjectPayload::Transform(TransformRecord::default()),
        );
        atoms
            .write_record(
                AtomKind::Attachment,
                &AttachmentRecord {
                    object_ref: 1,
                    attachment_refs: vec![42],
                },
            )
            .unwrap();
        write_end(atoms, 1);
    });
    match load_err(bytes, Config::default()).root_cause() {
        ArchiveError::UnresolvedReference { id, .. } => assert_eq!(*id, 42),
        other => panic!("Expected UnresolvedReference, got {:?}", other),
    }
}

#[test]
fn test_field_size_mismatch() {
    let bytes = craft(|atoms, strings| {
        let field = FieldRecord {
            id: 2,
            name: None,
            num_components: 3,
            field_type: o3db::scene::FieldType::Float,
            value_float: vec![1.0; 5],
            value_uint: Vec::new(),
            value_byte: None,
        };
        write_object(
            atoms,
            strings,
            1,
            "VertexBuffer",
            ObjectPayload::Buffer(BufferRecord {
                num_elements: 4,
                fields: vec![field],
            }),
        );
        write_end(atoms, 1);
    });
    match load_err(bytes, Config::default()).root_cause() {
        ArchiveError::SizeMismatch {
            expected, found, ..
        } => {
            assert_eq!(*expected, 12);
            assert_eq!(*found, 5);
        }
        other => panic!("Expected SizeMismatch, got {:?}", other),
    }
}

#[test]
fn test_payload_must_match_class() {
    let bytes = craft(|atoms, strings| {
        write_object(atoms, strings, 1, "Transform", ObjectPayload::Empty);
        write_end(atoms, 1);
    });
    match load_err(bytes, Config::default()).root_cause() {
        ArchiveError::MalformedAtom(msg) => assert!(msg.contains("empty")),
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }
}

#[test]
fn test_root_must_be_transform() {
    let bytes = craft(|atoms, strings| {
        write_object(atoms, strings, 1, "Shape", ObjectPayload::Empty);
        write_end(atoms, 1);
    });
    match load_err(bytes, Config::default()) {
        ArchiveError::MalformedAtom(msg) => assert!(msg.contains("Shape")),
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }
}

#[test]
fn test_missing_end_of_archive() {
    let scene = build_scene();
    let bytes = publish(&scene.pack, scene.root, Compression::None);
    // END atom: kind + length + one varint byte for a small root id
    let cut = bytes[..bytes.len() - 6].to_vec();
    match load_err(cut, Config::default()) {
        ArchiveError::TruncatedAtom(_) => {}
        other => panic!("Expected TruncatedAtom, got {:?}", other),
    }
}

#[test]
fn test_truncated_mid_atom() {
    let scene = build_scene();
    let bytes = publish(&scene.pack, scene.root, Compression::None);
    let cut = bytes[..bytes.len() / 2].to_vec();
    match load_err(cut, Config::default()) {
        ArchiveError::TruncatedAtom(_) => {}
        other => panic!("Expected TruncatedAtom, got {:?}", other),
    }
}

#[test]
fn test_failed_load_keeps_existing_objects() {
    let scene = build_scene();
    let bytes = publish(&scene.pack, scene.root, Compression::None);

    let mut pack = Pack::new();
    let keep = pack.create_object("Transform").unwrap();
    let before = pack.len();
    let result = Archiver::new(Config::default())
        .load(&mut pack, Cursor::new(&bytes[..bytes.len() - 6]));
    assert!(result.is_err());
    assert_eq!(pack.len(), before);
    assert!(pack.get(keep).is_some());
}

// =============================================================================
// Size Limit Tests
// =============================================================================

#[test]
fn test_oversized_buffer_rejected() {
    let bytes = buffer_archive(u32::MAX, vec![float_field(2, 1024, Vec::new())]);
    match load_err(bytes, Config::default()).root_cause() {
        ArchiveError::MalformedAtom(msg) => assert!(msg.contains("limit")),
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }
}

#[test]
fn test_buffer_limit_is_configurable() {
    let scene = build_scene();
    let bytes = publish(&scene.pack, scene.root, Compression::None);

    let tight = Config::builder().max_buffer_values(11).build();
    match load_err(bytes.clone(), tight).root_cause() {
        ArchiveError::MalformedAtom(msg) => assert!(msg.contains("12 values")),
        other => panic!("Expected MalformedAtom, got {:?}", other),
    }

    let exact = Config::builder().max_buffer_values(12).build();
    let mut pack = Pack::new();
    assert!(Archiver::new(exact)
        .load(&mut pack, Cursor::new(bytes))
        .is_ok());
}

#[test]
fn test_field_data_checked_before_allocation() {
    let bytes = buffer_archive(1 << 20, vec![float_field(2, 3, vec![1.0; 5])]);
    match load_err(bytes, Config::default()).root_cause() {
        ArchiveError::SizeMismatch {
            expected, found, ..
        } => {
            assert_eq!(*expected, 3 << 20);
            assert_eq!(*found, 5);
        }
        other => panic!("Expected SizeMismatch, got {:?}", other),
    }
}

#[test]
fn test_every_field_needs_data_once_one_has_it() {
    let fields = vec![
        float_field(2, 3, vec![0.5; 12]),
        float_field(3, 2, Vec::new()),
    ];
    match load_err(buffer_archive(4, fields), Config::default()).root_cause() {
        ArchiveError::SizeMismatch {
            expected, found, ..
        } => {
            assert_eq!(*expected, 8);
            assert_eq!(*found, 0);
        }
        other => panic!("Expected SizeMismatch, got {:?}", other),
    }
}

#[test]
fn test_param_array_index_limit() {
    let cases = [
        (Config::default(), 3_000_000),
        (Config::builder().max_array_len(4).build(), 4),
    ];
    for (config, index) in cases {
        let bytes = craft(|atoms, strings| {
            write_object(atoms, strings, 1, "ParamArray", ObjectPayload::Empty);
            write_object(
                atoms,
                strings,
                2,
                "ParamFloat",
                ObjectPayload::Param(ParamRecord {
                    owner_ref: Some(1),
                    index: Some(index),
                    float_value: vec![1.0],
                    ..Default::default()
                }),
            );
            write_end(atoms, 1);
        });
        match load_err(bytes, config).root_cause() {
            ArchiveError::MalformedAtom(msg) => assert!(msg.contains(&index.to_string())),
            other => panic!("Expected MalformedAtom, got {:?}", other),
        }
    }
}

// =============================================================================
// Index Width Tests
// =============================================================================

#[test]
fn test_index_width_narrowing() {
    let (pack, root) = index_scene(vec![0, 1, 2, 65_535]);
    let bytes = publish(&pack, root, Compression::Gzip);

    let narrow = Config::builder().index_width(IndexWidth::U16).build();
    let mut loaded = Pack::new();
    Archiver::new(narrow)
        .load(&mut loaded, Cursor::new(&bytes))
        .unwrap();
    assert_eq!(
        loaded_index_data(&loaded),
        FieldData::UInt16(vec![0, 1, 2, 65_535])
    );

    let (wide, _) = load(&bytes);
    assert_eq!(
        loaded_index_data(&wide),
        FieldData::UInt32(vec![0, 1, 2, 65_535])
    );
}

#[test]
fn test_index_width_overflow() {
    let (pack, root) = index_scene(vec![0, 1, 70_000]);
    let bytes = publish(&pack, root, Compression::None);

    let narrow = Config::builder().index_width(IndexWidth::U16).build();
    match load_err(bytes, narrow).root_cause() {
        ArchiveError::IndexOverflow { value } => assert_eq!(*value, 70_000),
        other => panic!("Expected IndexOverflow, got {:?}", other),
    }
}

// =============================================================================
// Texture Tests
// =============================================================================

#[test]
fn test_error_texture_uri() {
    let mut scene = build_scene();
    let pack = &mut scene.pack;
    let error = pack.error_texture().unwrap();
    let slot = pack.create_param(scene.root, "diffuse", "ParamTexture").unwrap();
    pack.set_param_value(
        slot,
        ParamValue::Ref {
            target: RefTarget::Texture,
            value: Some(error),
        },
    )
    .unwrap();

    let bytes = publish(pack, scene.root, Compression::Lzma);
    let (mut loaded, root) = load(&bytes);

    let slot = loaded.param(root, "diffuse").unwrap();
    let texture = match loaded.param_value(slot) {
        Some(ParamValue::Ref {
            value: Some(id), ..
        }) => *id,
        other => panic!("Expected texture ref, got {:?}", other),
    };
    assert_eq!(loaded.error_texture().unwrap(), texture);
    let uri = loaded.param(texture, ORIGINAL_URI_PARAM).unwrap();
    assert_eq!(
        loaded.param_value(uri),
        Some(&ParamValue::String(ERROR_TEXTURE_URI.to_string()))
    );
}

#[test]
fn test_shared_error_texture_left_untouched() {
    let mut scene = build_scene();
    let pack = &mut scene.pack;
    let error = pack.error_texture().unwrap();
    pack.set_name(error, "archived").unwrap();
    let tint = pack.create_param(error, "tint", "ParamFloat").unwrap();
    pack.set_param_value(tint, ParamValue::Float(0.5)).unwrap();
    let slot = pack.create_param(scene.root, "diffuse", "ParamTexture").unwrap();
    pack.set_param_value(
        slot,
        ParamValue::Ref {
            target: RefTarget::Texture,
            value: Some(error),
        },
    )
    .unwrap();
    let bytes = publish(pack, scene.root, Compression::None);

    let mut target = Pack::new();
    let placeholder = target.error_texture().unwrap();
    let root = Archiver::new(Config::default())
        .load(&mut target, Cursor::new(bytes))
        .unwrap();

    let slot = target.param(root, "diffuse").unwrap();
    match target.param_value(slot) {
        Some(ParamValue::Ref { value, .. }) => assert_eq!(*value, Some(placeholder)),
        other => panic!("Expected texture ref, got {:?}", other),
    }
    let texture = target.object(placeholder).unwrap();
    assert_eq!(texture.name, "error");
    assert!(texture.param("tint").is_none());
}

#[test]
fn test_texture_from_resource_provider() {
    let mut scene = build_scene();
    let pack = &mut scene.pack;
    let brick = Bitmap::solid(4, 2, [10, 20, 30, 255]);
    let texture = pack
        .create_texture_from_bitmaps(&[brick], "textures/brick.png")
        .unwrap();
    pack.set_name(texture, "brick").unwrap();
    let slot = pack.create_param(scene.root, "diffuse", "ParamTexture").unwrap();
    pack.set_param_value(
        slot,
        ParamValue::Ref {
            target: RefTarget::Texture,
            value: Some(texture),
        },
    )
    .unwrap();
    let bytes = publish(pack, scene.root, Compression::Gzip);

    let image = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, image::ImageFormat::Png).unwrap();

    let provider = MemoryResourceProvider::new();
    provider.insert("textures/brick.png", png.into_inner());
    let archiver = Archiver::with_resources(
        Config::default(),
        Arc::new(provider),
        Arc::new(ImageBitmapDecoder),
    );

    let mut loaded = Pack::new();
    let root = archiver.load(&mut loaded, Cursor::new(&bytes)).unwrap();
    let slot = loaded.param(root, "diffuse").unwrap();
    let id = match loaded.param_value(slot) {
        Some(ParamValue::Ref {
            value: Some(id), ..
        }) => *id,
        other => panic!("Expected texture ref, got {:?}", other),
    };

    let object = loaded.object(id).unwrap();
    assert_eq!(object.class, "Texture2D");
    assert_eq!(object.name, "brick");
    let texture = object.as_texture().unwrap();
    assert_eq!((texture.width, texture.height, texture.faces), (4, 2, 1));
}

#[test]
fn test_missing_resource() {
    let mut scene = build_scene();
    let pack = &mut scene.pack;
    let texture = pack
        .create_texture_from_bitmaps(&[Bitmap::solid(1, 1, [0, 0, 0, 255])], "missing.png")
        .unwrap();
    let slot = pack.create_param(scene.root, "diffuse", "ParamTexture").unwrap();
    pack.set_param_value(
        slot,
        ParamValue::Ref {
            target: RefTarget::Texture,
            value: Some(texture),
        },
    )
    .unwrap();
    let bytes = publish(pack, scene.root, Compression::None);

    let archiver = Archiver::with_resources(
        Config::default(),
        Arc::new(MemoryResourceProvider::new()),
        Arc::new(ImageBitmapDecoder),
    );
    let mut loaded = Pack::new();
    let err = archiver
        .load(&mut loaded, Cursor::new(&bytes))
        .unwrap_err();
    assert!(matches!(err.root_cause(), ArchiveError::Resource(_)));
    assert!(loaded.is_empty());
}
