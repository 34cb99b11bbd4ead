//! Shared scene builders and stream helpers

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;

use o3db::archive::records::{ObjectPayload, ObjectRecord, ParamRecord};
use o3db::archive::{read_header, Atom, AtomKind, AtomReader, Decompressor, StringDecoder};
use o3db::scene::{FieldData, FieldType, ObjectId, Pack, PrimitiveType, Semantic, Stream};
use o3db::{Archiver, Compression, Config};

/// Corners of a unit quad, 3 components × 4 elements
pub const POSITIONS: [f32; 12] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];

/// root → child → shape → primitive → stream bank → vertex buffer
pub struct Scene {
    pub pack: Pack,
    pub root: ObjectId,
    pub child: ObjectId,
    pub shape: ObjectId,
    pub primitive: ObjectId,
    pub bank: ObjectId,
    pub buffer: ObjectId,
    pub field: ObjectId,
}

pub fn build_scene() -> Scene {
    let mut pack = Pack::new();

    let root = pack.create_object("Transform").unwrap();
    pack.set_name(root, "root").unwrap();
    let child = pack.create_object("Transform").unwrap();
    pack.set_name(child, "child").unwrap();
    pack.set_parent(child, Some(root)).unwrap();

    let shape = pack.create_object("Shape").unwrap();
    pack.set_name(shape, "quad").unwrap();
    pack.add_shape(child, shape).unwrap();

    let buffer = pack.create_object("VertexBuffer").unwrap();
    pack.set_name(buffer, "positions").unwrap();
    let field = pack.create_field(buffer, FieldType::Float, 3).unwrap();
    pack.allocate_elements(buffer, 4).unwrap();
    let positions = FieldData::Float(POSITIONS.to_vec());
    pack.set_field_data(field, positions).unwrap();

    let bank = pack.create_object("StreamBank").unwrap();
    pack.set_vertex_stream(
        bank,
        Stream {
            field,
            start_index: 0,
            semantic: Semantic::Position,
            semantic_index: 0,
            bound_source: None,
        },
    )
    .unwrap();

    let primitive = pack.create_object("Primitive").unwrap();
    pack.set_primitive_owner(primitive, Some(shape)).unwrap();
    pack.set_stream_bank(primitive, Some(bank)).unwrap();
    {
        let p = pack.get_mut(primitive).unwrap().as_primitive_mut().unwrap();
        p.primitive_type = PrimitiveType::TriangleFan;
        p.number_vertices = 4;
        p.number_primitives = 2;
    }

    Scene {
        pack,
        root,
        child,
        shape,
        primitive,
        bank,
        buffer,
        field,
    }
}

pub fn config(compression: Compression) -> Config {
    Config::builder().compression(compression).build()
}

/// Save `root` into memory
pub fn publish(pack: &Pack, root: ObjectId, compression: Compression) -> Vec<u8> {
    let mut bytes = Vec::new();
    Archiver::new(config(compression))
        .save(pack, root, &mut bytes)
        .unwrap();
    bytes
}

/// Load into a fresh pack
pub fn load(bytes: &[u8]) -> (Pack, ObjectId) {
    let mut pack = Pack::new();
    let root = Archiver::new(Config::default())
        .load(&mut pack, Cursor::new(bytes))
        .unwrap();
    (pack, root)
}

/// Every atom up to and including END_OF_ARCHIVE
pub fn read_atoms(bytes: &[u8]) -> Vec<Atom> {
    let mut cursor = Cursor::new(bytes);
    let header = read_header(&mut cursor).unwrap();
    let mut reader = AtomReader::new(Decompressor::new(cursor, header.compression), 1 << 20);

    let mut atoms = Vec::new();
    loop {
        let atom = reader.read_atom().unwrap();
        let done = atom.kind == AtomKind::EndOfArchive;
        atoms.push(atom);
        if done {
            return atoms;
        }
    }
}

/// An OBJECT atom with its strings resolved
#[derive(Debug, Clone)]
pub struct DecodedObject {
    pub class: String,
    pub name: String,
    pub record: ObjectRecord,
}

impl DecodedObject {
    pub fn id(&self) -> u32 {
        self.record.header.id
    }

    pub fn param(&self) -> Option<&ParamRecord> {
        match &self.record.payload {
            ObjectPayload::Param(p) => Some(p),
            _ => None,
        }
    }
}

/// Atoms in stream order, OBJECT atoms decoded
pub enum Decoded {
    String(String),
    Object(DecodedObject),
    Attachment { owner: u32, attached: Vec<u32> },
    End { root: u32 },
}

pub fn decode_stream(bytes: &[u8]) -> Vec<Decoded> {
    let mut strings = StringDecoder::new();
    let mut out = Vec::new();
    for atom in read_atoms(bytes) {
        let decoded = match atom.kind {
            AtomKind::String => {
                let index = strings.push(atom.decode().unwrap());
                Decoded::String(strings.resolve(index).unwrap().to_string())
            }
            AtomKind::Object => {
                let record: ObjectRecord = atom.decode().unwrap();
                let class = strings.resolve(record.header.type_name).unwrap().to_string();
                let name = record
                    .header
                    .name
                    .map(|i| strings.resolve(i).unwrap().to_string())
                    .unwrap_or_default();
                Decoded::Object(DecodedObject {
                    class,
                    name,
                    record,
                })
            }
            AtomKind::Attachment => {
                let record: o3db::archive::records::AttachmentRecord = atom.decode().unwrap();
                Decoded::Attachment {
                    owner: record.object_ref,
                    attached: record.attachment_refs,
                }
            }
            AtomKind::EndOfArchive => {
                let record: o3db::archive::records::EndOfArchiveRecord = atom.decode().unwrap();
                Decoded::End { root: record.root }
            }
        };
        out.push(decoded);
    }
    out
}

pub fn objects(bytes: &[u8]) -> Vec<DecodedObject> {
    decode_stream(bytes)
        .into_iter()
        .filter_map(|d| match d {
            Decoded::Object(o) => Some(o),
            _ => None,
        })
        .collect()
}

pub fn find_object<'a>(objects: &'a [DecodedObject], name: &str) -> Option<&'a DecodedObject> {
    objects.iter().find(|o| o.name == name)
}

/// Ids an OBJECT record refers to
pub fn references(record: &ObjectRecord) -> Vec<u32> {
    match &record.payload {
        ObjectPayload::Param(p) => [p.owner_ref, p.input_connection_ref, p.object_ref_value]
            .into_iter()
            .flatten()
            .collect(),
        ObjectPayload::VertexSource(v) => v
            .streams
            .iter()
            .flat_map(|s| std::iter::once(s.field_ref).chain(s.bind))
            .collect(),
        ObjectPayload::Primitive(p) => [p.index_buffer_ref, p.stream_bank_ref, p.owner_ref]
            .into_iter()
            .flatten()
            .collect(),
        ObjectPayload::Transform(t) => t.parent_ref.into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Ids an OBJECT record defines (itself plus inlined fields)
pub fn definitions(record: &ObjectRecord) -> Vec<u32> {
    let mut ids = vec![record.header.id];
    if let ObjectPayload::Buffer(b) = &record.payload {
        ids.extend(b.fields.iter().map(|f| f.id));
    }
    ids
}

/// Assert every reference in the stream points backwards
pub fn assert_dependency_order(bytes: &[u8]) {
    let mut defined = HashSet::new();
    for atom in decode_stream(bytes) {
        match atom {
            Decoded::Object(o) => {
                for id in references(&o.record) {
                    assert!(
                        defined.contains(&id),
                        "{} '{}' refers to #{} before it is defined",
                        o.class,
                        o.name,
                        id
                    );
                }
                defined.extend(definitions(&o.record));
            }
            Decoded::Attachment { owner, attached } => {
                assert!(defined.contains(&owner));
                for id in attached {
                    assert!(defined.contains(&id));
                }
            }
            Decoded::End { root } => assert!(defined.contains(&root)),
            Decoded::String(_) => {}
        }
    }
}
