//! Object graph reader
//!
//! Consumes atoms in stream order and rebuilds each object through the
//! class registry. Archive ids are mapped to the fresh ids of the target
//! pack; because the writer emits dependencies first, every reference must
//! already be in that table when it is seen.

use std::collections::HashMap;
use std::io::Read;

use crate::config::{Config, IndexWidth};
use crate::error::{ArchiveError, Result};
use crate::math::{Matrix4, MatrixEncoding, RAW_LEN};
use crate::resource::{BitmapDecoder, ResourceProvider};
use crate::scene::{
    BufferKind, ClassInfo, CurveKey, CurveKeyKind, FieldData, FieldType, Influence, ObjectId,
    ObjectKind, Pack, ParamValue, Stream, ERROR_TEXTURE_URI,
};

use super::framer::{AtomKind, AtomReader};
use super::records::{
    AttachmentRecord, BufferRecord, CurveRecord, EffectRecord, EndOfArchiveRecord, FieldRecord,
    KeyType, ObjectPayload, ObjectRecord, ParamRecord, PrimitiveRecord, SkinRecord,
    TextureRecord, TransformRecord, VertexSourceRecord,
};
use super::strings::StringDecoder;

/// Rebuilds one archive into a pack
pub struct ObjectGraphReader<'a, R: Read> {
    pack: &'a mut Pack,
    atoms: AtomReader<R>,
    resources: &'a dyn ResourceProvider,
    decoder: &'a dyn BitmapDecoder,
    index_width: IndexWidth,
    max_buffer_values: u64,
    max_array_len: u32,
    /// First id created by this load; older objects are shared
    checkpoint: ObjectId,
    strings: StringDecoder,
    classes: HashMap<&'static str, ClassInfo>,
    /// Archive id → id in `pack`
    objects: HashMap<u32, ObjectId>,
}

impl<'a, R: Read> ObjectGraphReader<'a, R> {
    pub fn new(
        pack: &'a mut Pack,
        atoms: AtomReader<R>,
        resources: &'a dyn ResourceProvider,
        decoder: &'a dyn BitmapDecoder,
        config: &Config,
    ) -> Self {
        Self {
            pack,
            atoms,
            resources,
            decoder,
            index_width: config.index_width,
            max_buffer_values: config.max_buffer_values,
            max_array_len: config.max_array_len,
            checkpoint: 0,
            strings: StringDecoder::new(),
            classes: HashMap::new(),
            objects: HashMap::new(),
        }
    }

    /// Read atoms until END_OF_ARCHIVE and return the new root transform.
    /// On failure every object created by this load is removed again.
    pub fn load(mut self) -> Result<ObjectId> {
        self.classes = self
            .pack
            .registry()
            .classes()
            .iter()
            .map(|info| (info.name, info.clone()))
            .collect();

        self.checkpoint = self.pack.checkpoint();
        match self.receive_all() {
            Ok(root) => {
                tracing::debug!(
                    "Loaded root #{}: {} objects, {} strings, {} atoms",
                    root,
                    self.objects.len(),
                    self.strings.len(),
                    self.atoms.atoms_read()
                );
                Ok(root)
            }
            Err(e) => {
                let discarded = self.pack.rollback(self.checkpoint);
                tracing::error!(
                    "Load failed after {} atoms, discarded {} objects: {}",
                    self.atoms.atoms_read(),
                    discarded,
                    e
                );
                Err(e)
            }
        }
    }

    fn receive_all(&mut self) -> Result<ObjectId> {
        loop {
            let atom = self.atoms.read_atom()?;
            match atom.kind {
                AtomKind::String => {
                    self.strings.push(atom.decode()?);
                }
                AtomKind::Object => self.receive_object(atom.decode()?)?,
                AtomKind::Attachment => self.receive_attachment(atom.decode()?)?,
                AtomKind::EndOfArchive => {
                    let end: EndOfArchiveRecord = atom.decode()?;
                    let root = self.resolve(end.root, "root")?;
                    let object = self.pack.object(root)?;
                    if object.kind() != ObjectKind::Transform {
                        return Err(ArchiveError::MalformedAtom(format!(
                            "root #{} is a {}, expected a Transform",
                            end.root, object.class
                        )));
                    }
                    return Ok(root);
                }
            }
        }
    }

    fn resolve(&self, archived: u32, what: &'static str) -> Result<ObjectId> {
        self.objects
            .get(&archived)
            .copied()
            .ok_or(ArchiveError::UnresolvedReference { what, id: archived })
    }

    fn register(&mut self, archived: u32, id: ObjectId) -> Result<()> {
        if self.objects.insert(archived, id).is_some() {
            return Err(ArchiveError::MalformedAtom(format!(
                "object id {} defined twice",
                archived
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Atoms
    // =========================================================================

    fn receive_object(&mut self, record: ObjectRecord) -> Result<()> {
        let ObjectRecord { header, payload } = record;
        let class = self.strings.resolve(header.type_name)?.to_string();
        let info = self
            .classes
            .get(class.as_str())
            .cloned()
            .ok_or_else(|| ArchiveError::UnknownType(class.clone()))?;
        let name = match header.name {
            Some(index) => self.strings.resolve(index)?.to_string(),
            None => String::new(),
        };
        tracing::trace!("Receiving #{} ({} '{}')", header.id, class, name);

        let result = match (info.kind, payload) {
            (ObjectKind::Param, ObjectPayload::Param(param)) => {
                self.receive_param(&info, &name, header.id, param)
            }
            (ObjectKind::Texture, ObjectPayload::Texture(texture)) => {
                self.receive_texture(&info, &name, header.id, texture)
            }
            (ObjectKind::Field, _) => Err(ArchiveError::MalformedAtom(
                "fields are only archived inside their buffer".to_string(),
            )),
            (ObjectKind::Param, payload) | (ObjectKind::Texture, payload) => {
                Err(payload_mismatch(info.kind, &payload))
            }
            (kind, payload) => {
                let id = self.pack.create_object(info.name)?;
                self.register(header.id, id)?;
                self.pack.set_name(id, name.as_str())?;
                self.receive_body(id, kind, payload)
            }
        };
        result.map_err(|e| e.in_object(header.id, &class, &name))
    }

    fn receive_attachment(&mut self, record: AttachmentRecord) -> Result<()> {
        let transform = self.resolve(record.object_ref, "attachment owner")?;
        let object = self.pack.object(transform)?;
        if object.kind() != ObjectKind::Transform {
            return Err(ArchiveError::MalformedAtom(format!(
                "attachment recipient #{} is a {}",
                record.object_ref, object.class
            )));
        }

        for archived in record.attachment_refs {
            let shape = self.resolve(archived, "attachment")?;
            let kind = self.pack.object(shape)?.kind();
            if kind != ObjectKind::Shape {
                return Err(ArchiveError::UnsupportedValueKind(format!(
                    "attachment #{} targeting a Transform is a {:?}",
                    archived, kind
                )));
            }
            self.pack.add_shape(transform, shape)?;
        }
        Ok(())
    }

    // =========================================================================
    // Params
    // =========================================================================

    /// Params are created through their owner so construction-time params
    /// are reused rather than duplicated
    fn receive_param(
        &mut self,
        info: &ClassInfo,
        name: &str,
        archived: u32,
        record: ParamRecord,
    ) -> Result<()> {
        let id = match record.owner_ref {
            Some(owner_ref) => {
                let owner = self.resolve(owner_ref, "param owner")?;
                let owner_object = self.pack.object(owner)?;
                let owner_kind = owner_object.kind();
                let owner_class = owner_object.class;
                let is_param_object = owner_object.params.is_some();
                let existing = owner_object.param(name);

                if owner < self.checkpoint {
                    // Shared placeholder from outside this load: reference
                    // its params but leave them as they are
                    if let Some(existing) = existing {
                        return self.register(archived, existing);
                    }
                    let id = self.pack.create_object(info.name)?;
                    self.pack.set_name(id, name)?;
                    id
                } else if is_param_object {
                    match existing {
                        Some(existing) => {
                            let existing_class = self.pack.object(existing)?.class;
                            if existing_class != info.name {
                                return Err(ArchiveError::InvalidGraph(format!(
                                    "owner #{} already has '{}' as a {}, archive has a {}",
                                    owner_ref, name, existing_class, info.name
                                )));
                            }
                            existing
                        }
                        None => self.pack.create_param(owner, name, info.name)?,
                    }
                } else if owner_kind == ObjectKind::ParamArray {
                    let index = record.index.ok_or_else(|| {
                        ArchiveError::MalformedAtom(
                            "param array member without an index".to_string(),
                        )
                    })?;
                    if index >= self.max_array_len {
                        return Err(ArchiveError::MalformedAtom(format!(
                            "param array index {} exceeds the limit of {}",
                            index, self.max_array_len
                        )));
                    }
                    let id = self.pack.create_param_at(owner, index, info.name)?;
                    self.pack.set_name(id, name)?;
                    id
                } else {
                    return Err(ArchiveError::InvalidGraph(format!(
                        "param owner #{} is a {}, not a ParamObject or ParamArray",
                        owner_ref, owner_class
                    )));
                }
            }
            None => {
                let id = self.pack.create_object(info.name)?;
                self.pack.set_name(id, name)?;
                id
            }
        };

        self.register(archived, id)?;
        self.apply_param(id, &record)
    }

    fn apply_param(&mut self, id: ObjectId, record: &ParamRecord) -> Result<()> {
        if let Some(input_ref) = record.input_connection_ref {
            let input = self.resolve(input_ref, "input connection")?;
            if self.pack.object(input)?.kind() != ObjectKind::Param {
                return Err(ArchiveError::UnsupportedValueKind(format!(
                    "input connection #{} is not a Param",
                    input_ref
                )));
            }
            return self.pack.bind(id, input);
        }

        let current = self
            .pack
            .param_value(id)
            .cloned()
            .ok_or(ArchiveError::UnresolvedReference { what: "param", id })?;
        let floats = &record.float_value;

        let value = match (floats.len(), &current) {
            (0, ParamValue::Boolean(_)) => ParamValue::Boolean(record.bool_value.unwrap_or(false)),
            (0, ParamValue::Integer(_)) => ParamValue::Integer(record.integer_value.unwrap_or(0)),
            (0, ParamValue::String(_)) => match record.indexed_string_value {
                Some(index) => ParamValue::String(self.strings.resolve(index)?.to_string()),
                None => return Ok(()),
            },
            (0, ParamValue::BoundingBox(_)) => return Ok(()),
            (0, ParamValue::Ref { target, .. }) => {
                let value = match record.object_ref_value {
                    Some(archived) => Some(self.resolve(archived, "referenced object")?),
                    None => None,
                };
                ParamValue::Ref {
                    target: *target,
                    value,
                }
            }
            (1, ParamValue::Float(_)) => ParamValue::Float(floats[0]),
            (2, ParamValue::Float2(_)) => ParamValue::Float2([floats[0], floats[1]]),
            (3, ParamValue::Float3(_)) => ParamValue::Float3([floats[0], floats[1], floats[2]]),
            (4, ParamValue::Float4(_)) => {
                ParamValue::Float4([floats[0], floats[1], floats[2], floats[3]])
            }
            (n, ParamValue::Matrix4(_)) => match MatrixEncoding::from_floats(floats) {
                Some(encoding) => ParamValue::Matrix4(encoding.to_matrix()),
                None => {
                    return Err(ArchiveError::UnsupportedValueKind(format!(
                        "matrix param with {} floats",
                        n
                    )))
                }
            },
            (n, value) => {
                return Err(ArchiveError::UnsupportedValueKind(format!(
                    "{} param with {} floats",
                    value.type_name(),
                    n
                )))
            }
        };
        self.pack.set_param_value(id, value)
    }

    // =========================================================================
    // Textures
    // =========================================================================

    fn receive_texture(
        &mut self,
        info: &ClassInfo,
        name: &str,
        archived: u32,
        record: TextureRecord,
    ) -> Result<()> {
        let uri = self.strings.resolve(record.uri)?.to_string();

        let id = if uri == ERROR_TEXTURE_URI {
            self.pack.error_texture()?
        } else {
            let bytes = self.resources.fetch(&uri)?;
            let bitmaps = self.decoder.decode(&bytes, &uri)?;
            let id = self.pack.create_texture_from_bitmaps(&bitmaps, &uri)?;
            let built = self.pack.object(id)?.class;
            if built != info.name {
                return Err(ArchiveError::InvalidGraph(format!(
                    "'{}' rebuilt as {}, archived as {}",
                    uri, built, info.name
                )));
            }
            id
        };

        if !name.is_empty() && id >= self.checkpoint {
            self.pack.set_name(id, name)?;
        }
        self.register(archived, id)
    }

    // =========================================================================
    // Other kinds
    // =========================================================================

    fn receive_body(
        &mut self,
        id: ObjectId,
        kind: ObjectKind,
        payload: ObjectPayload,
    ) -> Result<()> {
        match (kind, payload) {
            (ObjectKind::Effect, ObjectPayload::Effect(r)) => self.receive_effect(id, r),
            (ObjectKind::Skin, ObjectPayload::Skin(r)) => self.receive_skin(id, r),
            (ObjectKind::Curve, ObjectPayload::Curve(r)) => self.receive_curve(id, r),
            (ObjectKind::Buffer, ObjectPayload::Buffer(r)) => self.receive_buffer(id, r),
            (ObjectKind::VertexSource, ObjectPayload::VertexSource(r)) => {
                self.receive_vertex_source(id, r)
            }
            (ObjectKind::Primitive, ObjectPayload::Primitive(r)) => self.receive_primitive(id, r),
            (ObjectKind::Transform, ObjectPayload::Transform(r)) => self.receive_transform(id, r),
            (ObjectKind::Shape, ObjectPayload::Empty)
            | (ObjectKind::ParamArray, ObjectPayload::Empty)
            | (ObjectKind::Generic, ObjectPayload::Empty) => Ok(()),
            (kind, payload) => Err(payload_mismatch(kind, &payload)),
        }
    }

    fn receive_effect(&mut self, id: ObjectId, record: EffectRecord) -> Result<()> {
        if let Some(index) = record.source {
            let source = self.strings.resolve(index)?.to_string();
            if let Some(effect) = self.pack.get_mut(id).and_then(|o| o.as_effect_mut()) {
                effect.source = source;
            }
        }
        Ok(())
    }

    fn receive_skin(&mut self, id: ObjectId, record: SkinRecord) -> Result<()> {
        let flat = &record.inverse_bind_pose_matrices;
        if flat.len() % RAW_LEN != 0 {
            return Err(ArchiveError::SizeMismatch {
                what: "inverse bind pose matrices",
                expected: flat.len() - flat.len() % RAW_LEN,
                found: flat.len(),
            });
        }
        let poses = flat
            .chunks_exact(RAW_LEN)
            .map(|chunk| {
                let mut values = [0.0f32; RAW_LEN];
                values.copy_from_slice(chunk);
                Matrix4::from_slice(&values)
            })
            .collect();
        let influences = record
            .influence_arrays
            .iter()
            .map(|vertex| {
                vertex
                    .iter()
                    .map(|i| Influence {
                        matrix_index: i.matrix_index,
                        weight: i.weight,
                    })
                    .collect()
            })
            .collect();

        if let Some(skin) = self.pack.get_mut(id).and_then(|o| o.as_skin_mut()) {
            skin.inverse_bind_poses = poses;
            skin.influences = influences;
        }
        Ok(())
    }

    fn receive_curve(&mut self, id: ObjectId, record: CurveRecord) -> Result<()> {
        let mut keys = Vec::with_capacity(record.keys.len());
        for key in &record.keys {
            let kind = match key.key_type {
                KeyType::Step => CurveKeyKind::Step,
                KeyType::Linear => CurveKeyKind::Linear,
                KeyType::Bezier => {
                    let t = &key.bezier_tangents;
                    if t.len() != 4 {
                        return Err(ArchiveError::SizeMismatch {
                            what: "bezier tangents",
                            expected: 4,
                            found: t.len(),
                        });
                    }
                    CurveKeyKind::Bezier {
                        in_tangent: [t[0], t[1]],
                        out_tangent: [t[2], t[3]],
                    }
                }
            };
            keys.push(CurveKey {
                kind,
                input: key.input,
                output: key.output,
            });
        }

        if let Some(curve) = self.pack.get_mut(id).and_then(|o| o.as_curve_mut()) {
            curve.pre_infinity = record.pre_infinity;
            curve.post_infinity = record.post_infinity;
            curve.use_cache = record.use_cache;
            curve.sample_rate = record.sample_rate;
            curve.keys = keys;
        }
        Ok(())
    }

    /// Two passes: recreate fields (registering their ids), allocate, then
    /// fill data
    fn receive_buffer(&mut self, id: ObjectId, record: BufferRecord) -> Result<()> {
        let is_index = self
            .pack
            .object(id)?
            .as_buffer()
            .map_or(false, |b| b.kind == BufferKind::Index);
        let has_data = self.check_buffer(&record)?;
        self.pack.remove_fields(id)?;

        let mut created = Vec::with_capacity(record.fields.len());
        for field in &record.fields {
            let storage = self.storage_type(is_index, field.field_type);
            let field_id = self.pack.create_field(id, storage, field.num_components)?;
            if let Some(index) = field.name {
                let name = self.strings.resolve(index)?.to_string();
                self.pack.set_name(field_id, name)?;
            }
            self.register(field.id, field_id)?;
            created.push((field_id, storage));
        }

        self.pack.allocate_elements(id, record.num_elements)?;

        if has_data {
            for (field, (field_id, storage)) in record.fields.iter().zip(created) {
                let data = field_data(field, storage)?;
                self.pack.set_field_data(field_id, data)?;
            }
        }
        Ok(())
    }

    /// Validate declared sizes before anything is allocated. Returns whether
    /// the buffer carries inline data.
    fn check_buffer(&self, record: &BufferRecord) -> Result<bool> {
        let num_elements = u64::from(record.num_elements);
        let values = record.fields.iter().fold(0u64, |total, field| {
            total.saturating_add(num_elements * u64::from(field.num_components))
        });
        if values > self.max_buffer_values {
            return Err(ArchiveError::MalformedAtom(format!(
                "buffer declares {} values, limit is {}",
                values, self.max_buffer_values
            )));
        }

        let has_data = record.fields.iter().any(|f| archived_len(f).is_some());
        if has_data {
            for field in &record.fields {
                // Bounded by max_buffer_values above
                let expected = (num_elements * u64::from(field.num_components)) as usize;
                let found = archived_len(field).unwrap_or(0);
                if found != expected {
                    return Err(ArchiveError::SizeMismatch {
                        what: "field data",
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(has_data)
    }

    /// Index buffers follow the target's preferred width
    fn storage_type(&self, is_index: bool, declared: FieldType) -> FieldType {
        if !is_index {
            return declared;
        }
        match (declared, self.index_width) {
            (FieldType::UInt32, IndexWidth::U16) => FieldType::UInt16,
            (FieldType::UInt16, IndexWidth::U32) => FieldType::UInt32,
            _ => declared,
        }
    }

    fn receive_vertex_source(&mut self, id: ObjectId, record: VertexSourceRecord) -> Result<()> {
        for stream in record.streams {
            let field = self.resolve(stream.field_ref, "stream field")?;

            let bound_source = match stream.bind {
                Some(archived) => {
                    let source = self.resolve(archived, "bound vertex source")?;
                    let has_stream = self
                        .pack
                        .object(source)?
                        .as_vertex_source()
                        .map(|v| v.stream(stream.semantic, stream.semantic_index).is_some());
                    match has_stream {
                        Some(true) => Some(source),
                        Some(false) => {
                            return Err(ArchiveError::InvalidGraph(format!(
                                "vertex source #{} has no {:?}[{}] stream to bind to",
                                archived, stream.semantic, stream.semantic_index
                            )))
                        }
                        None => {
                            return Err(ArchiveError::InvalidGraph(format!(
                                "stream bound to #{}, which is not a vertex source",
                                archived
                            )))
                        }
                    }
                }
                None => None,
            };

            self.pack.set_vertex_stream(
                id,
                Stream {
                    field,
                    start_index: stream.start_index,
                    semantic: stream.semantic,
                    semantic_index: stream.semantic_index,
                    bound_source,
                },
            )?;
        }
        Ok(())
    }

    fn receive_primitive(&mut self, id: ObjectId, record: PrimitiveRecord) -> Result<()> {
        if let Some(primitive) = self.pack.get_mut(id).and_then(|o| o.as_primitive_mut()) {
            primitive.primitive_type = record.primitive_type;
            primitive.number_vertices = record.number_vertices;
            primitive.number_primitives = record.number_primitives;
            primitive.start_index = record.start_index;
        }

        if let Some(archived) = record.index_buffer_ref {
            let buffer = self.resolve(archived, "index buffer")?;
            self.pack.set_index_buffer(id, Some(buffer))?;
        }
        if let Some(archived) = record.stream_bank_ref {
            let bank = self.resolve(archived, "stream bank")?;
            self.pack.set_stream_bank(id, Some(bank))?;
        }
        if let Some(archived) = record.owner_ref {
            let shape = self.resolve(archived, "primitive owner")?;
            self.pack.set_primitive_owner(id, Some(shape))?;
        }
        Ok(())
    }

    fn receive_transform(&mut self, id: ObjectId, record: TransformRecord) -> Result<()> {
        if let Some(archived) = record.parent_ref {
            let parent = self.resolve(archived, "parent transform")?;
            self.pack.set_parent(id, Some(parent))?;
        }
        Ok(())
    }
}

fn payload_mismatch(kind: ObjectKind, payload: &ObjectPayload) -> ArchiveError {
    ArchiveError::MalformedAtom(format!(
        "{:?} object carries a {} payload",
        kind,
        payload.name()
    ))
}

/// Number of inline values, `None` when the field carries no data
fn archived_len(field: &FieldRecord) -> Option<usize> {
    let len = match field.field_type {
        FieldType::Float => field.value_float.len(),
        FieldType::UInt32 | FieldType::UInt16 => field.value_uint.len(),
        FieldType::Byte => return field.value_byte.as_ref().map(Vec::len),
    };
    (len > 0).then_some(len)
}

/// Convert archived field values to the storage type
fn field_data(field: &FieldRecord, storage: FieldType) -> Result<FieldData> {
    let data = match storage {
        FieldType::Float => FieldData::Float(field.value_float.clone()),
        FieldType::UInt32 => FieldData::UInt32(field.value_uint.clone()),
        FieldType::UInt16 => FieldData::UInt16(
            field
                .value_uint
                .iter()
                .map(|&value| {
                    u16::try_from(value).map_err(|_| ArchiveError::IndexOverflow { value })
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        FieldType::Byte => FieldData::Byte(field.value_byte.clone().unwrap_or_default()),
    };
    Ok(data)
}
