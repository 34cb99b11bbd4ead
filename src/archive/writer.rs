//! Object graph writer
//!
//! Walks the graph reachable from a root transform and emits one OBJECT
//! atom per kept object, dependencies first, so the reader only ever
//! resolves ids it has already seen.
//!
//! ## Visiting
//! 1. Already visited → `Seen`; redundant params → `Skipped`.
//! 2. Mark visited *before* recursing, so cycles and diamonds stop here.
//! 3. Send every dependency (owner, input, buffers, parent, ...).
//! 4. Intern strings, then write the OBJECT atom.
//! 5. Send owned params; for transforms also shapes, the ATTACHMENT atom
//!    and children.

use std::collections::HashSet;
use std::io::Write;

use crate::error::{ArchiveError, Result};
use crate::math::MatrixEncoding;
use crate::scene::{
    Buffer, BufferKind, Curve, CurveKeyKind, Effect, FieldData, Object, ObjectBody, ObjectId,
    ObjectKind, Pack, Param, ParamArray, ParamOwner, ParamValue, Primitive, RefTarget, Shape,
    Skin, Transform, VertexSource, LIGHTING_TYPE_PARAM, ORIGINAL_URI_PARAM,
};

use super::framer::{AtomKind, AtomWriter};
use super::records::{
    AttachmentRecord, BufferRecord, CurveKeyRecord, CurveRecord, EffectRecord,
    EndOfArchiveRecord, FieldRecord, InfluenceRecord, KeyType, ObjectHeader, ObjectPayload,
    ObjectRecord, ParamRecord, PrimitiveRecord, SkinRecord, StreamRecord, TextureRecord,
    TransformRecord, VertexSourceRecord,
};
use super::strings::StringEncoder;

/// Lighting models a loader rebuilds its effect for
const STANDARD_LIGHTING_TYPES: [&str; 4] = ["phong", "lambert", "blinn", "constant"];

/// Outcome of sending one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Written by this call
    Sent,
    /// Visited earlier (or in progress)
    Seen,
    /// Redundant; not part of the archive
    Skipped,
}

/// Counters reported after a publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub objects: u64,
    pub skipped: u64,
    pub strings: u64,
    pub attachments: u64,
    pub atoms: u64,
    /// Atom bytes before compression
    pub bytes: u64,
}

/// Writes one archive's worth of atoms.
///
/// Holds the graph by shared reference; the graph must not change while a
/// publish is running.
pub struct ObjectGraphWriter<'p, W: Write> {
    pack: &'p Pack,
    atoms: AtomWriter<W>,
    strings: StringEncoder,
    visited: HashSet<ObjectId>,
    emitted: HashSet<ObjectId>,
    skipped: HashSet<ObjectId>,
    /// Treated as parentless while publishing
    root: Option<ObjectId>,
    objects: u64,
    attachments: u64,
}

impl<'p, W: Write> ObjectGraphWriter<'p, W> {
    pub fn new(pack: &'p Pack, atoms: AtomWriter<W>) -> Self {
        Self {
            pack,
            atoms,
            strings: StringEncoder::new(),
            visited: HashSet::new(),
            emitted: HashSet::new(),
            skipped: HashSet::new(),
            root: None,
            objects: 0,
            attachments: 0,
        }
    }

    /// Serialize everything reachable from `root`, then END_OF_ARCHIVE.
    ///
    /// The root is written without its parent link even if it has one.
    pub fn publish(&mut self, root: ObjectId) -> Result<PublishStats> {
        let object = self.pack.object(root)?;
        if object.kind() != ObjectKind::Transform {
            return Err(ArchiveError::InvalidGraph(format!(
                "root #{} is a {}, expected a Transform",
                root, object.class
            )));
        }

        self.root = Some(root);
        let sent = self.send(root);
        self.root = None;
        if let Err(e) = sent {
            tracing::error!("Publish of #{} failed: {}", root, e);
            return Err(e);
        }

        self.atoms
            .write_record(AtomKind::EndOfArchive, &EndOfArchiveRecord { root })?;

        let stats = self.stats();
        tracing::debug!(
            "Published #{}: {} objects, {} skipped, {} strings, {} atoms, {} bytes",
            root,
            stats.objects,
            stats.skipped,
            stats.strings,
            stats.atoms,
            stats.bytes
        );
        Ok(stats)
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            objects: self.objects,
            skipped: self.skipped.len() as u64,
            strings: self.strings.len() as u64,
            attachments: self.attachments,
            atoms: self.atoms.atoms_written(),
            bytes: self.atoms.bytes_written(),
        }
    }

    /// Hand back the underlying stream
    pub fn into_inner(self) -> W {
        self.atoms.into_inner()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Send one object by its most specific kind
    pub fn send(&mut self, id: ObjectId) -> Result<Visit> {
        let pack = self.pack;
        let object = pack.object(id)?;
        let result = match &object.body {
            ObjectBody::Param(p) => self.send_param(object, p),
            ObjectBody::ParamArray(a) => self.send_param_array(object, a),
            ObjectBody::Effect(e) => self.send_effect(object, e),
            ObjectBody::Skin(s) => self.send_skin(object, s),
            ObjectBody::Curve(c) => self.send_curve(object, c),
            ObjectBody::Buffer(b) => self.send_buffer(object, b),
            ObjectBody::Field(f) => return self.send(f.buffer),
            ObjectBody::VertexSource(v) => self.send_vertex_source(object, v),
            ObjectBody::Primitive(p) => self.send_primitive(object, p),
            ObjectBody::Shape(s) => self.send_shape(object, s),
            ObjectBody::Transform(t) => self.send_transform(object, t),
            ObjectBody::Texture(_) => self.send_texture(object),
            ObjectBody::Generic => self.send_generic(object),
        };
        result.map_err(|e| e.in_object(id, object.class, &object.name))
    }

    /// Send something the current object refers to. It must end up in the
    /// stream before the referring atom.
    fn send_dependency(&mut self, id: ObjectId, what: &str) -> Result<()> {
        match self.send(id)? {
            Visit::Skipped => Err(ArchiveError::InvalidGraph(format!(
                "{} #{} is redundant and would not be archived",
                what, id
            ))),
            _ if !self.emitted.contains(&id) => Err(ArchiveError::InvalidGraph(format!(
                "{} #{} is part of a dependency cycle",
                what, id
            ))),
            _ => Ok(()),
        }
    }

    fn check_ignore(&mut self, object: &Object) -> Option<Visit> {
        if self.visited.contains(&object.id) {
            return Some(Visit::Seen);
        }
        if let Some(param) = object.as_param() {
            if self.is_redundant(param) {
                if self.skipped.insert(object.id) {
                    tracing::trace!("Skipping redundant param #{} '{}'", object.id, object.name);
                }
                return Some(Visit::Skipped);
            }
        }
        self.visited.insert(object.id);
        None
    }

    /// Params with no outputs that the loader can rebuild on its own
    fn is_redundant(&self, param: &Param) -> bool {
        if !param.outputs.is_empty() {
            return false;
        }
        if param.dynamic || param.read_only {
            return true;
        }
        match &param.value {
            ParamValue::VertexBufferStream => true,
            ParamValue::Ref {
                target: RefTarget::DrawList,
                ..
            } => true,
            ParamValue::Ref {
                target: RefTarget::Effect,
                ..
            } => self.owned_by_standard_material(param),
            _ => false,
        }
    }

    fn owned_by_standard_material(&self, param: &Param) -> bool {
        let Some(ParamOwner::Object(owner)) = param.owner else {
            return false;
        };
        let Some(material) = self.pack.get(owner).filter(|o| o.class == "Material") else {
            return false;
        };
        match material
            .param(LIGHTING_TYPE_PARAM)
            .and_then(|id| self.pack.param_value(id))
        {
            Some(ParamValue::String(lighting)) => {
                let lighting = lighting.to_ascii_lowercase();
                STANDARD_LIGHTING_TYPES.contains(&lighting.as_str())
            }
            _ => false,
        }
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn emit_object(&mut self, object: &Object, payload: ObjectPayload) -> Result<()> {
        let type_name = self.strings.intern(&mut self.atoms, object.class)?;
        let name = if object.name.is_empty() {
            None
        } else {
            Some(self.strings.intern(&mut self.atoms, &object.name)?)
        };

        let record = ObjectRecord {
            header: ObjectHeader {
                id: object.id,
                type_name,
                name,
            },
            payload,
        };
        self.atoms.write_record(AtomKind::Object, &record)?;
        self.emitted.insert(object.id);
        self.objects += 1;
        tracing::trace!("Sent #{} ({} '{}')", object.id, object.class, object.name);
        Ok(())
    }

    fn send_params(&mut self, object: &Object) -> Result<()> {
        if let Some(params) = &object.params {
            for &param in params.values() {
                self.send(param)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Per-kind encoders
    // =========================================================================

    fn send_param(&mut self, object: &Object, param: &Param) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }

        let mut record = ParamRecord::default();
        match param.owner {
            Some(ParamOwner::Object(owner)) => {
                self.send_dependency(owner, "param owner")?;
                record.owner_ref = Some(owner);
            }
            Some(ParamOwner::Array { array, index }) => {
                self.send_dependency(array, "param array")?;
                record.owner_ref = Some(array);
                record.index = Some(index);
            }
            None => {}
        }

        match param.input {
            Some(input) => {
                self.send_dependency(input, "input connection")?;
                record.input_connection_ref = Some(input);
            }
            None => self.encode_value(&param.value, &mut record)?,
        }

        self.emit_object(object, ObjectPayload::Param(record))?;
        Ok(Visit::Sent)
    }

    fn encode_value(&mut self, value: &ParamValue, record: &mut ParamRecord) -> Result<()> {
        match value {
            ParamValue::Boolean(b) => record.bool_value = b.then_some(true),
            ParamValue::Integer(i) => record.integer_value = (*i != 0).then_some(*i),
            ParamValue::String(s) => {
                record.indexed_string_value = Some(self.strings.intern(&mut self.atoms, s)?)
            }
            ParamValue::Float(f) => record.float_value = vec![*f],
            ParamValue::Float2(v) => record.float_value = v.to_vec(),
            ParamValue::Float3(v) => record.float_value = v.to_vec(),
            ParamValue::Float4(v) => record.float_value = v.to_vec(),
            ParamValue::Matrix4(m) => record.float_value = MatrixEncoding::encode(m).to_floats(),
            // Recomputed after load
            ParamValue::BoundingBox(_) => {}
            ParamValue::Ref { value, .. } => {
                if let Some(target) = *value {
                    self.send_dependency(target, "referenced object")?;
                    record.object_ref_value = Some(target);
                }
            }
            ParamValue::VertexBufferStream => {
                return Err(ArchiveError::UnsupportedValueKind(
                    "vertex buffer stream params have no archived value".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn send_param_array(&mut self, object: &Object, array: &ParamArray) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        self.emit_object(object, ObjectPayload::Empty)?;

        for (index, &param) in array.params.iter().enumerate() {
            // A gap would shift every later index on load
            if self.send(param)? == Visit::Skipped {
                return Err(ArchiveError::InvalidGraph(format!(
                    "param #{} at index {} is redundant and would leave a gap",
                    param, index
                )));
            }
        }
        Ok(Visit::Sent)
    }

    fn send_effect(&mut self, object: &Object, effect: &Effect) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        let source = if effect.source.is_empty() {
            None
        } else {
            Some(self.strings.intern(&mut self.atoms, &effect.source)?)
        };
        self.emit_object(object, ObjectPayload::Effect(EffectRecord { source }))?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_skin(&mut self, object: &Object, skin: &Skin) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        let record = SkinRecord {
            influence_arrays: skin
                .influences
                .iter()
                .map(|vertex| {
                    vertex
                        .iter()
                        .map(|i| InfluenceRecord {
                            matrix_index: i.matrix_index,
                            weight: i.weight,
                        })
                        .collect()
                })
                .collect(),
            inverse_bind_pose_matrices: skin
                .inverse_bind_poses
                .iter()
                .flat_map(|m| m.to_array())
                .collect(),
        };
        self.emit_object(object, ObjectPayload::Skin(record))?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_curve(&mut self, object: &Object, curve: &Curve) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        let keys = curve
            .keys
            .iter()
            .map(|key| {
                let (key_type, bezier_tangents) = match key.kind {
                    CurveKeyKind::Step => (KeyType::Step, Vec::new()),
                    CurveKeyKind::Linear => (KeyType::Linear, Vec::new()),
                    CurveKeyKind::Bezier {
                        in_tangent,
                        out_tangent,
                    } => (
                        KeyType::Bezier,
                        vec![in_tangent[0], in_tangent[1], out_tangent[0], out_tangent[1]],
                    ),
                };
                CurveKeyRecord {
                    key_type,
                    input: key.input,
                    output: key.output,
                    bezier_tangents,
                }
            })
            .collect();
        let record = CurveRecord {
            pre_infinity: curve.pre_infinity,
            post_infinity: curve.post_infinity,
            use_cache: curve.use_cache,
            sample_rate: curve.sample_rate,
            keys,
        };
        self.emit_object(object, ObjectPayload::Curve(record))?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_buffer(&mut self, object: &Object, buffer: &Buffer) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        let pack = self.pack;
        let export_data = buffer.kind != BufferKind::Destination;

        let mut fields = Vec::with_capacity(buffer.fields.len());
        for &id in &buffer.fields {
            let field_object = pack.object(id)?;
            let field = field_object.as_field().ok_or_else(|| {
                ArchiveError::InvalidGraph(format!("buffer field #{} is not a Field", id))
            })?;
            self.visited.insert(id);

            let name = if field_object.name.is_empty() {
                None
            } else {
                Some(self.strings.intern(&mut self.atoms, &field_object.name)?)
            };
            let mut record = FieldRecord {
                id,
                name,
                num_components: field.num_components,
                field_type: field.field_type(),
                value_float: Vec::new(),
                value_uint: Vec::new(),
                value_byte: None,
            };
            if export_data {
                match &field.data {
                    FieldData::Float(v) => record.value_float = v.clone(),
                    FieldData::UInt32(v) => record.value_uint = v.clone(),
                    FieldData::UInt16(v) => {
                        record.value_uint = v.iter().map(|&x| u32::from(x)).collect()
                    }
                    FieldData::Byte(v) => record.value_byte = Some(v.clone()),
                }
            }
            fields.push(record);
        }

        let record = BufferRecord {
            num_elements: buffer.num_elements,
            fields,
        };
        self.emit_object(object, ObjectPayload::Buffer(record))?;
        self.emitted.extend(buffer.fields.iter().copied());
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_vertex_source(&mut self, object: &Object, source: &VertexSource) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        let pack = self.pack;

        let mut streams = Vec::with_capacity(source.streams.len());
        for stream in &source.streams {
            let buffer = pack
                .object(stream.field)?
                .as_field()
                .map(|f| f.buffer)
                .ok_or_else(|| {
                    ArchiveError::InvalidGraph(format!(
                        "stream field #{} is not a Field",
                        stream.field
                    ))
                })?;
            self.send_dependency(buffer, "stream buffer")?;

            if let Some(bound) = stream.bound_source {
                self.send_dependency(bound, "bound vertex source")?;
            }
            streams.push(StreamRecord {
                field_ref: stream.field,
                start_index: stream.start_index,
                semantic: stream.semantic,
                semantic_index: stream.semantic_index,
                bind: stream.bound_source,
            });
        }

        self.emit_object(
            object,
            ObjectPayload::VertexSource(VertexSourceRecord { streams }),
        )?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_primitive(&mut self, object: &Object, primitive: &Primitive) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        if let Some(buffer) = primitive.index_buffer {
            self.send_dependency(buffer, "index buffer")?;
        }
        if let Some(bank) = primitive.stream_bank {
            self.send_dependency(bank, "stream bank")?;
        }
        if let Some(shape) = primitive.owner {
            self.send_dependency(shape, "owning shape")?;
        }

        let record = PrimitiveRecord {
            index_buffer_ref: primitive.index_buffer,
            stream_bank_ref: primitive.stream_bank,
            primitive_type: primitive.primitive_type,
            number_vertices: primitive.number_vertices,
            number_primitives: primitive.number_primitives,
            start_index: primitive.start_index,
            owner_ref: primitive.owner,
        };
        self.emit_object(object, ObjectPayload::Primitive(record))?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_shape(&mut self, object: &Object, shape: &Shape) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        self.emit_object(object, ObjectPayload::Empty)?;
        self.send_params(object)?;

        // Elements reference the shape, so they follow it
        for &element in &shape.elements {
            let kind = self.pack.object(element)?.kind();
            if kind != ObjectKind::Primitive {
                return Err(ArchiveError::UnsupportedValueKind(format!(
                    "shape element #{} is a {:?}",
                    element, kind
                )));
            }
            self.send(element)?;
        }
        Ok(Visit::Sent)
    }

    fn send_transform(&mut self, object: &Object, transform: &Transform) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }

        let parent = transform.parent.filter(|_| self.root != Some(object.id));
        if let Some(parent) = parent {
            self.send_dependency(parent, "parent transform")?;
        }
        self.emit_object(
            object,
            ObjectPayload::Transform(TransformRecord { parent_ref: parent }),
        )?;
        self.send_params(object)?;

        let mut attachment_refs = Vec::with_capacity(transform.shapes.len());
        for &shape in &transform.shapes {
            self.send_dependency(shape, "attached shape")?;
            attachment_refs.push(shape);
        }
        self.atoms.write_record(
            AtomKind::Attachment,
            &AttachmentRecord {
                object_ref: object.id,
                attachment_refs,
            },
        )?;
        self.attachments += 1;

        // Children reference this transform, so they follow it
        for &child in &transform.children {
            self.send(child)?;
        }
        Ok(Visit::Sent)
    }

    fn send_texture(&mut self, object: &Object) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        let pack = self.pack;
        // Needed at creation time on load, so it travels in the texture
        // atom as well as in its param
        let uri = match object
            .param(ORIGINAL_URI_PARAM)
            .and_then(|id| pack.param_value(id))
        {
            Some(ParamValue::String(uri)) => uri,
            _ => {
                return Err(ArchiveError::InvalidGraph(format!(
                    "texture has no '{}' string param",
                    ORIGINAL_URI_PARAM
                )))
            }
        };
        let uri = self.strings.intern(&mut self.atoms, uri)?;
        self.emit_object(object, ObjectPayload::Texture(TextureRecord { uri }))?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }

    fn send_generic(&mut self, object: &Object) -> Result<Visit> {
        if let Some(visit) = self.check_ignore(object) {
            return Ok(visit);
        }
        self.emit_object(object, ObjectPayload::Empty)?;
        self.send_params(object)?;
        Ok(Visit::Sent)
    }
}
