//! Pack: the object arena
//!
//! Objects live in one table keyed by id and refer to each other only by
//! id. Every structural mutation goes through a Pack method so both sides
//! of a link (parent/children, input/outputs, owner/elements) stay in sync.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::resource::Bitmap;

use super::object::{Field, FieldData, FieldType, Object, ObjectBody, ObjectKind, Stream, Texture};
use super::param::{ParamOwner, ParamValue};
use super::registry::{ClassRegistry, ORIGINAL_URI_PARAM};
use super::ObjectId;

/// URI reserved for the renderer's placeholder texture
pub const ERROR_TEXTURE_URI: &str = "#error";

/// Number of faces in a cube map
const CUBE_FACES: usize = 6;

/// Arena owning a scene graph
#[derive(Debug, Clone)]
pub struct Pack {
    registry: Arc<ClassRegistry>,
    objects: BTreeMap<ObjectId, Object>,
    next_id: ObjectId,
    error_texture: Option<ObjectId>,
}

impl Default for Pack {
    fn default() -> Self {
        Self::new()
    }
}

impl Pack {
    /// Pack backed by the standard class registry
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ClassRegistry::standard()))
    }

    pub fn with_registry(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            objects: BTreeMap::new(),
            next_id: 1,
            error_texture: None,
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate objects in id order
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    /// Like `get`, but a missing id is an error
    pub fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects
            .get(&id)
            .ok_or(ArchiveError::UnresolvedReference { what: "object", id })
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects
            .get_mut(&id)
            .ok_or(ArchiveError::UnresolvedReference { what: "object", id })
    }

    fn alloc_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Instantiate a registered class, including its construction-time params
    pub fn create_object(&mut self, class: &str) -> Result<ObjectId> {
        let info = self
            .registry
            .get(class)
            .cloned()
            .ok_or_else(|| ArchiveError::UnknownType(class.to_string()))?;

        let id = self.alloc_id();
        let object = Object {
            id,
            class: info.name,
            name: String::new(),
            params: info.is_param_object().then(BTreeMap::new),
            body: info.build(),
        };
        self.objects.insert(id, object);

        if let Some(init) = info.init() {
            init(self, id)?;
        }
        tracing::trace!("Created #{} ({})", id, info.name);
        Ok(id)
    }

    /// Remove an object. Params bound to or from it are unbound first.
    pub fn remove(&mut self, id: ObjectId) -> Option<Object> {
        if let Some(param) = self.objects.get(&id).and_then(Object::as_param).cloned() {
            if let Some(source) = param.input {
                if let Some(src) = self.get_mut(source).and_then(Object::as_param_mut) {
                    src.outputs.remove(&id);
                }
            }
            for output in param.outputs {
                if let Some(dst) = self.get_mut(output).and_then(Object::as_param_mut) {
                    dst.input = None;
                }
            }
        }
        self.objects.remove(&id)
    }

    /// Id the next created object will get
    pub fn checkpoint(&self) -> ObjectId {
        self.next_id
    }

    /// Remove every object created since `checkpoint`
    pub fn rollback(&mut self, checkpoint: ObjectId) -> usize {
        let created: Vec<ObjectId> = self.objects.range(checkpoint..).map(|(&id, _)| id).collect();
        for &id in &created {
            self.remove(id);
        }
        if self.error_texture.map_or(false, |id| id >= checkpoint) {
            self.error_texture = None;
        }
        created.len()
    }

    pub fn set_name(&mut self, id: ObjectId, name: impl Into<String>) -> Result<()> {
        self.object_mut(id)?.name = name.into();
        Ok(())
    }

    // =========================================================================
    // Params
    // =========================================================================

    /// Create a named param on a ParamObject
    pub fn create_param(&mut self, owner: ObjectId, name: &str, class: &str) -> Result<ObjectId> {
        let owner_object = self.object(owner)?;
        let params = owner_object.params.as_ref().ok_or_else(|| {
            ArchiveError::InvalidGraph(format!(
                "#{} ({}) cannot own params",
                owner, owner_object.class
            ))
        })?;
        if params.contains_key(name) {
            return Err(ArchiveError::InvalidGraph(format!(
                "#{} already has a param named '{}'",
                owner, name
            )));
        }
        self.expect_param_class(class)?;

        let id = self.create_object(class)?;
        self.attach_param(id, name, ParamOwner::Object(owner))?;
        if let Some(params) = self.object_mut(owner)?.params.as_mut() {
            params.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Create (or replace) the param at `index` of a ParamArray. Missing
    /// slots before `index` are filled with fresh params of the same class.
    pub fn create_param_at(
        &mut self,
        array: ObjectId,
        index: u32,
        class: &str,
    ) -> Result<ObjectId> {
        let len = self
            .object(array)?
            .as_param_array()
            .map(|a| a.params.len() as u32)
            .ok_or_else(|| ArchiveError::InvalidGraph(format!("#{} is not a ParamArray", array)))?;
        self.expect_param_class(class)?;

        for filler_index in len..index {
            let filler = self.create_object(class)?;
            self.attach_param(filler, "", ParamOwner::Array { array, index: filler_index })?;
            self.param_array_mut(array)?.params.push(filler);
        }

        let id = self.create_object(class)?;
        self.attach_param(id, "", ParamOwner::Array { array, index })?;

        let slot = index as usize;
        let replaced = {
            let params = &mut self.param_array_mut(array)?.params;
            if slot < params.len() {
                Some(std::mem::replace(&mut params[slot], id))
            } else {
                params.push(id);
                None
            }
        };
        if let Some(old) = replaced {
            self.remove(old);
        }
        Ok(id)
    }

    fn param_array_mut(&mut self, array: ObjectId) -> Result<&mut super::ParamArray> {
        self.object_mut(array)?
            .as_param_array_mut()
            .ok_or_else(|| ArchiveError::InvalidGraph(format!("#{} is not a ParamArray", array)))
    }

    fn expect_param_class(&self, class: &str) -> Result<()> {
        match self.registry.get(class) {
            Some(info) if info.kind == ObjectKind::Param => Ok(()),
            Some(_) => Err(ArchiveError::InvalidGraph(format!(
                "{} is not a param class",
                class
            ))),
            None => Err(ArchiveError::UnknownType(class.to_string())),
        }
    }

    fn attach_param(&mut self, id: ObjectId, name: &str, owner: ParamOwner) -> Result<()> {
        let object = self.object_mut(id)?;
        object.name = name.to_string();
        if let Some(param) = object.as_param_mut() {
            param.owner = Some(owner);
        }
        Ok(())
    }

    /// Named param of an object
    pub fn param(&self, owner: ObjectId, name: &str) -> Option<ObjectId> {
        self.get(owner).and_then(|o| o.param(name))
    }

    pub fn param_value(&self, id: ObjectId) -> Option<&ParamValue> {
        self.get(id).and_then(Object::as_param).map(|p| &p.value)
    }

    /// Store a value; the variant must match the param's class
    pub fn set_param_value(&mut self, id: ObjectId, value: ParamValue) -> Result<()> {
        if let ParamValue::Ref {
            target,
            value: Some(referenced),
        } = &value
        {
            let object = self.object(*referenced)?;
            if !target.accepts(object) {
                return Err(ArchiveError::UnsupportedValueKind(format!(
                    "{:?} param cannot point to a {}",
                    target, object.class
                )));
            }
        }

        let object = self.object_mut(id)?;
        let class = object.class;
        let param = object.as_param_mut().ok_or_else(|| {
            ArchiveError::UnsupportedValueKind(format!("#{} ({}) is not a param", id, class))
        })?;
        if !param.value.same_kind(&value) {
            return Err(ArchiveError::UnsupportedValueKind(format!(
                "cannot store a {} value in a {}",
                value.type_name(),
                class
            )));
        }
        param.value = value;
        Ok(())
    }

    pub fn set_read_only(&mut self, id: ObjectId, read_only: bool) -> Result<()> {
        if let Some(param) = self.object_mut(id)?.as_param_mut() {
            param.read_only = read_only;
        }
        Ok(())
    }

    pub fn set_dynamic(&mut self, id: ObjectId, dynamic: bool) -> Result<()> {
        if let Some(param) = self.object_mut(id)?.as_param_mut() {
            param.dynamic = dynamic;
        }
        Ok(())
    }

    /// Drive `dst` from `src`
    pub fn bind(&mut self, dst: ObjectId, src: ObjectId) -> Result<()> {
        let src_value = self
            .object(src)?
            .as_param()
            .map(|p| p.value.clone())
            .ok_or_else(|| {
                ArchiveError::InvalidGraph(format!("bind source #{} is not a param", src))
            })?;
        let dst_param = self
            .object(dst)?
            .as_param()
            .ok_or_else(|| {
                ArchiveError::InvalidGraph(format!("bind target #{} is not a param", dst))
            })?;
        if !dst_param.value.same_kind(&src_value) {
            return Err(ArchiveError::UnsupportedValueKind(format!(
                "cannot bind a {} param to a {} param",
                dst_param.value.type_name(),
                src_value.type_name()
            )));
        }

        self.unbind_input(dst)?;
        if let Some(p) = self.object_mut(dst)?.as_param_mut() {
            p.input = Some(src);
        }
        if let Some(p) = self.object_mut(src)?.as_param_mut() {
            p.outputs.insert(dst);
        }
        Ok(())
    }

    pub fn unbind_input(&mut self, dst: ObjectId) -> Result<()> {
        let previous = self.object_mut(dst)?.as_param_mut().and_then(|p| p.input.take());
        if let Some(previous) = previous {
            if let Some(p) = self.get_mut(previous).and_then(Object::as_param_mut) {
                p.outputs.remove(&dst);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Transforms and shapes
    // =========================================================================

    /// Reparent a transform; `None` detaches it
    pub fn set_parent(&mut self, child: ObjectId, parent: Option<ObjectId>) -> Result<()> {
        self.expect_kind(child, ObjectKind::Transform)?;
        if let Some(parent) = parent {
            self.expect_kind(parent, ObjectKind::Transform)?;
            let mut cursor = Some(parent);
            while let Some(id) = cursor {
                if id == child {
                    return Err(ArchiveError::InvalidGraph(format!(
                        "#{} cannot be parented under its own descendant #{}",
                        child, parent
                    )));
                }
                cursor = self.get(id).and_then(Object::as_transform).and_then(|t| t.parent);
            }
        }

        let old = self.object(child)?.as_transform().and_then(|t| t.parent);
        if let Some(old) = old {
            if let Some(t) = self.get_mut(old).and_then(Object::as_transform_mut) {
                t.children.retain(|&c| c != child);
            }
        }
        if let Some(parent) = parent {
            if let Some(t) = self.object_mut(parent)?.as_transform_mut() {
                t.children.push(child);
            }
        }
        if let Some(t) = self.object_mut(child)?.as_transform_mut() {
            t.parent = parent;
        }
        Ok(())
    }

    /// Display `shape` under `transform`
    pub fn add_shape(&mut self, transform: ObjectId, shape: ObjectId) -> Result<()> {
        self.expect_kind(shape, ObjectKind::Shape)?;
        self.expect_kind(transform, ObjectKind::Transform)?;
        if let Some(t) = self.object_mut(transform)?.as_transform_mut() {
            if !t.shapes.contains(&shape) {
                t.shapes.push(shape);
            }
        }
        Ok(())
    }

    /// Make `primitive` an element of `shape`
    pub fn set_primitive_owner(
        &mut self,
        primitive: ObjectId,
        shape: Option<ObjectId>,
    ) -> Result<()> {
        self.expect_kind(primitive, ObjectKind::Primitive)?;
        if let Some(shape) = shape {
            self.expect_kind(shape, ObjectKind::Shape)?;
        }

        let old = self.object(primitive)?.as_primitive().and_then(|p| p.owner);
        if let Some(old) = old {
            if let Some(s) = self.get_mut(old).and_then(Object::as_shape_mut) {
                s.elements.retain(|&e| e != primitive);
            }
        }
        if let Some(shape) = shape {
            if let Some(s) = self.object_mut(shape)?.as_shape_mut() {
                s.elements.push(primitive);
            }
        }
        if let Some(p) = self.object_mut(primitive)?.as_primitive_mut() {
            p.owner = shape;
        }
        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        primitive: ObjectId,
        buffer: Option<ObjectId>,
    ) -> Result<()> {
        if let Some(buffer) = buffer {
            let is_index = self
                .object(buffer)?
                .as_buffer()
                .map_or(false, |b| b.kind == super::BufferKind::Index);
            if !is_index {
                return Err(ArchiveError::InvalidGraph(format!(
                    "#{} is not an IndexBuffer",
                    buffer
                )));
            }
        }
        self.primitive_mut(primitive)?.index_buffer = buffer;
        Ok(())
    }

    pub fn set_stream_bank(&mut self, primitive: ObjectId, bank: Option<ObjectId>) -> Result<()> {
        if let Some(bank) = bank {
            let is_bank = self
                .object(bank)?
                .as_vertex_source()
                .map_or(false, |v| v.kind == super::VertexSourceKind::StreamBank);
            if !is_bank {
                return Err(ArchiveError::InvalidGraph(format!("#{} is not a StreamBank", bank)));
            }
        }
        self.primitive_mut(primitive)?.stream_bank = bank;
        Ok(())
    }

    fn primitive_mut(&mut self, id: ObjectId) -> Result<&mut super::Primitive> {
        self.object_mut(id)?
            .as_primitive_mut()
            .ok_or_else(|| ArchiveError::InvalidGraph(format!("#{} is not a Primitive", id)))
    }

    fn expect_kind(&self, id: ObjectId, kind: ObjectKind) -> Result<()> {
        let object = self.object(id)?;
        if object.kind() != kind {
            return Err(ArchiveError::InvalidGraph(format!(
                "#{} is a {}, expected {:?}",
                id, object.class, kind
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Buffers and vertex streams
    // =========================================================================

    /// Append a typed field to a buffer, sized to its current element count
    pub fn create_field(
        &mut self,
        buffer: ObjectId,
        field_type: FieldType,
        num_components: u32,
    ) -> Result<ObjectId> {
        let num_elements = self
            .object(buffer)?
            .as_buffer()
            .map(|b| b.num_elements)
            .ok_or_else(|| ArchiveError::InvalidGraph(format!("#{} is not a Buffer", buffer)))?;

        let id = self.alloc_id();
        let len = num_elements as usize * num_components as usize;
        self.objects.insert(
            id,
            Object {
                id,
                class: field_type.class_name(),
                name: String::new(),
                params: None,
                body: ObjectBody::Field(Field {
                    buffer,
                    num_components,
                    data: FieldData::zeroed(field_type, len),
                }),
            },
        );
        if let Some(b) = self.object_mut(buffer)?.as_buffer_mut() {
            b.fields.push(id);
        }
        Ok(id)
    }

    /// Drop every field of a buffer
    pub fn remove_fields(&mut self, buffer: ObjectId) -> Result<()> {
        let fields = match self.object_mut(buffer)?.as_buffer_mut() {
            Some(b) => std::mem::take(&mut b.fields),
            None => return Ok(()),
        };
        for field in fields {
            self.objects.remove(&field);
        }
        Ok(())
    }

    /// Resize a buffer; field contents are reset to zero
    pub fn allocate_elements(&mut self, buffer: ObjectId, num_elements: u32) -> Result<()> {
        let fields = match self.object_mut(buffer)?.as_buffer_mut() {
            Some(b) => {
                b.num_elements = num_elements;
                b.fields.clone()
            }
            None => {
                return Err(ArchiveError::InvalidGraph(format!("#{} is not a Buffer", buffer)))
            }
        };
        for field in fields {
            if let Some(f) = self.object_mut(field)?.as_field_mut() {
                let len = num_elements as usize * f.num_components as usize;
                f.data = FieldData::zeroed(f.field_type(), len);
            }
        }
        Ok(())
    }

    /// Replace a field's contents; type and length must match the buffer
    pub fn set_field_data(&mut self, field: ObjectId, data: FieldData) -> Result<()> {
        let buffer = self
            .object(field)?
            .as_field()
            .map(|f| f.buffer)
            .ok_or_else(|| ArchiveError::InvalidGraph(format!("#{} is not a Field", field)))?;
        let num_elements = self.object(buffer)?.as_buffer().map_or(0, |b| b.num_elements);

        let object = self.object_mut(field)?;
        if let Some(f) = object.as_field_mut() {
            if f.field_type() != data.field_type() {
                return Err(ArchiveError::UnsupportedValueKind(format!(
                    "cannot store {:?} data in a {:?} field",
                    data.field_type(),
                    f.field_type()
                )));
            }
            let expected = num_elements as usize * f.num_components as usize;
            if data.len() != expected {
                return Err(ArchiveError::SizeMismatch {
                    what: "field data",
                    expected,
                    found: data.len(),
                });
            }
            f.data = data;
        }
        Ok(())
    }

    /// Set (or replace) the stream with the same semantic and index
    pub fn set_vertex_stream(&mut self, source: ObjectId, stream: Stream) -> Result<()> {
        self.expect_kind(stream.field, ObjectKind::Field)?;
        let source_object = self.object_mut(source)?;
        let class = source_object.class;
        let vertex_source = source_object.as_vertex_source_mut().ok_or_else(|| {
            ArchiveError::InvalidGraph(format!("#{} ({}) is not a vertex source", source, class))
        })?;
        match vertex_source
            .streams
            .iter_mut()
            .find(|s| s.semantic == stream.semantic && s.semantic_index == stream.semantic_index)
        {
            Some(existing) => *existing = stream,
            None => vertex_source.streams.push(stream),
        }
        Ok(())
    }

    // =========================================================================
    // Textures
    // =========================================================================

    /// Build a texture from decoded bitmaps. Six frames make a cube map.
    pub fn create_texture_from_bitmaps(
        &mut self,
        bitmaps: &[Bitmap],
        uri: &str,
    ) -> Result<ObjectId> {
        let first = bitmaps
            .first()
            .ok_or_else(|| ArchiveError::Resource(format!("no bitmaps decoded for '{}'", uri)))?;
        let (class, faces) = if bitmaps.len() == CUBE_FACES {
            ("TextureCUBE", CUBE_FACES as u32)
        } else {
            ("Texture2D", 1)
        };

        let id = self.create_object(class)?;
        if let Some(t) = self.object_mut(id)?.as_texture_mut() {
            *t = Texture {
                width: first.width,
                height: first.height,
                faces,
            };
        }
        if let Some(param) = self.param(id, ORIGINAL_URI_PARAM) {
            self.set_param_value(param, ParamValue::String(uri.to_string()))?;
        }
        Ok(id)
    }

    /// Placeholder texture used for the reserved `#error` URI
    pub fn error_texture(&mut self) -> Result<ObjectId> {
        if let Some(id) = self.error_texture.filter(|id| self.objects.contains_key(id)) {
            return Ok(id);
        }
        let magenta = Bitmap::solid(8, 8, [255, 0, 255, 255]);
        let id = self.create_texture_from_bitmaps(&[magenta], ERROR_TEXTURE_URI)?;
        self.set_name(id, "error")?;
        self.error_texture = Some(id);
        Ok(id)
    }
}
