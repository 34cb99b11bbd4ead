//! Objects and their kind-specific bodies

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::Matrix4;

use super::param::{Param, ParamArray};

/// Identity of an object inside one Pack
pub type ObjectId = u32;

/// Most specific domain type of an object; drives archive dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Generic,
    Param,
    ParamArray,
    Effect,
    Skin,
    Curve,
    Buffer,
    Field,
    VertexSource,
    Primitive,
    Shape,
    Transform,
    Texture,
}

/// One node of the scene graph
#[derive(Debug, Clone)]
pub struct Object {
    pub id: ObjectId,
    pub class: &'static str,
    pub name: String,
    /// Named params; `None` for objects that cannot own params
    pub params: Option<BTreeMap<String, ObjectId>>,
    pub body: ObjectBody,
}

#[derive(Debug, Clone)]
pub enum ObjectBody {
    Generic,
    Param(Param),
    ParamArray(ParamArray),
    Effect(Effect),
    Skin(Skin),
    Curve(Curve),
    Buffer(Buffer),
    Field(Field),
    VertexSource(VertexSource),
    Primitive(Primitive),
    Shape(Shape),
    Transform(Transform),
    Texture(Texture),
}

impl ObjectBody {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectBody::Generic => ObjectKind::Generic,
            ObjectBody::Param(_) => ObjectKind::Param,
            ObjectBody::ParamArray(_) => ObjectKind::ParamArray,
            ObjectBody::Effect(_) => ObjectKind::Effect,
            ObjectBody::Skin(_) => ObjectKind::Skin,
            ObjectBody::Curve(_) => ObjectKind::Curve,
            ObjectBody::Buffer(_) => ObjectKind::Buffer,
            ObjectBody::Field(_) => ObjectKind::Field,
            ObjectBody::VertexSource(_) => ObjectKind::VertexSource,
            ObjectBody::Primitive(_) => ObjectKind::Primitive,
            ObjectBody::Shape(_) => ObjectKind::Shape,
            ObjectBody::Transform(_) => ObjectKind::Transform,
            ObjectBody::Texture(_) => ObjectKind::Texture,
        }
    }
}

macro_rules! body_accessors {
    ($($variant:ident => $as_ref:ident, $as_mut:ident;)*) => {
        impl Object {
            $(
                pub fn $as_ref(&self) -> Option<&$variant> {
                    match &self.body {
                        ObjectBody::$variant(x) => Some(x),
                        _ => None,
                    }
                }

                pub fn $as_mut(&mut self) -> Option<&mut $variant> {
                    match &mut self.body {
                        ObjectBody::$variant(x) => Some(x),
                        _ => None,
                    }
                }
            )*
        }
    };
}

body_accessors! {
    Param => as_param, as_param_mut;
    ParamArray => as_param_array, as_param_array_mut;
    Effect => as_effect, as_effect_mut;
    Skin => as_skin, as_skin_mut;
    Curve => as_curve, as_curve_mut;
    Buffer => as_buffer, as_buffer_mut;
    Field => as_field, as_field_mut;
    VertexSource => as_vertex_source, as_vertex_source_mut;
    Primitive => as_primitive, as_primitive_mut;
    Shape => as_shape, as_shape_mut;
    Transform => as_transform, as_transform_mut;
    Texture => as_texture, as_texture_mut;
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        self.body.kind()
    }

    /// Look up a named param id
    pub fn param(&self, name: &str) -> Option<ObjectId> {
        self.params.as_ref().and_then(|p| p.get(name).copied())
    }
}

// =============================================================================
// Effects, skins, curves
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effect {
    /// Shader source; compiled by the renderer, opaque here
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Influence {
    pub matrix_index: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skin {
    /// Per-vertex matrix influences
    pub influences: Vec<Vec<Influence>>,
    pub inverse_bind_poses: Vec<Matrix4>,
}

/// Curve extrapolation outside the key range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Infinity {
    #[default]
    Constant,
    Linear,
    Cycle,
    CycleRelative,
    Oscillate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurveKeyKind {
    Step,
    Linear,
    Bezier {
        in_tangent: [f32; 2],
        out_tangent: [f32; 2],
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveKey {
    pub kind: CurveKeyKind,
    pub input: f32,
    pub output: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub pre_infinity: Infinity,
    pub post_infinity: Infinity,
    pub use_cache: bool,
    pub sample_rate: f32,
    pub keys: Vec<CurveKey>,
}

impl Default for Curve {
    fn default() -> Self {
        Self {
            pre_infinity: Infinity::Constant,
            post_infinity: Infinity::Constant,
            use_cache: true,
            sample_rate: 1.0 / 30.0,
            keys: Vec::new(),
        }
    }
}

// =============================================================================
// Buffers and fields
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Source,
    Index,
    /// Written by the GPU; contents are never archived
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub kind: BufferKind,
    pub num_elements: u32,
    /// Field ids, in declaration order
    pub fields: Vec<ObjectId>,
}

impl Buffer {
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            num_elements: 0,
            fields: Vec::new(),
        }
    }
}

/// Storage type of a field's components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Float,
    UInt32,
    UInt16,
    /// Normalized unsigned bytes
    Byte,
}

impl FieldType {
    pub fn class_name(&self) -> &'static str {
        match self {
            FieldType::Float => "FloatField",
            FieldType::UInt32 => "UInt32Field",
            FieldType::UInt16 => "UInt16Field",
            FieldType::Byte => "UByteNField",
        }
    }
}

/// Field contents, `num_elements * num_components` values
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Float(Vec<f32>),
    UInt32(Vec<u32>),
    UInt16(Vec<u16>),
    Byte(Vec<u8>),
}

impl FieldData {
    pub fn zeroed(field_type: FieldType, len: usize) -> Self {
        match field_type {
            FieldType::Float => FieldData::Float(vec![0.0; len]),
            FieldType::UInt32 => FieldData::UInt32(vec![0; len]),
            FieldType::UInt16 => FieldData::UInt16(vec![0; len]),
            FieldType::Byte => FieldData::Byte(vec![0; len]),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldData::Float(_) => FieldType::Float,
            FieldData::UInt32(_) => FieldType::UInt32,
            FieldData::UInt16(_) => FieldType::UInt16,
            FieldData::Byte(_) => FieldType::Byte,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldData::Float(v) => v.len(),
            FieldData::UInt32(v) => v.len(),
            FieldData::UInt16(v) => v.len(),
            FieldData::Byte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub buffer: ObjectId,
    pub num_components: u32,
    pub data: FieldData,
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        self.data.field_type()
    }
}

// =============================================================================
// Geometry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Semantic {
    Position,
    Normal,
    Tangent,
    Binormal,
    Color,
    TexCoord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSourceKind {
    StreamBank,
    SkinEval,
}

/// One vertex stream slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stream {
    pub field: ObjectId,
    pub start_index: u32,
    pub semantic: Semantic,
    pub semantic_index: u32,
    /// Vertex source whose matching stream feeds this one
    pub bound_source: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexSource {
    pub kind: VertexSourceKind,
    pub streams: Vec<Stream>,
}

impl VertexSource {
    pub fn stream(&self, semantic: Semantic, semantic_index: u32) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| s.semantic == semantic && s.semantic_index == semantic_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Primitive {
    pub primitive_type: PrimitiveType,
    pub number_vertices: u32,
    pub number_primitives: u32,
    pub start_index: u32,
    pub index_buffer: Option<ObjectId>,
    pub stream_bank: Option<ObjectId>,
    /// Shape this primitive is an element of
    pub owner: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub elements: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    pub parent: Option<ObjectId>,
    pub children: Vec<ObjectId>,
    /// Displayed shapes (non-owning)
    pub shapes: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    /// 1 for 2D textures, 6 for cube maps
    pub faces: u32,
}
