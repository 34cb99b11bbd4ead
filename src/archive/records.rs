//! Atom payload records
//!
//! Every field that refers to another object holds that object's archive
//! id. Every field that refers to a string holds a `StringIndex`.

use serde::{Deserialize, Serialize};

use crate::scene::{FieldType, Infinity, PrimitiveType, Semantic};

use super::compression::Compression;
use super::strings::StringIndex;

/// Raw header written before the atom stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub compression: Compression,
}

/// STRING atom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRecord {
    pub value: Option<String>,
}

/// ATTACHMENT atom: shapes displayed by a transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub object_ref: u32,
    pub attachment_refs: Vec<u32>,
}

/// END_OF_ARCHIVE atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfArchiveRecord {
    pub root: u32,
}

// =============================================================================
// OBJECT atom
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub id: u32,
    pub type_name: StringIndex,
    pub name: Option<StringIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub header: ObjectHeader,
    pub payload: ObjectPayload,
}

/// Kind-specific part of an OBJECT atom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectPayload {
    /// Shapes, param arrays and generic objects
    Empty,
    Param(ParamRecord),
    Effect(EffectRecord),
    Skin(SkinRecord),
    Curve(CurveRecord),
    Buffer(BufferRecord),
    VertexSource(VertexSourceRecord),
    Primitive(PrimitiveRecord),
    Transform(TransformRecord),
    Texture(TextureRecord),
}

impl ObjectPayload {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectPayload::Empty => "empty",
            ObjectPayload::Param(_) => "param",
            ObjectPayload::Effect(_) => "effect",
            ObjectPayload::Skin(_) => "skin",
            ObjectPayload::Curve(_) => "curve",
            ObjectPayload::Buffer(_) => "buffer",
            ObjectPayload::VertexSource(_) => "vertex source",
            ObjectPayload::Primitive(_) => "primitive",
            ObjectPayload::Transform(_) => "transform",
            ObjectPayload::Texture(_) => "texture",
        }
    }
}

/// Param value. Absent fields mean the class default (false, 0, identity).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub owner_ref: Option<u32>,
    /// Slot in the owning ParamArray
    pub index: Option<u32>,
    pub input_connection_ref: Option<u32>,
    pub bool_value: Option<bool>,
    pub integer_value: Option<i32>,
    pub float_value: Vec<f32>,
    pub indexed_string_value: Option<StringIndex>,
    pub object_ref_value: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub source: Option<StringIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfluenceRecord {
    pub matrix_index: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkinRecord {
    pub influence_arrays: Vec<Vec<InfluenceRecord>>,
    /// 16 column-major floats per matrix
    pub inverse_bind_pose_matrices: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Step,
    Linear,
    Bezier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveKeyRecord {
    pub key_type: KeyType,
    pub input: f32,
    pub output: f32,
    /// in.x, in.y, out.x, out.y for bezier keys, empty otherwise
    pub bezier_tangents: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRecord {
    pub pre_infinity: Infinity,
    pub post_infinity: Infinity,
    pub use_cache: bool,
    pub sample_rate: f32,
    pub keys: Vec<CurveKeyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub id: u32,
    pub name: Option<StringIndex>,
    pub num_components: u32,
    pub field_type: FieldType,
    pub value_float: Vec<f32>,
    /// UINT32 and UINT16 data
    pub value_uint: Vec<u32>,
    pub value_byte: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferRecord {
    pub num_elements: u32,
    pub fields: Vec<FieldRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub field_ref: u32,
    pub start_index: u32,
    pub semantic: Semantic,
    pub semantic_index: u32,
    /// Vertex source feeding this stream
    pub bind: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexSourceRecord {
    pub streams: Vec<StreamRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveRecord {
    pub index_buffer_ref: Option<u32>,
    pub stream_bank_ref: Option<u32>,
    pub primitive_type: PrimitiveType,
    pub number_vertices: u32,
    pub number_primitives: u32,
    pub start_index: u32,
    pub owner_ref: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub parent_ref: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureRecord {
    pub uri: StringIndex,
}
