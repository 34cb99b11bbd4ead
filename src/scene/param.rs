//! Parameters
//!
//! A param is a typed value slot owned by a ParamObject (by name) or by a
//! ParamArray (by index). Params can be bound: the destination's value is
//! then driven by its input connection and the source tracks its outputs.

use std::collections::BTreeSet;

use crate::math::Matrix4;

use super::{Object, ObjectBody, ObjectId, VertexSourceKind};

/// Axis-aligned bounding box. Never archived; recomputed after load.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub valid: bool,
}

/// Kind of object a reference param may point to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTarget {
    DrawContext,
    DrawList,
    Effect,
    Material,
    ParamArray,
    Sampler,
    Skin,
    State,
    StreamBank,
    Texture,
    Transform,
}

impl RefTarget {
    /// Whether `object` may be stored in a param of this target kind
    pub fn accepts(&self, object: &Object) -> bool {
        match (self, &object.body) {
            (RefTarget::Effect, ObjectBody::Effect(_)) => true,
            (RefTarget::ParamArray, ObjectBody::ParamArray(_)) => true,
            (RefTarget::Skin, ObjectBody::Skin(_)) => true,
            (RefTarget::Texture, ObjectBody::Texture(_)) => true,
            (RefTarget::Transform, ObjectBody::Transform(_)) => true,
            (RefTarget::StreamBank, ObjectBody::VertexSource(v)) => {
                v.kind == VertexSourceKind::StreamBank
            }
            (RefTarget::DrawContext, ObjectBody::Generic) => object.class == "DrawContext",
            (RefTarget::DrawList, ObjectBody::Generic) => object.class == "DrawList",
            (RefTarget::Material, ObjectBody::Generic) => object.class == "Material",
            (RefTarget::Sampler, ObjectBody::Generic) => object.class == "Sampler",
            (RefTarget::State, ObjectBody::Generic) => object.class == "State",
            _ => false,
        }
    }
}

/// Value held by a param; the variant is fixed by the param's class
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Boolean(bool),
    Integer(i32),
    String(String),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Matrix4(Matrix4),
    BoundingBox(BoundingBox),
    Ref {
        target: RefTarget,
        value: Option<ObjectId>,
    },
    /// Vertex stream slot of a StreamBank or SkinEval
    VertexBufferStream,
}

impl ParamValue {
    /// Human-readable variant name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Boolean(_) => "boolean",
            ParamValue::Integer(_) => "integer",
            ParamValue::String(_) => "string",
            ParamValue::Float(_) => "float",
            ParamValue::Float2(_) => "float2",
            ParamValue::Float3(_) => "float3",
            ParamValue::Float4(_) => "float4",
            ParamValue::Matrix4(_) => "matrix4",
            ParamValue::BoundingBox(_) => "bounding box",
            ParamValue::Ref { .. } => "object reference",
            ParamValue::VertexBufferStream => "vertex buffer stream",
        }
    }

    /// Same variant (and for refs, same target kind)
    pub fn same_kind(&self, other: &ParamValue) -> bool {
        match (self, other) {
            (ParamValue::Ref { target: a, .. }, ParamValue::Ref { target: b, .. }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

/// Where a param lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOwner {
    Object(ObjectId),
    Array { array: ObjectId, index: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: ParamValue,
    pub read_only: bool,
    pub dynamic: bool,
    pub owner: Option<ParamOwner>,
    /// Source param driving this one
    pub input: Option<ObjectId>,
    /// Params bound to this one
    pub outputs: BTreeSet<ObjectId>,
}

impl Param {
    pub fn new(value: ParamValue) -> Self {
        Self {
            value,
            read_only: false,
            dynamic: false,
            owner: None,
            input: None,
            outputs: BTreeSet::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Container of params addressed by index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamArray {
    pub params: Vec<ObjectId>,
}
