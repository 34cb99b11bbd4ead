//! Scene Module
//!
//! The in-memory object model the archive publishes from and loads into.
//!
//! ## Layout
//! ```text
//! ┌──────────────────────── Pack ─────────────────────────┐
//! │  ClassRegistry (Arc)      objects: id → Object        │
//! │                                                       │
//! │  Transform ──children──▶ Transform ──shapes──▶ Shape  │
//! │                                                │      │
//! │                                          elements     │
//! │                                                ▼      │
//! │  Buffer ◀──index_buffer── Primitive ──stream_bank──▶  │
//! │    │                                       StreamBank │
//! │  fields ◀─────────────── streams ─────────────┘       │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Objects never hold references to each other, only ids. ParamObjects
//! (everything except params, param arrays and fields) own a table of
//! named params.

mod object;
mod pack;
mod param;
mod registry;

pub use object::{
    Buffer, BufferKind, Curve, CurveKey, CurveKeyKind, Effect, Field, FieldData, FieldType,
    Infinity, Influence, Object, ObjectBody, ObjectId, ObjectKind, Primitive, PrimitiveType,
    Semantic, Shape, Skin, Stream, Texture, Transform, VertexSource, VertexSourceKind,
};
pub use pack::{Pack, ERROR_TEXTURE_URI};
pub use param::{BoundingBox, Param, ParamArray, ParamOwner, ParamValue, RefTarget};
pub use registry::{ClassInfo, ClassRegistry, LIGHTING_TYPE_PARAM, ORIGINAL_URI_PARAM};
