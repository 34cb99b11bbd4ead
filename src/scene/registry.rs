//! Class registry
//!
//! Maps class names to constructors. The archive stores class names as
//! interned strings and rebuilds every object through this table.

use std::collections::HashMap;

use crate::error::Result;
use crate::math::Matrix4;

use super::object::{
    Buffer, BufferKind, Curve, Effect, FieldType, ObjectBody, ObjectKind, Shape, Skin, Texture,
    Transform, VertexSource, VertexSourceKind,
};
use super::param::{BoundingBox, Param, ParamArray, ParamValue, RefTarget};
use super::{ObjectId, Pack};

/// Name of the param holding a material's lighting model
pub const LIGHTING_TYPE_PARAM: &str = "collada.lightingType";

/// Name of the param holding a texture's source URI
pub const ORIGINAL_URI_PARAM: &str = "original_uri";

/// Constructor signature for an object body
pub type BuildFn = fn() -> ObjectBody;

/// Hook installing construction-time params on a fresh object
pub type InitFn = fn(&mut Pack, ObjectId) -> Result<()>;

/// Registry entry for one class
#[derive(Clone)]
pub struct ClassInfo {
    pub name: &'static str,
    pub kind: ObjectKind,
    build: BuildFn,
    init: Option<InitFn>,
}

impl std::fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl ClassInfo {
    pub fn new(name: &'static str, build: BuildFn) -> Self {
        Self {
            name,
            kind: build().kind(),
            build,
            init: None,
        }
    }

    pub fn with_init(mut self, init: InitFn) -> Self {
        self.init = Some(init);
        self
    }

    /// Whether instances own a named-param table
    pub fn is_param_object(&self) -> bool {
        !matches!(
            self.kind,
            ObjectKind::Param | ObjectKind::ParamArray | ObjectKind::Field
        )
    }

    pub(crate) fn build(&self) -> ObjectBody {
        (self.build)()
    }

    pub(crate) fn init(&self) -> Option<InitFn> {
        self.init
    }
}

/// Registry of known classes
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    by_name: HashMap<&'static str, usize>,
}

impl ClassRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in class
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for info in standard_classes() {
            registry.register(info);
        }
        registry
    }

    /// Add or replace a class
    pub fn register(&mut self, info: ClassInfo) {
        match self.by_name.get(info.name) {
            Some(&slot) => self.classes[slot] = info,
            None => {
                self.by_name.insert(info.name, self.classes.len());
                self.classes.push(info);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.by_name.get(name).map(|&slot| &self.classes[slot])
    }

    /// All registered classes, in registration order
    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }
}

// =============================================================================
// Built-in classes
// =============================================================================

fn param_body(value: ParamValue) -> ObjectBody {
    ObjectBody::Param(Param::new(value))
}

fn ref_param(target: RefTarget) -> ObjectBody {
    param_body(ParamValue::Ref {
        target,
        value: None,
    })
}

fn standard_classes() -> Vec<ClassInfo> {
    vec![
        // Params
        ClassInfo::new("ParamBoolean", || param_body(ParamValue::Boolean(false))),
        ClassInfo::new("ParamInteger", || param_body(ParamValue::Integer(0))),
        ClassInfo::new("ParamString", || param_body(ParamValue::String(String::new()))),
        ClassInfo::new("ParamFloat", || param_body(ParamValue::Float(0.0))),
        ClassInfo::new("ParamFloat2", || param_body(ParamValue::Float2([0.0; 2]))),
        ClassInfo::new("ParamFloat3", || param_body(ParamValue::Float3([0.0; 3]))),
        ClassInfo::new("ParamFloat4", || param_body(ParamValue::Float4([0.0; 4]))),
        ClassInfo::new("ParamMatrix4", || {
            param_body(ParamValue::Matrix4(Matrix4::IDENTITY))
        }),
        ClassInfo::new("ParamBoundingBox", || {
            param_body(ParamValue::BoundingBox(BoundingBox::default()))
        }),
        ClassInfo::new("ParamVertexBufferStream", || {
            param_body(ParamValue::VertexBufferStream)
        }),
        ClassInfo::new("ParamDrawContext", || ref_param(RefTarget::DrawContext)),
        ClassInfo::new("ParamDrawList", || ref_param(RefTarget::DrawList)),
        ClassInfo::new("ParamEffect", || ref_param(RefTarget::Effect)),
        ClassInfo::new("ParamMaterial", || ref_param(RefTarget::Material)),
        ClassInfo::new("ParamParamArray", || ref_param(RefTarget::ParamArray)),
        ClassInfo::new("ParamSampler", || ref_param(RefTarget::Sampler)),
        ClassInfo::new("ParamSkin", || ref_param(RefTarget::Skin)),
        ClassInfo::new("ParamState", || ref_param(RefTarget::State)),
        ClassInfo::new("ParamStreamBank", || ref_param(RefTarget::StreamBank)),
        ClassInfo::new("ParamTexture", || ref_param(RefTarget::Texture)),
        ClassInfo::new("ParamTransform", || ref_param(RefTarget::Transform)),
        ClassInfo::new("ParamArray", || ObjectBody::ParamArray(ParamArray::default())),
        // Render state and materials
        ClassInfo::new("DrawContext", || ObjectBody::Generic),
        ClassInfo::new("DrawList", || ObjectBody::Generic),
        ClassInfo::new("State", || ObjectBody::Generic),
        ClassInfo::new("Sampler", || ObjectBody::Generic).with_init(init_sampler),
        ClassInfo::new("Material", || ObjectBody::Generic).with_init(init_material),
        ClassInfo::new("Effect", || ObjectBody::Effect(Effect::default())),
        // Animation
        ClassInfo::new("Skin", || ObjectBody::Skin(Skin::default())),
        ClassInfo::new("Curve", || ObjectBody::Curve(Curve::default())),
        // Geometry
        ClassInfo::new("VertexBuffer", || {
            ObjectBody::Buffer(Buffer::new(BufferKind::Vertex))
        }),
        ClassInfo::new("SourceBuffer", || {
            ObjectBody::Buffer(Buffer::new(BufferKind::Source))
        }),
        ClassInfo::new("IndexBuffer", || {
            ObjectBody::Buffer(Buffer::new(BufferKind::Index))
        })
        .with_init(init_index_buffer),
        ClassInfo::new("DestinationBuffer", || {
            ObjectBody::Buffer(Buffer::new(BufferKind::Destination))
        }),
        ClassInfo::new("StreamBank", || {
            ObjectBody::VertexSource(VertexSource {
                kind: VertexSourceKind::StreamBank,
                streams: Vec::new(),
            })
        }),
        ClassInfo::new("SkinEval", || {
            ObjectBody::VertexSource(VertexSource {
                kind: VertexSourceKind::SkinEval,
                streams: Vec::new(),
            })
        })
        .with_init(init_skin_eval),
        ClassInfo::new("Primitive", || ObjectBody::Primitive(Default::default())),
        ClassInfo::new("Shape", || ObjectBody::Shape(Shape::default())),
        // Scene
        ClassInfo::new("Transform", || ObjectBody::Transform(Transform::default()))
            .with_init(init_transform),
        ClassInfo::new("Texture2D", || ObjectBody::Texture(Texture::default()))
            .with_init(init_texture),
        ClassInfo::new("TextureCUBE", || ObjectBody::Texture(Texture::default()))
            .with_init(init_texture),
    ]
}

fn init_transform(pack: &mut Pack, id: ObjectId) -> Result<()> {
    pack.create_param(id, "localMatrix", "ParamMatrix4")?;
    let world = pack.create_param(id, "worldMatrix", "ParamMatrix4")?;
    pack.set_read_only(world, true)?;
    let visible = pack.create_param(id, "visible", "ParamBoolean")?;
    pack.set_param_value(visible, ParamValue::Boolean(true))?;
    pack.create_param(id, "cull", "ParamBoolean")?;
    pack.create_param(id, "boundingBox", "ParamBoundingBox")?;
    Ok(())
}

fn init_texture(pack: &mut Pack, id: ObjectId) -> Result<()> {
    pack.create_param(id, ORIGINAL_URI_PARAM, "ParamString")?;
    Ok(())
}

fn init_material(pack: &mut Pack, id: ObjectId) -> Result<()> {
    pack.create_param(id, "effect", "ParamEffect")?;
    pack.create_param(id, "drawList", "ParamDrawList")?;
    Ok(())
}

fn init_sampler(pack: &mut Pack, id: ObjectId) -> Result<()> {
    pack.create_param(id, "texture", "ParamTexture")?;
    Ok(())
}

fn init_skin_eval(pack: &mut Pack, id: ObjectId) -> Result<()> {
    pack.create_param(id, "skin", "ParamSkin")?;
    Ok(())
}

fn init_index_buffer(pack: &mut Pack, id: ObjectId) -> Result<()> {
    pack.create_field(id, FieldType::UInt32, 1)?;
    Ok(())
}
