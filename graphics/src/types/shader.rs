//! Shader stage and interface descriptions.

use bitflags::bitflags;

use super::VertexFormat;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Graphics stages in pipeline order.
    pub const GRAPHICS: [Self; 5] = [
        Self::Vertex,
        Self::TessControl,
        Self::TessEvaluation,
        Self::Geometry,
        Self::Fragment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

bitflags! {
    /// Set of shader stages, used for binding visibility.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::TessControl => Self::TESS_CONTROL,
            ShaderStage::TessEvaluation => Self::TESS_EVALUATION,
            ShaderStage::Geometry => Self::GEOMETRY,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Compute => Self::COMPUTE,
        }
    }
}

/// Shader program as handed to the backend. Never parsed by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderCode {
    /// Compiled byte code.
    Binary(Vec<u8>),
    /// Source text.
    Source(String),
}

impl ShaderCode {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Binary(bytes) => bytes.is_empty(),
            Self::Source(text) => text.trim().is_empty(),
        }
    }
}

/// One input or output of a shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderVarying {
    pub location: u32,
    pub format: VertexFormat,
}

impl ShaderVarying {
    pub fn new(location: u32, format: VertexFormat) -> Self {
        Self { location, format }
    }
}

/// Declared inputs and outputs of a shader stage.
///
/// Linkage between stages is checked against this declaration at pipeline
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderInterface {
    pub inputs: Vec<ShaderVarying>,
    pub outputs: Vec<ShaderVarying>,
}

impl ShaderInterface {
    pub fn input(&self, location: u32) -> Option<&ShaderVarying> {
        self.inputs.iter().find(|v| v.location == location)
    }

    pub fn output(&self, location: u32) -> Option<&ShaderVarying> {
        self.outputs.iter().find(|v| v.location == location)
    }
}

/// Descriptor for creating a shader.
///
/// # Example
///
/// ```
/// use tessera_graphics::{ShaderCode, ShaderDescriptor, ShaderStage, VertexFormat};
///
/// let vs = ShaderDescriptor::new(ShaderStage::Vertex, ShaderCode::Source("void main() {}".into()))
///     .with_input(0, VertexFormat::Float3)
///     .with_output(0, VertexFormat::Float4)
///     .with_label("basic.vert");
/// assert_eq!(vs.interface.inputs.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDescriptor {
    /// Debug label for the shader.
    pub label: Option<String>,
    pub stage: ShaderStage,
    pub code: ShaderCode,
    pub entry_point: String,
    pub interface: ShaderInterface,
}

impl ShaderDescriptor {
    pub fn new(stage: ShaderStage, code: ShaderCode) -> Self {
        Self {
            label: None,
            stage,
            code,
            entry_point: "main".to_string(),
            interface: ShaderInterface::default(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Declare an input varying.
    pub fn with_input(mut self, location: u32, format: VertexFormat) -> Self {
        self.interface.inputs.push(ShaderVarying::new(location, format));
        self
    }

    /// Declare an output varying.
    pub fn with_output(mut self, location: u32, format: VertexFormat) -> Self {
        self.interface.outputs.push(ShaderVarying::new(location, format));
        self
    }
}
