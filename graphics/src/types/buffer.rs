//! Buffer types and descriptors.

use std::fmt;

/// CPU access class of a resource, fixed at creation.
///
/// It decides what happens when the CPU wants to touch a resource that an
/// unretired submission still references:
///
/// - [`Static`](Usage::Static): the access fails with `ResourceInUse`.
/// - [`Dynamic`](Usage::Dynamic) and [`Readback`](Usage::Readback): the
///   access blocks until the last referencing fence signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    /// Written once (or rarely) and then only read by the GPU.
    #[default]
    Static,
    /// Rewritten by the CPU frequently.
    Dynamic,
    /// Written by the GPU and read back by the CPU.
    Readback,
}

impl Usage {
    /// Whether CPU access waits for in-flight work instead of failing.
    pub fn waits_for_gpu(self) -> bool {
        !matches!(self, Self::Static)
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex or per-instance data with a fixed element stride.
    Vertex { stride: u32 },
    /// Indices of the given format.
    Index(IndexFormat),
    /// Shader constants, packed std140-style.
    Constant,
    /// Read-write shader storage.
    Storage,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex { stride } => write!(f, "vertex buffer (stride {stride})"),
            Self::Index(format) => write!(f, "index buffer ({format:?})"),
            Self::Constant => f.write_str("constant buffer"),
            Self::Storage => f.write_str("storage buffer"),
        }
    }
}

/// Descriptor for creating a buffer.
///
/// # Example
///
/// ```
/// use tessera_graphics::{BufferDescriptor, IndexFormat, Usage};
///
/// let vertices = BufferDescriptor::vertex(3, 20).with_label("triangle");
/// assert_eq!(vertices.size, 60);
///
/// let indices = BufferDescriptor::index(6, IndexFormat::Uint16).with_usage(Usage::Dynamic);
/// assert_eq!(indices.element_count(), Some(6));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Binding kind.
    pub kind: BufferKind,
    /// CPU access class.
    pub usage: Usage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, kind: BufferKind) -> Self {
        Self {
            label: None,
            size,
            kind,
            usage: Usage::Static,
        }
    }

    /// Vertex buffer holding `count` elements of `stride` bytes.
    pub fn vertex(count: u32, stride: u32) -> Self {
        Self::new(u64::from(count) * u64::from(stride), BufferKind::Vertex { stride })
    }

    /// Index buffer holding `count` indices.
    pub fn index(count: u32, format: IndexFormat) -> Self {
        Self::new(u64::from(count) * format.size(), BufferKind::Index(format))
    }

    /// Constant buffer of `size` bytes.
    pub fn constant(size: u64) -> Self {
        Self::new(size, BufferKind::Constant)
    }

    /// Storage buffer of `size` bytes.
    pub fn storage(size: u64) -> Self {
        Self::new(size, BufferKind::Storage)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the CPU access class.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Number of elements for vertex and index buffers.
    pub fn element_count(&self) -> Option<u64> {
        match self.kind {
            BufferKind::Vertex { stride } if stride > 0 => Some(self.size / u64::from(stride)),
            BufferKind::Index(format) => Some(self.size / format.size()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_descriptor_size() {
        let desc = BufferDescriptor::vertex(4, 32);
        assert_eq!(desc.size, 128);
        assert_eq!(desc.kind, BufferKind::Vertex { stride: 32 });
        assert_eq!(desc.element_count(), Some(4));
    }

    #[test]
    fn test_index_descriptor_size() {
        let desc = BufferDescriptor::index(3, IndexFormat::Uint16);
        assert_eq!(desc.size, 6);
        assert_eq!(desc.element_count(), Some(3));
    }

    #[test]
    fn test_constant_has_no_elements() {
        let desc = BufferDescriptor::constant(64).with_usage(Usage::Dynamic);
        assert_eq!(desc.element_count(), None);
        assert!(desc.usage.waits_for_gpu());
        assert!(!Usage::Static.waits_for_gpu());
    }
}
