//! Vertex input and resource binding layouts of a pipeline.
//!
//! Vertex layouts describe the structure of vertex data across multiple
//! buffers. Each vertex buffer is bound to a slot (0, 1, 2, ...). Attributes
//! name the shader input location they feed and the buffer slot they read
//! from via `buffer_index`.
//!
//! # Example
//!
//! ```
//! use tessera_graphics::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexLayout};
//!
//! // Buffer 0: static texcoords, buffer 1: positions updated every frame
//! let layout = VertexLayout::new()
//!     .with_buffer(VertexBufferLayout::new(8))
//!     .with_buffer(VertexBufferLayout::new(12))
//!     .with_attribute(VertexAttribute::new(1, VertexFormat::Float2, 0))
//!     .with_attribute(VertexAttribute::new(0, VertexFormat::Float3, 0).at_buffer(1));
//! assert!(layout.validate(16).is_ok());
//! ```

use std::collections::HashSet;

use crate::error::PipelineError;
use crate::types::{ShaderStages, VertexFormat};

/// How the vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Buffer advances once per vertex (default).
    #[default]
    Vertex,
    /// Buffer advances once per instance (for instanced rendering).
    Instance,
}

/// Describes a single vertex buffer binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Stride in bytes between consecutive elements.
    pub stride: u32,
    /// How the buffer advances (per-vertex or per-instance).
    pub step_mode: VertexStepMode,
}

impl VertexBufferLayout {
    /// Create a new vertex buffer layout with the given stride.
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Vertex,
        }
    }

    /// Create a per-instance buffer layout.
    pub fn per_instance(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Instance,
        }
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location fed by this attribute.
    pub location: u32,
    /// Data format of this attribute.
    pub format: VertexFormat,
    /// Byte offset within the vertex buffer.
    pub offset: u32,
    /// Index of the vertex buffer this attribute reads from.
    pub buffer_index: u32,
}

impl VertexAttribute {
    /// Create an attribute reading from buffer 0.
    pub fn new(location: u32, format: VertexFormat, offset: u32) -> Self {
        Self {
            location,
            format,
            offset,
            buffer_index: 0,
        }
    }

    /// Set the buffer index for this attribute.
    pub fn at_buffer(mut self, buffer_index: u32) -> Self {
        self.buffer_index = buffer_index;
        self
    }

    fn end(&self) -> u32 {
        self.offset.saturating_add(self.format.size())
    }

    fn locations(&self) -> std::ops::Range<u32> {
        self.location..self.location.saturating_add(self.format.location_count())
    }
}

/// Describes the layout of vertex data across one or more buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Descriptions of each vertex buffer binding.
    pub buffers: Vec<VertexBufferLayout>,
    /// The vertex attributes, each referencing a buffer by index.
    pub attributes: Vec<VertexAttribute>,
    /// Optional label for debugging.
    pub label: Option<String>,
}

impl VertexLayout {
    /// Create a new empty vertex layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single interleaved buffer with tightly packed attributes at locations
    /// `0..formats.len()`.
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut layout = Self::new();
        let mut offset = 0;
        let mut location = 0;
        for &format in formats {
            layout
                .attributes
                .push(VertexAttribute::new(location, format, offset));
            offset += format.size();
            location += format.location_count();
        }
        layout.with_buffer(VertexBufferLayout::new(offset))
    }

    /// Add a vertex buffer binding.
    pub fn with_buffer(mut self, buffer: VertexBufferLayout) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Add a vertex attribute.
    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the number of vertex buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Get the stride for a specific buffer.
    pub fn buffer_stride(&self, buffer_index: usize) -> u32 {
        self.buffers
            .get(buffer_index)
            .map(|b| b.stride)
            .unwrap_or(0)
    }

    /// Attribute that feeds shader input `location`.
    pub fn attribute_at(&self, location: u32) -> Option<&VertexAttribute> {
        self.attributes
            .iter()
            .find(|attr| attr.locations().contains(&location))
    }

    /// Get all attributes for a specific buffer.
    pub fn attributes_for_buffer(
        &self,
        buffer_index: u32,
    ) -> impl Iterator<Item = &VertexAttribute> {
        self.attributes
            .iter()
            .filter(move |attr| attr.buffer_index == buffer_index)
    }

    /// Validate the layout.
    ///
    /// Checks the buffer count against `max_vertex_buffers`, buffer indices,
    /// strides, duplicate locations and overlapping attributes.
    pub fn validate(&self, max_vertex_buffers: u32) -> Result<(), PipelineError> {
        if self.buffers.len() > max_vertex_buffers as usize {
            return Err(PipelineError::TooManyVertexBuffers {
                count: self.buffers.len(),
                max: max_vertex_buffers,
            });
        }

        let mut locations = HashSet::new();
        for attr in &self.attributes {
            if attr.location.checked_add(attr.format.location_count()).is_none() {
                return Err(PipelineError::LocationOutOfRange(attr.location));
            }
            for location in attr.locations() {
                if !locations.insert(location) {
                    return Err(PipelineError::DuplicateLocation(location));
                }
            }

            let Some(buffer) = self.buffers.get(attr.buffer_index as usize) else {
                return Err(PipelineError::BufferIndexOutOfRange {
                    location: attr.location,
                    buffer_index: attr.buffer_index,
                    buffer_count: self.buffers.len(),
                });
            };
            if buffer.stride == 0 {
                return Err(PipelineError::ZeroStride(attr.buffer_index));
            }
            if attr.end() > buffer.stride {
                return Err(PipelineError::AttributeOutOfStride {
                    location: attr.location,
                    end: attr.end(),
                    stride: buffer.stride,
                });
            }
        }

        for (i, first) in self.attributes.iter().enumerate() {
            for second in &self.attributes[i + 1..] {
                if first.buffer_index == second.buffer_index
                    && first.offset < second.end()
                    && second.offset < first.end()
                {
                    return Err(PipelineError::OverlappingAttributes {
                        first: first.location,
                        second: second.location,
                    });
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Resource bindings
// ============================================================================

/// Kind of resource a binding slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Constant (uniform) buffer.
    ConstantBuffer,
    /// Read-write storage buffer.
    StorageBuffer,
    /// Sampled texture.
    Texture,
    /// Read-write storage texture.
    StorageTexture,
}

impl BindingType {
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::ConstantBuffer | Self::StorageBuffer)
    }
}

/// One declared binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingLayoutEntry {
    pub slot: u32,
    pub binding_type: BindingType,
    /// Stages that read the slot.
    pub visibility: ShaderStages,
}

impl BindingLayoutEntry {
    pub fn new(slot: u32, binding_type: BindingType, visibility: ShaderStages) -> Self {
        Self {
            slot,
            binding_type,
            visibility,
        }
    }

    pub fn constant_buffer(slot: u32, visibility: ShaderStages) -> Self {
        Self::new(slot, BindingType::ConstantBuffer, visibility)
    }

    pub fn storage_buffer(slot: u32, visibility: ShaderStages) -> Self {
        Self::new(slot, BindingType::StorageBuffer, visibility)
    }

    pub fn texture(slot: u32, visibility: ShaderStages) -> Self {
        Self::new(slot, BindingType::Texture, visibility)
    }

    pub fn storage_texture(slot: u32, visibility: ShaderStages) -> Self {
        Self::new(slot, BindingType::StorageTexture, visibility)
    }
}

/// The fixed set of binding slots a pipeline declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindingLayout {
    pub entries: Vec<BindingLayoutEntry>,
}

impl BindingLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, entry: BindingLayoutEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Entry declared for `slot`.
    pub fn entry(&self, slot: u32) -> Option<&BindingLayoutEntry> {
        self.entries.iter().find(|entry| entry.slot == slot)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks for duplicate slots and for entries that no stage in `stages`
    /// can see.
    pub fn validate(&self, stages: ShaderStages) -> Result<(), PipelineError> {
        let mut slots = HashSet::new();
        for entry in &self.entries {
            if !slots.insert(entry.slot) {
                return Err(PipelineError::DuplicateBindingSlot(entry.slot));
            }
            if !entry.visibility.intersects(stages) {
                return Err(PipelineError::InvalidVisibility { slot: entry.slot });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_buffer_layout() {
        let buffer = VertexBufferLayout::new(32);
        assert_eq!(buffer.stride, 32);
        assert_eq!(buffer.step_mode, VertexStepMode::Vertex);

        let instance_buffer = VertexBufferLayout::per_instance(64);
        assert_eq!(instance_buffer.step_mode, VertexStepMode::Instance);
    }

    #[test]
    fn test_packed_layout() {
        let layout = VertexLayout::packed(&[VertexFormat::Float3, VertexFormat::Float2]);
        assert_eq!(layout.buffer_count(), 1);
        assert_eq!(layout.buffer_stride(0), 20);
        assert_eq!(layout.attribute_at(1).map(|a| a.offset), Some(12));
        assert!(layout.validate(16).is_ok());
    }

    #[test]
    fn test_matrix_attribute_spans_locations() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::per_instance(64))
            .with_attribute(VertexAttribute::new(2, VertexFormat::Float4x4, 0));
        assert!(layout.attribute_at(5).is_some());
        assert!(layout.attribute_at(6).is_none());

        let clash = layout
            .clone()
            .with_buffer(VertexBufferLayout::new(4))
            .with_attribute(VertexAttribute::new(4, VertexFormat::Float, 0).at_buffer(1));
        assert_eq!(clash.validate(16), Err(PipelineError::DuplicateLocation(4)));
    }

    #[test]
    fn test_multi_buffer() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(8))
            .with_buffer(VertexBufferLayout::new(24))
            .with_attribute(VertexAttribute::new(2, VertexFormat::Float2, 0))
            .with_attribute(VertexAttribute::new(0, VertexFormat::Float3, 0).at_buffer(1))
            .with_attribute(VertexAttribute::new(1, VertexFormat::Float3, 12).at_buffer(1));

        assert!(layout.validate(16).is_ok());
        assert_eq!(layout.attributes_for_buffer(0).count(), 1);
        assert_eq!(layout.attributes_for_buffer(1).count(), 2);
    }

    #[test]
    fn test_invalid_layouts() {
        let out_of_range = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(12))
            .with_attribute(VertexAttribute::new(0, VertexFormat::Float3, 0).at_buffer(5));
        assert!(matches!(
            out_of_range.validate(16),
            Err(PipelineError::BufferIndexOutOfRange { buffer_index: 5, .. })
        ));

        let past_stride = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(12))
            .with_attribute(VertexAttribute::new(0, VertexFormat::Float3, 4));
        assert_eq!(
            past_stride.validate(16),
            Err(PipelineError::AttributeOutOfStride {
                location: 0,
                end: 16,
                stride: 12
            })
        );

        let overlapping = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(24))
            .with_attribute(VertexAttribute::new(0, VertexFormat::Float3, 0))
            .with_attribute(VertexAttribute::new(1, VertexFormat::Float3, 8));
        assert_eq!(
            overlapping.validate(16),
            Err(PipelineError::OverlappingAttributes { first: 0, second: 1 })
        );

        let zero_stride = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(0))
            .with_attribute(VertexAttribute::new(0, VertexFormat::Float, 0));
        assert_eq!(zero_stride.validate(16), Err(PipelineError::ZeroStride(0)));

        let last_location = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(16))
            .with_attribute(VertexAttribute::new(u32::MAX, VertexFormat::Float4, 0));
        assert_eq!(
            last_location.validate(16),
            Err(PipelineError::LocationOutOfRange(u32::MAX))
        );
        assert!(last_location.attribute_at(u32::MAX).is_none());

        let matrix_past_end = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(64))
            .with_attribute(VertexAttribute::new(u32::MAX - 3, VertexFormat::Float4x4, 0));
        assert_eq!(
            matrix_past_end.validate(16),
            Err(PipelineError::LocationOutOfRange(u32::MAX - 3))
        );
    }

    #[test]
    fn test_vertex_buffer_limit() {
        let mut layout = VertexLayout::new();
        for _ in 0..17 {
            layout = layout.with_buffer(VertexBufferLayout::new(4));
        }
        assert_eq!(
            layout.validate(16),
            Err(PipelineError::TooManyVertexBuffers { count: 17, max: 16 })
        );
    }

    #[test]
    fn test_binding_layout_validation() {
        let layout = BindingLayout::new()
            .with_entry(BindingLayoutEntry::constant_buffer(0, ShaderStages::VERTEX))
            .with_entry(BindingLayoutEntry::texture(1, ShaderStages::FRAGMENT));
        assert!(layout.validate(ShaderStages::VERTEX_FRAGMENT).is_ok());
        assert_eq!(
            layout.entry(1).map(|e| e.binding_type),
            Some(BindingType::Texture)
        );

        assert_eq!(
            layout.validate(ShaderStages::VERTEX),
            Err(PipelineError::InvalidVisibility { slot: 1 })
        );

        let duplicate = layout.with_entry(BindingLayoutEntry::texture(0, ShaderStages::FRAGMENT));
        assert_eq!(
            duplicate.validate(ShaderStages::VERTEX_FRAGMENT),
            Err(PipelineError::DuplicateBindingSlot(0))
        );
    }
}
