//! Vertex attribute formats.

/// Format of a vertex attribute or of a shader stage varying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Column-major 4x4 float matrix. Occupies four consecutive locations.
    Float4x4,
    /// Single 32-bit signed integer.
    Int,
    /// Two 32-bit signed integers.
    Int2,
    /// Three 32-bit signed integers.
    Int3,
    /// Four 32-bit signed integers.
    Int4,
    /// Single 32-bit unsigned integer.
    Uint,
    /// Two 32-bit unsigned integers.
    Uint2,
    /// Three 32-bit unsigned integers.
    Uint3,
    /// Four 32-bit unsigned integers.
    Uint4,
    /// Two 16-bit unsigned integers (normalized to 0.0-1.0).
    Unorm16x2,
    /// Four 16-bit unsigned integers (normalized to 0.0-1.0).
    Unorm16x4,
    /// Two 16-bit signed integers (normalized to -1.0-1.0).
    Snorm16x2,
    /// Four 16-bit signed integers (normalized to -1.0-1.0).
    Snorm16x4,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
    /// Four 8-bit signed integers (normalized to -1.0-1.0).
    Snorm8x4,
}

impl VertexFormat {
    /// Size in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::Uint => 4,
            Self::Float2 | Self::Int2 | Self::Uint2 => 8,
            Self::Float3 | Self::Int3 | Self::Uint3 => 12,
            Self::Float4 | Self::Int4 | Self::Uint4 => 16,
            Self::Float4x4 => 64,
            Self::Unorm16x2 | Self::Snorm16x2 | Self::Unorm8x4 | Self::Snorm8x4 => 4,
            Self::Unorm16x4 | Self::Snorm16x4 => 8,
        }
    }

    /// Number of shader locations the format occupies.
    pub fn location_count(&self) -> u32 {
        match self {
            Self::Float4x4 => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(VertexFormat::Float3.size(), 12);
        assert_eq!(VertexFormat::Float4x4.size(), 64);
        assert_eq!(VertexFormat::Unorm8x4.size(), 4);
        assert_eq!(VertexFormat::Snorm16x4.size(), 8);
    }

    #[test]
    fn test_matrix_spans_four_locations() {
        assert_eq!(VertexFormat::Float4x4.location_count(), 4);
        assert_eq!(VertexFormat::Float4.location_count(), 1);
    }
}
