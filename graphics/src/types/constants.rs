//! Constant buffer packing.
//!
//! Constant payloads use one convention on every backend:
//!
//! - matrices are column-major;
//! - scalars are 4-byte aligned, `vec2` 8-byte, `vec3`/`vec4` 16-byte;
//! - a `mat4` is four 16-byte columns;
//! - scalar array elements are padded to 16 bytes;
//! - the whole block is rounded up to 16 bytes.
//!
//! This is the std140 layout. Shaders must declare their constant blocks to
//! match. Nothing checks this at runtime.

use bytemuck::Pod;

/// Alignment of a whole constant block.
pub const CONSTANT_BLOCK_ALIGNMENT: usize = 16;

/// Packs values into a std140 constant block.
///
/// Each `write_*` call aligns the cursor for the value's type, appends the
/// value and returns the offset it was written at.
///
/// # Example
///
/// ```
/// use tessera_graphics::ConstantWriter;
///
/// let mut writer = ConstantWriter::new();
/// assert_eq!(writer.write_vec3([1.0, 0.0, 0.0]), 0);
/// assert_eq!(writer.write_f32(0.5), 12); // packs into the vec3's padding
/// assert_eq!(writer.write_vec2([0.0, 1.0]), 16);
/// assert_eq!(writer.finish().len(), 32);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConstantWriter {
    bytes: Vec<u8>,
}

impl ConstantWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far, including alignment padding.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_f32(&mut self, value: f32) -> usize {
        self.push(4, &value)
    }

    pub fn write_i32(&mut self, value: i32) -> usize {
        self.push(4, &value)
    }

    pub fn write_u32(&mut self, value: u32) -> usize {
        self.push(4, &value)
    }

    /// Booleans occupy a full 32-bit word.
    pub fn write_bool(&mut self, value: bool) -> usize {
        self.push(4, &u32::from(value))
    }

    pub fn write_vec2(&mut self, value: [f32; 2]) -> usize {
        self.push(8, &value)
    }

    pub fn write_vec3(&mut self, value: [f32; 3]) -> usize {
        self.push(16, &value)
    }

    pub fn write_vec4(&mut self, value: [f32; 4]) -> usize {
        self.push(16, &value)
    }

    /// Writes a matrix given as four columns.
    pub fn write_mat4(&mut self, columns: [[f32; 4]; 4]) -> usize {
        self.push(16, &columns)
    }

    /// Writes a scalar array, one 16-byte slot per element.
    pub fn write_f32_array(&mut self, values: &[f32]) -> usize {
        self.align(CONSTANT_BLOCK_ALIGNMENT);
        let start = self.bytes.len();
        for value in values {
            self.bytes.extend_from_slice(bytemuck::bytes_of(value));
            self.bytes.extend_from_slice(&[0; 12]);
        }
        start
    }

    /// Finishes the block, padding it to [`CONSTANT_BLOCK_ALIGNMENT`].
    pub fn finish(mut self) -> Vec<u8> {
        self.align(CONSTANT_BLOCK_ALIGNMENT);
        self.bytes
    }

    fn push<T: Pod>(&mut self, alignment: usize, value: &T) -> usize {
        self.align(alignment);
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
        offset
    }

    fn align(&mut self, alignment: usize) {
        let padded = self.bytes.len().next_multiple_of(alignment);
        self.bytes.resize(padded, 0);
    }
}
