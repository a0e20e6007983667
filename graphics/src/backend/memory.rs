//! Host-memory object storage shared by the software backends.

use std::collections::HashMap;
use std::time::Duration;

use tessera_core::sync::{AtomicCounter, Mutex};

use super::{BackendError, BackendHandle};
use crate::types::{Color, Extent3d, ShaderStage, TextureDescriptor, TextureFormat};

/// Pixel storage of one texture, one byte vector per mip level.
#[derive(Debug)]
pub(crate) struct HostImage {
    pub format: TextureFormat,
    pub size: Extent3d,
    pub mips: Vec<Vec<u8>>,
}

impl HostImage {
    fn new(descriptor: &TextureDescriptor) -> Result<Self, BackendError> {
        let mips = (0..descriptor.mip_level_count)
            .map(|level| {
                zeroed(descriptor.mip_size(level).ok_or(BackendError::OutOfMemory)?)
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        Ok(Self {
            format: descriptor.format,
            size: descriptor.size,
            mips,
        })
    }
}

/// Zero-filled host allocation that reports exhaustion instead of aborting.
pub(crate) fn zeroed(len: u64) -> Result<Vec<u8>, BackendError> {
    let len = usize::try_from(len).map_err(|_| BackendError::OutOfMemory)?;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| BackendError::OutOfMemory)?;
    bytes.resize(len, 0);
    Ok(bytes)
}

#[derive(Debug)]
pub(crate) enum HostObject {
    Buffer(Vec<u8>),
    Texture(HostImage),
    Shader(ShaderStage),
    /// Compiled pipeline, identified by its backend-side program number.
    Pipeline(u64),
}

/// Counts submissions and reports device loss once the configured number
/// has executed.
#[derive(Debug)]
pub(crate) struct LossTrigger {
    executed: AtomicCounter,
    loss_after: Option<u64>,
}

impl LossTrigger {
    pub fn new(loss_after: Option<u64>) -> Self {
        Self {
            executed: AtomicCounter::new(0),
            loss_after,
        }
    }

    /// Registers one more submission. Returns `true` when it must fail.
    pub fn fires(&self) -> bool {
        let previous = self.executed.fetch_add(1);
        self.loss_after.is_some_and(|limit| previous >= limit)
    }
}

/// Backend objects living in host memory.
pub(crate) struct HostHeap {
    next_handle: AtomicCounter,
    objects: Mutex<HashMap<BackendHandle, HostObject>>,
    lost: Mutex<Option<String>>,
    trigger: LossTrigger,
    latency: Duration,
}

impl HostHeap {
    pub fn new(loss_after: Option<u64>, latency: Duration) -> Self {
        Self {
            next_handle: AtomicCounter::new(1),
            objects: Mutex::new(HashMap::new()),
            lost: Mutex::new(None),
            trigger: LossTrigger::new(loss_after),
            latency,
        }
    }

    pub fn insert(&self, object: HostObject) -> Result<BackendHandle, BackendError> {
        self.check_alive()?;
        let handle = BackendHandle(self.next_handle.fetch_add(1));
        self.objects.lock().insert(handle, object);
        Ok(handle)
    }

    pub fn insert_texture(&self, descriptor: &TextureDescriptor) -> Result<BackendHandle, BackendError> {
        let image = HostImage::new(descriptor)?;
        self.insert(HostObject::Texture(image))
    }

    pub fn remove(&self, handle: BackendHandle) -> Result<HostObject, BackendError> {
        self.objects
            .lock()
            .remove(&handle)
            .ok_or(BackendError::InvalidHandle(handle))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Runs `f` on the object behind `handle`.
    pub fn with_object<R>(
        &self,
        handle: BackendHandle,
        f: impl FnOnce(&mut HostObject) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        self.check_alive()?;
        let mut objects = self.objects.lock();
        let object = objects
            .get_mut(&handle)
            .ok_or(BackendError::InvalidHandle(handle))?;
        f(object)
    }

    pub fn write_buffer(&self, handle: BackendHandle, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        self.with_object(handle, |object| {
            let HostObject::Buffer(bytes) = object else {
                return Err(BackendError::InvalidHandle(handle));
            };
            let range = byte_range(handle, offset, data.len() as u64, bytes.len())?;
            bytes[range].copy_from_slice(data);
            Ok(())
        })
    }

    pub fn read_buffer(&self, handle: BackendHandle, offset: u64, size: u64) -> Result<Vec<u8>, BackendError> {
        self.with_object(handle, |object| {
            let HostObject::Buffer(bytes) = object else {
                return Err(BackendError::InvalidHandle(handle));
            };
            let range = byte_range(handle, offset, size, bytes.len())?;
            Ok(bytes[range].to_vec())
        })
    }

    pub fn write_texture(&self, handle: BackendHandle, mip: u32, data: &[u8]) -> Result<(), BackendError> {
        self.with_object(handle, |object| {
            let level = mip_level(handle, object, mip)?;
            if level.len() != data.len() {
                return Err(BackendError::OutOfRange {
                    handle,
                    end: data.len() as u64,
                    size: level.len() as u64,
                });
            }
            level.copy_from_slice(data);
            Ok(())
        })
    }

    pub fn read_texture(&self, handle: BackendHandle, mip: u32) -> Result<Vec<u8>, BackendError> {
        self.with_object(handle, |object| Ok(mip_level(handle, object, mip)?.clone()))
    }

    /// Fills the base level of a color texture with `color`.
    ///
    /// Formats without a simple packed encoding are left untouched.
    pub fn fill_color(&self, handle: BackendHandle, color: Color) -> Result<bool, BackendError> {
        self.with_object(handle, |object| {
            let HostObject::Texture(image) = object else {
                return Err(BackendError::InvalidHandle(handle));
            };
            let Some(pixel) = encode_color(image.format, color) else {
                return Ok(false);
            };
            if let Some(level) = image.mips.first_mut() {
                for texel in level.chunks_exact_mut(pixel.len()) {
                    texel.copy_from_slice(&pixel);
                }
            }
            Ok(true)
        })
    }

    // ========================================================================
    // Device loss and the simulated timeline
    // ========================================================================

    pub fn check_alive(&self) -> Result<(), BackendError> {
        match &*self.lost.lock() {
            Some(reason) => Err(BackendError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.lock().is_some()
    }

    pub fn mark_lost(&self, reason: impl Into<String>) {
        let mut lost = self.lost.lock();
        if lost.is_none() {
            *lost = Some(reason.into());
        }
    }

    /// Start executing submission `value`: fails if the device is or
    /// becomes lost, then waits out the simulated execution latency.
    pub fn begin_execution(&self, backend: &str, value: u64) -> Result<(), BackendError> {
        self.check_alive()?;
        if self.trigger.fires() {
            let reason = format!("{backend} device stopped responding at submission {value}");
            self.mark_lost(reason.clone());
            return Err(BackendError::DeviceLost(reason));
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(())
    }
}

fn byte_range(
    handle: BackendHandle,
    offset: u64,
    len: u64,
    size: usize,
) -> Result<std::ops::Range<usize>, BackendError> {
    let out_of_range = |end| BackendError::OutOfRange {
        handle,
        end,
        size: size as u64,
    };
    let end = offset.checked_add(len).ok_or_else(|| out_of_range(u64::MAX))?;
    if end > size as u64 {
        return Err(out_of_range(end));
    }
    Ok(offset as usize..end as usize)
}

fn mip_level(handle: BackendHandle, object: &mut HostObject, mip: u32) -> Result<&mut Vec<u8>, BackendError> {
    let HostObject::Texture(image) = object else {
        return Err(BackendError::InvalidHandle(handle));
    };
    let levels = image.mips.len() as u64;
    image
        .mips
        .get_mut(mip as usize)
        .ok_or(BackendError::OutOfRange {
            handle,
            end: u64::from(mip) + 1,
            size: levels,
        })
}

/// Bytes of one texel of `format` holding `color`.
pub(crate) fn encode_color(format: TextureFormat, color: Color) -> Option<Vec<u8>> {
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => Some(vec![
            unorm(color.r),
            unorm(color.g),
            unorm(color.b),
            unorm(color.a),
        ]),
        TextureFormat::Bgra8Unorm => Some(vec![
            unorm(color.b),
            unorm(color.g),
            unorm(color.r),
            unorm(color.a),
        ]),
        TextureFormat::R8Unorm => Some(vec![unorm(color.r)]),
        TextureFormat::Rg8Unorm => Some(vec![unorm(color.r), unorm(color.g)]),
        TextureFormat::R32Float => Some(color.r.to_le_bytes().to_vec()),
        TextureFormat::Rg32Float => Some(bytemuck::cast_slice(&[color.r, color.g]).to_vec()),
        TextureFormat::Rgba32Float => {
            Some(bytemuck::cast_slice(&[color.r, color.g, color.b, color.a]).to_vec())
        }
        _ => None,
    }
}

impl std::fmt::Debug for HostHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHeap")
            .field("objects", &self.len())
            .field("lost", &self.is_lost())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureUsage;

    fn heap() -> HostHeap {
        HostHeap::new(None, Duration::ZERO)
    }

    #[test]
    fn test_buffer_round_trip_and_bounds() {
        let heap = heap();
        let handle = heap.insert(HostObject::Buffer(vec![0; 8])).unwrap();
        heap.write_buffer(handle, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(heap.read_buffer(handle, 2, 4).unwrap(), vec![0, 0, 1, 2]);
        assert_eq!(
            heap.write_buffer(handle, 6, &[9, 9, 9]),
            Err(BackendError::OutOfRange {
                handle,
                end: 9,
                size: 8
            })
        );
    }

    #[test]
    fn test_removed_handle_is_invalid() {
        let heap = heap();
        let handle = heap.insert(HostObject::Shader(ShaderStage::Vertex)).unwrap();
        assert!(heap.remove(handle).is_ok());
        assert_eq!(heap.remove(handle).err(), Some(BackendError::InvalidHandle(handle)));
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_fill_color_packs_rgba8() {
        let heap = heap();
        let descriptor = TextureDescriptor::new_2d(2, 1, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET);
        let handle = heap.insert_texture(&descriptor).unwrap();
        assert_eq!(heap.fill_color(handle, Color::new(1.0, 0.0, 0.0, 1.0)), Ok(true));
        assert_eq!(heap.read_texture(handle, 0).unwrap(), vec![255, 0, 0, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn test_depth_formats_are_not_color_filled() {
        let heap = heap();
        let descriptor = TextureDescriptor::new_2d(1, 1, TextureFormat::Depth32Float, TextureUsage::RENDER_TARGET);
        let handle = heap.insert_texture(&descriptor).unwrap();
        assert_eq!(heap.fill_color(handle, Color::WHITE), Ok(false));
    }

    #[test]
    fn test_loss_trigger_fails_after_limit() {
        let heap = HostHeap::new(Some(1), Duration::ZERO);
        assert!(heap.begin_execution("test", 1).is_ok());
        assert!(matches!(
            heap.begin_execution("test", 2),
            Err(BackendError::DeviceLost(_))
        ));
        assert!(heap.is_lost());
        assert!(matches!(
            heap.insert(HostObject::Buffer(Vec::new())),
            Err(BackendError::DeviceLost(_))
        ));
    }
}
