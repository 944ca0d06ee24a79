// Buffer utilities for vertex, index and staging buffers
//
// Memory comes from gpu-allocator, so buffers are sub-allocated from shared
// blocks instead of one vkAllocateMemory per buffer.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::GraphicsDevice;

/// A buffer and the allocation backing it.
///
/// The default value holds null handles, which `destroy` accepts, so a buffer
/// that failed halfway through `new` can be torn down like a finished one.
#[derive(Default)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl GpuBuffer {
    pub fn new(
        device: &GraphicsDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let mut gpu_buffer = Self::default();
        gpu_buffer.buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        if let Err(e) = gpu_buffer.bind_memory(device, name, location) {
            gpu_buffer.destroy(device);
            return Err(e);
        }

        log::debug!("Buffer '{}' created ({} bytes)", name, size);
        Ok(gpu_buffer)
    }

    fn bind_memory(
        &mut self,
        device: &GraphicsDevice,
        name: &str,
        location: MemoryLocation,
    ) -> Result<()> {
        let requirements = unsafe { device.device.get_buffer_memory_requirements(self.buffer) };

        let allocation = device
            .allocator()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for buffer '{}'", name))?;
        let allocation = self.allocation.insert(allocation);

        unsafe {
            device
                .device
                .bind_buffer_memory(self.buffer, allocation.memory(), allocation.offset())
        }
        .with_context(|| format!("Failed to bind memory for buffer '{}'", name))
    }

    /// Create a host-visible buffer and fill it with `data`
    pub fn with_data<T: bytemuck::Pod>(
        device: &GraphicsDevice,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(
            device,
            name,
            bytes.len() as vk::DeviceSize,
            usage,
            MemoryLocation::CpuToGpu,
        )?;
        if let Err(e) = buffer.write(bytes) {
            buffer.destroy(device);
            return Err(e);
        }
        Ok(buffer)
    }

    /// Copy bytes into the start of a mapped buffer
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;

        if bytes.len() > mapped.len() {
            anyhow::bail!(
                "Write of {} bytes overflows mapped buffer of {} bytes",
                bytes.len(),
                mapped.len()
            );
        }
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn destroy(&mut self, device: &GraphicsDevice) {
        unsafe {
            device.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
        self.buffer = vk::Buffer::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_owns_nothing() {
        let buffer = GpuBuffer::default();
        assert_eq!(buffer.buffer, vk::Buffer::null());
        assert!(buffer.allocation.is_none());
    }

    #[test]
    fn write_without_memory_is_an_error() {
        let mut buffer = GpuBuffer::default();
        let err = buffer.write(&[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("not host visible"));
    }
}
