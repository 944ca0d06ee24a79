// Sampled textures
//
// Uploads RGBA8 pixels through a staging buffer. The copy is recorded into a
// caller-supplied command buffer, so the staging buffer has to outlive that
// submission; `upload` hands it back for the caller to free.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::{GpuBuffer, GraphicsDevice};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Byte length of a square RGBA8 image
pub fn texture_byte_len(size: u32) -> usize {
    size as usize * size as usize * 4
}

/// Square RGBA8 checkerboard, row-major. A cell size of 0 is treated as 1.
pub fn checkerboard(size: u32, cell: u32, primary: [u8; 4], secondary: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity(texture_byte_len(size));
    for y in 0..size {
        for x in 0..size {
            let color = if (x / cell + y / cell) % 2 == 0 {
                primary
            } else {
                secondary
            };
            pixels.extend_from_slice(&color);
        }
    }
    pixels
}

/// Sampled image, view and sampler. Null handles in the default value.
#[derive(Default)]
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    allocation: Option<Allocation>,
}

impl Texture {
    /// Create a square texture and record its upload into `cmd`.
    ///
    /// `cmd` must be in the recording state. The returned staging buffer may
    /// only be destroyed once that command buffer has finished executing.
    pub fn upload(
        device: &GraphicsDevice,
        cmd: vk::CommandBuffer,
        size: u32,
        pixels: &[u8],
    ) -> Result<(Self, GpuBuffer)> {
        let expected = texture_byte_len(size);
        if pixels.len() != expected {
            anyhow::bail!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA8",
                pixels.len(),
                expected,
                size,
                size
            );
        }

        let mut staging = GpuBuffer::new(
            device,
            "texture staging",
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;

        let mut texture = Self::default();
        let created = staging
            .write(pixels)
            .and_then(|()| texture.create(device, cmd, size, staging.buffer));

        if let Err(e) = created {
            texture.destroy(device);
            staging.destroy(device);
            return Err(e);
        }

        log::info!("Texture created ({}x{})", size, size);
        Ok((texture, staging))
    }

    fn create(
        &mut self,
        device: &GraphicsDevice,
        cmd: vk::CommandBuffer,
        size: u32,
        staging: vk::Buffer,
    ) -> Result<()> {
        let extent = vk::Extent2D {
            width: size,
            height: size,
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width: size,
                height: size,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        self.image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create texture image")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(self.image) };
        let allocation = device
            .allocator()
            .allocate(&AllocationCreateDesc {
                name: "texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .context("Failed to allocate texture memory")?;
        let allocation = self.allocation.insert(allocation);

        unsafe {
            device
                .device
                .bind_image_memory(self.image, allocation.memory(), allocation.offset())
        }
        .context("Failed to bind texture memory")?;

        Self::record_copy(device, cmd, staging, self.image, extent);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(COLOR_RANGE);

        self.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create texture view")?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(0.0);

        self.sampler = unsafe { device.device.create_sampler(&sampler_info, None) }
            .context("Failed to create texture sampler")?;

        Ok(())
    }

    fn record_copy(
        device: &GraphicsDevice,
        cmd: vk::CommandBuffer,
        staging: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) {
        let to_transfer = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_RANGE);

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        let to_shader_read = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(COLOR_RANGE);

        unsafe {
            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            device.device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader_read],
            );
        }
    }

    pub fn destroy(&mut self, device: &GraphicsDevice) {
        unsafe {
            device.device.destroy_sampler(self.sampler, None);
            device.device.destroy_image_view(self.view, None);
            device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator().free(allocation) {
                log::error!("Failed to free texture memory: {}", e);
            }
        }
        self.sampler = vk::Sampler::null();
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn pixel(pixels: &[u8], size: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * size + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn checkerboard_is_rgba_sized() {
        assert_eq!(checkerboard(16, 4, WHITE, BLUE).len(), 16 * 16 * 4);
        assert!(checkerboard(0, 4, WHITE, BLUE).is_empty());
    }

    #[test]
    fn cells_alternate() {
        let pixels = checkerboard(8, 2, WHITE, BLUE);
        assert_eq!(pixel(&pixels, 8, 0, 0), WHITE);
        assert_eq!(pixel(&pixels, 8, 1, 1), WHITE);
        assert_eq!(pixel(&pixels, 8, 2, 0), BLUE);
        assert_eq!(pixel(&pixels, 8, 0, 2), BLUE);
        assert_eq!(pixel(&pixels, 8, 2, 2), WHITE);
        assert_eq!(pixel(&pixels, 8, 7, 6), WHITE);
    }

    #[test]
    fn byte_len_does_not_wrap_in_u32() {
        assert_eq!(texture_byte_len(256), 262_144);
        // 40000^2 * 4 is past u32::MAX
        #[cfg(target_pointer_width = "64")]
        assert_eq!(texture_byte_len(40_000) as u64, 6_400_000_000);
    }

    #[test]
    fn default_texture_owns_nothing() {
        let texture = Texture::default();
        assert_eq!(texture.image, vk::Image::null());
        assert_eq!(texture.view, vk::ImageView::null());
        assert_eq!(texture.sampler, vk::Sampler::null());
        assert!(texture.allocation.is_none());
    }

    #[test]
    fn zero_cell_size_is_per_pixel() {
        let pixels = checkerboard(2, 0, WHITE, BLUE);
        assert_eq!(pixel(&pixels, 2, 0, 0), WHITE);
        assert_eq!(pixel(&pixels, 2, 1, 0), BLUE);
        assert_eq!(pixel(&pixels, 2, 0, 1), BLUE);
        assert_eq!(pixel(&pixels, 2, 1, 1), WHITE);
    }
}
