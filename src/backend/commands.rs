// Command pool, command buffers and recording
//
// Frame buffers are re-recorded every frame; the pool allows per-buffer reset
// so vkBeginCommandBuffer resets them implicitly.

use anyhow::{Context, Result};
use ash::vk;

use super::GraphicsDevice;

pub fn create_command_pool(device: &GraphicsDevice) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(device.graphics_queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")?;

    log::info!("Command pool created");
    Ok(pool)
}

/// Allocate `count` primary command buffers
pub fn allocate_command_buffers(
    device: &GraphicsDevice,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    let buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")?;

    log::info!("{} command buffers allocated", buffers.len());
    Ok(buffers)
}

pub fn begin(device: &GraphicsDevice, cmd: vk::CommandBuffer) -> Result<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.device.begin_command_buffer(cmd, &begin_info) }
        .context("Failed to begin command buffer")
}

pub fn end(device: &GraphicsDevice, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.device.end_command_buffer(cmd) }.context("Failed to end command buffer")
}

/// Submit a recorded buffer guarded by `fence` and block until it retires.
/// `fence` must be unsignaled.
pub fn submit_and_wait(
    device: &GraphicsDevice,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    unsafe {
        device
            .device
            .queue_submit(device.graphics_queue, &[submit_info], fence)
            .context("Failed to submit setup commands")?;
        device
            .device
            .wait_for_fences(&[fence], true, u64::MAX)
            .context("Failed waiting for setup commands")?;
    }
    Ok(())
}

/// Everything one frame's draw needs
pub struct QuadDraw<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub mesh: &'a crate::mesh::Mesh,
}

/// Record a full frame: clear, draw the quad, end the pass
pub fn record_quad(device: &GraphicsDevice, cmd: vk::CommandBuffer, draw: &QuadDraw) -> Result<()> {
    let d = &device.device;

    begin(device, cmd)?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: draw.clear_color,
        },
    }];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: draw.extent,
    };
    let render_pass_begin = vk::RenderPassBeginInfo::default()
        .render_pass(draw.render_pass)
        .framebuffer(draw.framebuffer)
        .render_area(render_area)
        .clear_values(&clear_values);

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: draw.extent.width as f32,
        height: draw.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    unsafe {
        d.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

        d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
        d.cmd_set_viewport(cmd, 0, &[viewport]);
        d.cmd_set_scissor(cmd, 0, &[render_area]);
        d.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            draw.pipeline_layout,
            0,
            &[draw.descriptor_set],
            &[],
        );
        d.cmd_bind_vertex_buffers(cmd, 0, &[draw.mesh.vertex_buffer.buffer], &[0]);
        d.cmd_bind_index_buffer(cmd, draw.mesh.index_buffer.buffer, 0, vk::IndexType::UINT32);
        d.cmd_draw_indexed(cmd, draw.mesh.index_count, 1, 0, 0, 0);

        d.cmd_end_render_pass(cmd);
    }

    end(device, cmd)
}
