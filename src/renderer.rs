// =============================================================================
// RENDERER - Owns every Vulkan object and runs the per-frame protocol
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the fence of this frame slot
// 2. Acquire a swapchain image
// 3. Re-record the slot's command buffer
// 4. Submit (wait: image available, signal: render finished, fence)
// 5. Present (wait: render finished)
//
// Objects are created in dependency order in `new` and destroyed in reverse
// in `Drop`.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::commands::{self, QuadDraw};
use crate::backend::pipeline::{self, TextureBinding};
use crate::backend::sync::{self, FrameRing, FrameSync};
use crate::backend::texture::{self, Texture};
use crate::backend::{shader, GraphicsDevice, Swapchain, SwapchainRequest};
use crate::config::Config;
use crate::mesh::Mesh;

pub struct Renderer {
    window: Arc<Window>,
    clear_color: [f32; 4],
    back_buffer_count: u32,
    present_mode: vk::PresentModeKHR,

    // Presentation targets, rebuilt on resize
    swapchain: Option<Swapchain>,
    framebuffers: Vec<vk::Framebuffer>,
    /// One per swapchain image
    render_finished: Vec<vk::Semaphore>,

    render_pass: vk::RenderPass,
    command_pool: vk::CommandPool,
    /// One per frame slot
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    frames: FrameRing,

    texture_binding: TextureBinding,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    mesh: Mesh,
    texture: Texture,

    needs_recreate: bool,
    is_minimized: bool,

    device: Arc<GraphicsDevice>,
}

impl Renderer {
    /// Build the full Vulkan context for `window`.
    ///
    /// Objects are stored on the renderer as they are created, so an error
    /// part way through drops a partially built renderer and `Drop` releases
    /// exactly what exists. Unset handles stay null.
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = GraphicsDevice::new(&config.window.title, &*window, enable_validation)?;
        let back_buffer_count = config.graphics.back_buffer_count;

        let mut renderer = Self {
            window,
            clear_color: config.graphics.clear_color,
            back_buffer_count,
            present_mode: config.present_mode(),
            swapchain: None,
            framebuffers: Vec::new(),
            render_finished: Vec::new(),
            render_pass: vk::RenderPass::null(),
            command_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            frames: FrameRing::new(back_buffer_count.max(1) as usize),
            texture_binding: TextureBinding::default(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            mesh: Mesh::default(),
            texture: Texture::default(),
            needs_recreate: false,
            is_minimized: false,
            device,
        };
        renderer.build(config)?;

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    fn build(&mut self, config: &Config) -> Result<()> {
        let device = self.device.clone();

        let size = self.window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            SwapchainRequest {
                back_buffer_count: self.back_buffer_count,
                width: size.width,
                height: size.height,
                present_mode: self.present_mode,
            },
            None,
        )?;
        let format = swapchain.format;
        let image_count = swapchain.images.len();
        let extent = swapchain.extent;
        let swapchain = self.swapchain.insert(swapchain);

        self.render_pass = pipeline::create_render_pass(&device, format)?;
        self.framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            self.render_pass,
            extent,
        )?;

        // One buffer per frame slot plus a trailing setup buffer
        self.command_pool = commands::create_command_pool(&device)?;
        let mut command_buffers = commands::allocate_command_buffers(
            &device,
            self.command_pool,
            self.back_buffer_count + 1,
        )?;
        let setup_cmd = command_buffers.pop().context("No setup command buffer")?;
        self.command_buffers = command_buffers;

        for _ in 0..self.back_buffer_count {
            self.frame_sync.push(FrameSync::new(&device)?);
        }
        self.frames = FrameRing::new(self.frame_sync.len());
        self.create_present_semaphores(image_count)?;
        log::info!("Frame synchronization created for {} slots", self.frame_sync.len());

        let shader_dir = Path::new(&config.graphics.shader_dir);
        let vert_shader = shader::load_shader(&device, shader_dir.join("quad.vert.spv"))?;
        let frag_shader = match shader::load_shader(&device, shader_dir.join("quad.frag.spv")) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert_shader, None) };
                return Err(e);
            }
        };

        let pipeline_result = TextureBinding::new(&device).and_then(|binding| {
            let layout = binding.layout;
            self.texture_binding = binding;
            pipeline::create_quad_pipeline(
                &device,
                self.render_pass,
                layout,
                vert_shader,
                frag_shader,
            )
        });

        // Modules are only needed while the pipeline is compiled
        unsafe {
            device.device.destroy_shader_module(vert_shader, None);
            device.device.destroy_shader_module(frag_shader, None);
        }
        (self.pipeline, self.pipeline_layout) = pipeline_result?;

        self.mesh = Mesh::quad(&device)?;

        // ─────────────────────────────────────────────────────────────────────
        // Setup submission: texture upload, guarded by frame slot 0's fence
        // ─────────────────────────────────────────────────────────────────────
        let setup_fence = self.frame_sync[0].in_flight;
        unsafe { device.device.reset_fences(&[setup_fence]) }
            .context("Failed to reset setup fence")?;

        let tex = &config.texture;
        let pixels = texture::checkerboard(tex.size, tex.cell_size, tex.primary, tex.secondary);

        commands::begin(&device, setup_cmd)?;
        let (texture, mut staging) = Texture::upload(&device, setup_cmd, tex.size, &pixels)?;
        self.texture = texture;

        let submitted = commands::end(&device, setup_cmd)
            .and_then(|()| commands::submit_and_wait(&device, setup_cmd, setup_fence));
        if submitted.is_err() {
            // The copy may still be reading the staging buffer
            let _ = device.wait_idle();
        }
        staging.destroy(&device);
        submitted?;

        unsafe { device.device.free_command_buffers(self.command_pool, &[setup_cmd]) };
        log::info!("Setup commands complete");

        self.texture_binding
            .write_texture(&device, self.texture.view, self.texture.sampler);
        Ok(())
    }

    /// Record a new window size. Zero in either dimension pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.is_minimized = true;
        } else {
            self.is_minimized = false;
            self.needs_recreate = true;
        }
    }

    /// Render a single frame. Returns false when nothing was presented.
    pub fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }

        if self.needs_recreate {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        let slot = self.frames.current();
        let frame = &self.frame_sync[slot];
        let device = &self.device;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait until this slot's previous submission has retired
        // ─────────────────────────────────────────────────────────────────────
        unsafe { device.device.wait_for_fences(&[frame.in_flight], true, u64::MAX) }
            .context("Failed waiting for frame fence")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire
        // ─────────────────────────────────────────────────────────────────────
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let Some((image_index, suboptimal)) =
            swapchain.acquire_next_image(u64::MAX, frame.image_available)?
        else {
            // Fence stays signaled, so the retry does not block
            self.needs_recreate = true;
            return Ok(false);
        };
        if suboptimal {
            self.needs_recreate = true;
        }

        // Only reset once work is guaranteed to be submitted against it
        unsafe { device.device.reset_fences(&[frame.in_flight]) }
            .context("Failed to reset frame fence")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Record
        // ─────────────────────────────────────────────────────────────────────
        let cmd = self.command_buffers[slot];
        commands::record_quad(
            device,
            cmd,
            &QuadDraw {
                render_pass: self.render_pass,
                framebuffer: self.framebuffers[image_index as usize],
                extent: swapchain.extent,
                clear_color: self.clear_color,
                pipeline: self.pipeline,
                pipeline_layout: self.pipeline_layout,
                descriptor_set: self.texture_binding.set,
                mesh: &self.mesh,
            },
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit
        // ─────────────────────────────────────────────────────────────────────
        let render_finished = self.render_finished[image_index as usize];
        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], frame.in_flight)
        }
        .context("Failed to submit frame")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present
        // ─────────────────────────────────────────────────────────────────────
        if swapchain.present(device.graphics_queue, image_index, &[render_finished])? {
            self.needs_recreate = true;
        }

        self.frames.advance();
        Ok(true)
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }

        self.device.wait_idle()?;
        self.destroy_presentation_targets();

        let old = self.swapchain.take();
        let swapchain = Swapchain::new(
            self.device.clone(),
            SwapchainRequest {
                back_buffer_count: self.back_buffer_count,
                width: size.width,
                height: size.height,
                present_mode: self.present_mode,
            },
            old.as_ref(),
        )?;

        if let Some(old) = old {
            // The render pass (and so the pipeline) was built for the old format
            if old.format != swapchain.format {
                anyhow::bail!(
                    "Surface format changed from {:?} to {:?}",
                    old.format,
                    swapchain.format
                );
            }
        }

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;
        let image_count = swapchain.images.len();
        self.swapchain = Some(swapchain);
        self.create_present_semaphores(image_count)?;
        self.needs_recreate = false;

        Ok(())
    }

    /// One render-finished semaphore per swapchain image
    fn create_present_semaphores(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            let semaphore = sync::create_semaphore(&self.device)?;
            self.render_finished.push(semaphore);
        }
        Ok(())
    }

    fn destroy_presentation_targets(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            for semaphore in self.render_finished.drain(..) {
                self.device.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let _ = self.device.wait_idle();
        let device = self.device.clone();

        for frame in &self.frame_sync {
            frame.destroy(&device.device);
        }
        self.destroy_presentation_targets();

        unsafe {
            // Also frees the command buffers
            device.device.destroy_command_pool(self.command_pool, None);
            device.device.destroy_pipeline(self.pipeline, None);
            device.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
        self.texture_binding.destroy(&device.device);
        unsafe {
            device.device.destroy_render_pass(self.render_pass, None);
        }

        self.mesh.destroy(&device);
        self.texture.destroy(&device);

        // Swapchain before the surface, which the device tears down
        self.swapchain = None;

        log::info!("Vulkan shutdown complete");
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use winit::event_loop::EventLoop;
    use winit::platform::x11::EventLoopBuilderExtX11;

    // Needs an X display and a Vulkan driver: cargo test -- --ignored
    #[test]
    #[ignore]
    fn missing_shaders_unwind_partial_setup() {
        let event_loop = EventLoop::builder().with_any_thread(true).build().unwrap();
        #[allow(deprecated)]
        let window = event_loop
            .create_window(Window::default_attributes().with_visible(false))
            .unwrap();

        let shader_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.graphics.shader_dir = shader_dir.path().to_string_lossy().into_owned();

        let err = Renderer::new(Arc::new(window), &config)
            .err()
            .expect("renderer built without shaders");
        assert!(format!("{:#}", err).contains("quad.vert.spv"));
    }
}
