// =============================================================================
// QUAD RENDERER - Minimal Vulkan harness drawing one textured quad
// =============================================================================
//
// App owns the window and the Renderer; the Renderer owns every Vulkan object.

mod backend;
mod config;
mod mesh;
mod renderer;
mod stats;

use anyhow::{Context, Result};
use config::Config;
use renderer::Renderer;
use stats::FrameStats;
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, outcome) = Config::load();

    init_logging(&config)?;
    outcome.report();
    log::debug!("Config: {:?}", config);
    config.validate().context("Invalid configuration")?;

    log::info!("Starting quad renderer");
    log::info!(
        "Window: {}x{}, {} back buffers, present mode {}",
        config.window.width,
        config.window.height,
        config.graphics.back_buffer_count,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.fatal_error.take() {
        return Err(e);
    }
    Ok(())
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Env, Target};

    let mut builder =
        Builder::from_env(Env::default().default_filter_or(config.debug.log_level.as_str()));

    if config.debug.log_to_file {
        let file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer (and its surface) must go
/// before the window.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    stats: FrameStats,
    /// Set when initialization or rendering fails so main can report it
    fatal_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            stats: FrameStats::new(Instant::now()),
            fatal_error: None,
        }
    }

    fn update_title(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        if let Some(sample) = self.stats.tick(Instant::now()) {
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title, sample.fps, sample.frame_time_ms
                ));
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.fatal_error = Some(anyhow::anyhow!("Failed to create window: {}", e));
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(window.clone(), &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                self.fatal_error = Some(e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(ref mut renderer) = self.renderer else {
                    return;
                };
                match renderer.render_frame() {
                    Ok(true) => self.update_title(),
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("Render error: {:?}", e);
                        self.fatal_error = Some(e);
                        event_loop.exit();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear Vulkan down while the window still exists
        self.renderer = None;
    }
}
