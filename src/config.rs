// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to defaults, so an empty or missing config.toml
// yields the stock 1280x720 double-buffered quad.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH: &str = "config.toml";

/// Vulkan guarantees maxImageDimension2D of at least this on every device
pub const MAX_TEXTURE_SIZE: u32 = 4096;

/// Where the configuration came from
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(PathBuf),
    NotFound(PathBuf),
    /// The file exists but could not be used; defaults were substituted
    Failed(anyhow::Error),
}

impl LoadOutcome {
    pub fn report(&self) {
        match self {
            LoadOutcome::Loaded(path) => log::info!("Loaded configuration from {:?}", path),
            LoadOutcome::NotFound(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            LoadOutcome::Failed(e) => log::warn!("{:#}. Using defaults.", e),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub texture: TextureConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Renderer".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Requested swapchain image count, also the number of frames in flight
    pub back_buffer_count: u32,
    pub clear_color: [f32; 4],
    pub present_mode: String,
    /// Directory holding quad.vert.spv / quad.frag.spv
    pub shader_dir: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            back_buffer_count: 2,
            clear_color: [0.042, 0.042, 0.042, 1.0],
            present_mode: "fifo".to_string(),
            shader_dir: "shaders".to_string(),
        }
    }
}

/// Procedural checkerboard applied to the quad
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub size: u32,
    pub cell_size: u32,
    pub primary: [u8; 4],
    pub secondary: [u8; 4],
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            size: 256,
            cell_size: 32,
            primary: [230, 230, 230, 255],
            secondary: [40, 90, 160, 255],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "quad_renderer.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults.
    ///
    /// Runs before the logger exists, so the outcome is handed back for the
    /// caller to report once logging is up.
    pub fn load() -> (Self, LoadOutcome) {
        Self::load_or_default(CONFIG_PATH)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, LoadOutcome) {
        let path = path.as_ref();
        if !path.exists() {
            return (Config::default(), LoadOutcome::NotFound(path.to_path_buf()));
        }
        match Self::load_from_path(path) {
            Ok(config) => (config, LoadOutcome::Loaded(path.to_path_buf())),
            Err(e) => (Config::default(), LoadOutcome::Failed(e)),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Reject settings the driver would choke on later with a less useful error
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            anyhow::bail!(
                "Window size must be non-zero, got {}x{}",
                self.window.width,
                self.window.height
            );
        }
        if self.graphics.back_buffer_count == 0 {
            anyhow::bail!("back_buffer_count must be at least 1");
        }
        if self.texture.size == 0 || self.texture.size > MAX_TEXTURE_SIZE {
            anyhow::bail!(
                "Texture size must be in 1..={}, got {}",
                MAX_TEXTURE_SIZE,
                self.texture.size
            );
        }
        if let Some(c) = self
            .graphics
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            anyhow::bail!("Clear color component {} is outside [0, 1]", c);
        }
        Ok(())
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::io::Write;

    #[test]
    fn defaults_match_stock_quad() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.title, "Vulkan Renderer");
        assert_eq!(config.graphics.back_buffer_count, 2);
        assert_eq!(config.graphics.clear_color, [0.042, 0.042, 0.042, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 800

            [texture]
            cell_size = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.texture.cell_size, 8);
        assert_eq!(config.texture.size, 256);
        assert_eq!(config.graphics.present_mode, "fifo");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window\nwidth = ").unwrap();

        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn loads_values_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graphics]\nback_buffer_count = 3\npresent_mode = \"Mailbox\"").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.graphics.back_buffer_count, 3);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_names() {
        let mut config = Config::default();
        for (name, mode) in [
            ("immediate", vk::PresentModeKHR::IMMEDIATE),
            ("FIFO", vk::PresentModeKHR::FIFO),
            ("fifo_relaxed", vk::PresentModeKHR::FIFO_RELAXED),
            ("vsync-please", vk::PresentModeKHR::FIFO),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.present_mode(), mode, "{}", name);
        }
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let mut config = Config::default();
        config.window.height = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.back_buffer_count = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.texture.size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.clear_color = [0.0, 1.5, 0.0, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn texture_size_is_capped() {
        let mut config = Config::default();
        config.texture.size = MAX_TEXTURE_SIZE;
        assert!(config.validate().is_ok());

        for size in [MAX_TEXTURE_SIZE + 1, 40_000, u32::MAX] {
            config.texture.size = size;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("Texture size"), "{}", size);
        }
    }

    #[test]
    fn load_or_default_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (config, outcome) = Config::load_or_default(&path);
        assert_eq!(config.window.width, 1280);
        assert!(matches!(outcome, LoadOutcome::NotFound(p) if p == path));
    }

    #[test]
    fn load_or_default_keeps_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graphics]\nback_buffer_count = \"two\"").unwrap();

        let (config, outcome) = Config::load_or_default(file.path());
        assert_eq!(config.graphics.back_buffer_count, 2);
        match outcome {
            LoadOutcome::Failed(e) => {
                assert!(format!("{:#}", e).contains("Failed to parse config file"))
            }
            other => panic!("expected a parse failure, got {:?}", other),
        }
    }

    #[test]
    fn load_or_default_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\ntitle = \"Checker\"").unwrap();

        let (config, outcome) = Config::load_or_default(file.path());
        assert_eq!(config.window.title, "Checker");
        assert!(matches!(outcome, LoadOutcome::Loaded(_)));
    }
}
