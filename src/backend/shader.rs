// Shader module loading
//
// Vulkan consumes SPIR-V words. The binaries are produced by build.rs (glslc)
// and read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::GraphicsDevice;

/// Decode SPIR-V bytes into native-endian words.
///
/// Byte order follows the magic number; the length must be a multiple of 4.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V")
}

pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| {
        format!(
            "Failed to read shader {:?} (compile shaders/ with glslc first)",
            path
        )
    })?;
    parse_spirv(&bytes).with_context(|| format!("Failed to decode shader {:?}", path))
}

pub fn create_shader_module(device: &GraphicsDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    let module = unsafe { device.device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")?;

    log::info!("Shader created ({} words)", code.len());
    Ok(module)
}

/// Read a .spv file and turn it into a shader module
pub fn load_shader<P: AsRef<Path>>(device: &GraphicsDevice, path: P) -> Result<vk::ShaderModule> {
    let code = load_spirv(&path)?;
    create_shader_module(device, &code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_endian_words() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 7, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7, 0]);
    }

    #[test]
    fn decodes_big_endian_words() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 7, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        assert_eq!(parse_spirv(&bytes).unwrap(), words);
    }

    #[test]
    fn rejects_missing_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 0x0001_0000]);
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_input() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 1]);
        bytes.pop();
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn missing_file_mentions_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.vert.spv");
        let err = load_spirv(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("quad.vert.spv"));
    }
}
