//! SPIR-V shader modules.

use crate::error::{GpuError, Result};
use ash::vk;
use std::sync::Arc;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Convert a SPIR-V byte blob into words, validating length and magic number.
pub fn bytes_to_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(GpuError::ShaderModule(format!(
            "SPIR-V length {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(GpuError::ShaderModule(format!(
            "Invalid SPIR-V magic number {:#010x}",
            words[0]
        )));
    }

    Ok(words)
}

/// Owned shader module. Only needed until the pipeline using it is created.
pub struct ShaderModule {
    module: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl ShaderModule {
    /// Create a shader module from a SPIR-V byte blob.
    pub fn from_bytes(device: Arc<ash::Device>, bytes: &[u8]) -> Result<Self> {
        let code = bytes_to_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|e| GpuError::ShaderModule(e.to_string()))?;

        Ok(Self { module, device })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_header() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = bytes_to_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_unaligned_length() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.push(0);
        assert!(matches!(
            bytes_to_spirv(&bytes),
            Err(GpuError::ShaderModule(_))
        ));
        assert!(bytes_to_spirv(&[]).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = 0xDEAD_BEEFu32.to_le_bytes();
        assert!(matches!(
            bytes_to_spirv(&bytes),
            Err(GpuError::ShaderModule(_))
        ));
    }
}
