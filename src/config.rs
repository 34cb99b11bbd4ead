//! Configuration for o3db
//!
//! Centralized configuration with sensible defaults.

use crate::archive::Compression;

/// Main configuration for archive save/load
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Writer Configuration
    // -------------------------------------------------------------------------
    /// Transform applied to the atom stream after the header
    pub compression: Compression,

    /// Gzip level (0-9). Archives are written at maximum compression.
    pub gzip_level: u32,

    /// xz preset (0-9)
    pub lzma_preset: u32,

    // -------------------------------------------------------------------------
    // Reader Configuration
    // -------------------------------------------------------------------------
    /// Largest atom payload accepted before the stream is declared corrupt
    pub max_atom_size: u32,

    /// Largest buffer accepted on load, in values summed over all fields
    pub max_buffer_values: u64,

    /// Largest param array index accepted on load
    pub max_array_len: u32,

    /// Index width preferred by the target renderer.
    /// Index buffers are rewritten to this width on load.
    pub index_width: IndexWidth,
}

/// Element width for index buffer fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    /// 16-bit indices (GLES2-class targets)
    U16,

    /// 32-bit indices
    U32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression: Compression::Lzma,
            gzip_level: 9,
            lzma_preset: 6,
            max_atom_size: 256 * 1024 * 1024, // 256 MB
            max_buffer_values: 64 * 1024 * 1024,
            max_array_len: 65536,
            index_width: IndexWidth::U32,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the atom stream compression
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the gzip level (clamped to 9)
    pub fn gzip_level(mut self, level: u32) -> Self {
        self.config.gzip_level = level.min(9);
        self
    }

    /// Set the xz preset (clamped to 9)
    pub fn lzma_preset(mut self, preset: u32) -> Self {
        self.config.lzma_preset = preset.min(9);
        self
    }

    /// Set the maximum accepted atom payload size (in bytes)
    pub fn max_atom_size(mut self, size: u32) -> Self {
        self.config.max_atom_size = size;
        self
    }

    /// Set the maximum number of values a loaded buffer may hold
    pub fn max_buffer_values(mut self, values: u64) -> Self {
        self.config.max_buffer_values = values;
        self
    }

    /// Set the maximum param array length accepted on load
    pub fn max_array_len(mut self, len: u32) -> Self {
        self.config.max_array_len = len;
        self
    }

    /// Set the preferred index buffer width
    pub fn index_width(mut self, width: IndexWidth) -> Self {
        self.config.index_width = width;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
