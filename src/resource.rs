//! External resources
//!
//! Textures are archived by URI only. On load the bytes are fetched through
//! a `ResourceProvider` and turned into bitmaps by a `BitmapDecoder`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{ArchiveError, Result};

/// Decoded RGBA8 image frame
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl Bitmap {
    /// Single-colour bitmap
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels: Bytes::from(pixels),
        }
    }
}

/// Source of resource bytes by URI
pub trait ResourceProvider: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Bytes>;
}

/// Image decoding; `hint` is the URI the bytes came from
pub trait BitmapDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], hint: &str) -> Result<Vec<Bitmap>>;
}

// =============================================================================
// Providers
// =============================================================================

/// Resolves URIs as relative paths below a root directory
#[derive(Debug, Clone)]
pub struct DirectoryResourceProvider {
    root: PathBuf,
}

impl DirectoryResourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let relative = Path::new(uri);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ArchiveError::Resource(format!(
                "URI '{}' leaves the resource root",
                uri
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceProvider for DirectoryResourceProvider {
    fn fetch(&self, uri: &str) -> Result<Bytes> {
        let path = self.resolve(uri)?;
        let data = std::fs::read(&path).map_err(|e| {
            ArchiveError::Resource(format!("failed to read '{}': {}", path.display(), e))
        })?;
        tracing::debug!("Fetched {} ({} bytes)", uri, data.len());
        Ok(Bytes::from(data))
    }
}

/// In-memory URI table, shareable between concurrent loads
#[derive(Debug, Default)]
pub struct MemoryResourceProvider {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, data: impl Into<Bytes>) {
        self.entries.write().insert(uri.into(), data.into());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ResourceProvider for MemoryResourceProvider {
    fn fetch(&self, uri: &str) -> Result<Bytes> {
        self.entries
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| ArchiveError::Resource(format!("no resource for '{}'", uri)))
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Decodes any format the `image` crate recognises into one RGBA8 frame
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBitmapDecoder;

impl BitmapDecoder for ImageBitmapDecoder {
    fn decode(&self, bytes: &[u8], hint: &str) -> Result<Vec<Bitmap>> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| ArchiveError::Resource(format!("failed to decode '{}': {}", hint, e)))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(vec![Bitmap {
            width,
            height,
            pixels: Bytes::from(rgba.into_raw()),
        }])
    }
}
