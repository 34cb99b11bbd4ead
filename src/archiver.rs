//! Archiver Module
//!
//! Save/open facade over the archive pipeline.
//!
//! ## Responsibilities
//! - Write the raw header, then stack compressor → framer → graph writer
//! - Mirror that stack on load
//! - Own the resource collaborators used to rebuild textures

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::archive::records::StreamHeader;
use crate::archive::{
    read_header, write_header, AtomReader, AtomWriter, Compressor, Decompressor,
    ObjectGraphReader, ObjectGraphWriter, PublishStats,
};
use crate::config::Config;
use crate::error::Result;
use crate::resource::{
    BitmapDecoder, DirectoryResourceProvider, ImageBitmapDecoder, ResourceProvider,
};
use crate::scene::{ObjectId, Pack};

/// Saves and opens archives
///
/// A failed load leaves no half-built graph behind in the caller's pack.
#[derive(Clone)]
pub struct Archiver {
    /// Archiver configuration
    config: Config,

    /// Where texture URIs are fetched from
    resources: Arc<dyn ResourceProvider>,

    /// Turns fetched bytes into bitmaps
    decoder: Arc<dyn BitmapDecoder>,
}

impl Archiver {
    /// Resolves textures relative to the working directory
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resources: Arc::new(DirectoryResourceProvider::new(".")),
            decoder: Arc::new(ImageBitmapDecoder),
        }
    }

    pub fn with_resources(
        config: Config,
        resources: Arc<dyn ResourceProvider>,
        decoder: Arc<dyn BitmapDecoder>,
    ) -> Self {
        Self {
            config,
            resources,
            decoder,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Publish everything reachable from `root` into `writer`
    pub fn save<W: Write>(
        &self,
        pack: &Pack,
        root: ObjectId,
        mut writer: W,
    ) -> Result<PublishStats> {
        let mode = self.config.compression;
        write_header(&mut writer, &StreamHeader { compression: mode })?;

        let atoms = AtomWriter::new(Compressor::new(writer, mode, &self.config));
        let mut graph = ObjectGraphWriter::new(pack, atoms);
        let stats = graph.publish(root)?;

        let mut writer = graph.into_inner().finish()?;
        writer.flush()?;
        tracing::info!(
            "Saved root #{} ({}): {} objects, {} bytes before compression",
            root,
            mode,
            stats.objects,
            stats.bytes
        );
        Ok(stats)
    }

    pub fn save_to_path(
        &self,
        pack: &Pack,
        root: ObjectId,
        path: impl AsRef<Path>,
    ) -> Result<PublishStats> {
        let file = File::create(path.as_ref())?;
        self.save(pack, root, BufWriter::new(file))
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Rebuild an archive into `pack` and return the new root
    pub fn load<R: Read>(&self, pack: &mut Pack, mut reader: R) -> Result<ObjectId> {
        let header = read_header(&mut reader)?;
        let atoms = AtomReader::new(
            Decompressor::new(reader, header.compression),
            self.config.max_atom_size,
        );

        let graph = ObjectGraphReader::new(
            pack,
            atoms,
            self.resources.as_ref(),
            self.decoder.as_ref(),
            &self.config,
        );
        let root = graph.load()?;
        tracing::info!("Loaded root #{} ({})", root, header.compression);
        Ok(root)
    }

    pub fn load_from_path(&self, pack: &mut Pack, path: impl AsRef<Path>) -> Result<ObjectId> {
        let file = File::open(path.as_ref())?;
        self.load(pack, BufReader::new(file))
    }
}
