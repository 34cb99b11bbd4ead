//! # o3db
//!
//! Binary archive format for scene graphs with:
//! - A flat stream of self-describing atoms
//! - Dependency-first ordering, so a reader resolves every id on sight
//! - Per-archive string interning
//! - Whole-stream gzip or LZMA compression
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Archiver                             │
//! │                (save / load facade, Config)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │ GraphWriter │          │ GraphReader  │◀── ResourceProvider
//!   │  (publish)  │          │   (load)     │    BitmapDecoder
//!   └──────┬──────┘          └──────▲───────┘
//!          │   StringTable          │
//!          ▼                        │
//!   ┌─────────────┐          ┌──────┴───────┐
//!   │ AtomWriter  │          │  AtomReader  │
//!   │ Compressor  │─ bytes ─▶│ Decompressor │
//!   └─────────────┘          └──────────────┘
//!          ▲                        │
//!          └──────── Pack ◀─────────┘
//!              (scene object arena)
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod math;
pub mod scene;
pub mod resource;
pub mod archive;
pub mod archiver;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ArchiveError, Result};
pub use config::{Config, IndexWidth};
pub use archive::Compression;
pub use archiver::Archiver;
pub use scene::{ObjectId, Pack};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of o3db
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
