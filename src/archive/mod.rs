//! Archive Module
//!
//! Flat, dependency-ordered binary encoding of a scene graph.
//!
//! ## Stream Layout
//! ```text
//! ┌───────┬──────────────┬──────────────────────────────────────────────┐
//! │ Magic │ StreamHeader │ STRING* OBJECT ATTACHMENT ... END_OF_ARCHIVE │
//! └───────┴──────────────┴──────────────────────────────────────────────┘
//!   raw      raw           none / gzip / lzma, chosen in the header
//! ```
//!
//! ## Ordering
//! - Every object an atom refers to has an OBJECT atom earlier in the
//!   stream.
//! - Every string an atom refers to has a STRING atom earlier in the
//!   stream. String indices are implicit (see [`strings`]).
//! - END_OF_ARCHIVE names the root transform and ends the stream.
//!
//! ## Pipeline
//! ```text
//! publish: Pack ─▶ ObjectGraphWriter ─▶ AtomWriter ─▶ Compressor ─▶ W
//! load:    R ─▶ Decompressor ─▶ AtomReader ─▶ ObjectGraphReader ─▶ Pack
//! ```

mod compression;
mod framer;
mod inspect;
mod reader;
pub mod records;
pub mod strings;
mod writer;

pub use compression::{Compression, Compressor, Decompressor};
pub use framer::{
    read_header, write_header, Atom, AtomKind, AtomReader, AtomWriter, ATOM_HEADER_SIZE, MAGIC,
};
pub use inspect::{inspect, recompress, ArchiveSummary};
pub use reader::ObjectGraphReader;
pub use strings::{StringDecoder, StringEncoder, StringIndex};
pub use writer::{ObjectGraphWriter, PublishStats, Visit};
