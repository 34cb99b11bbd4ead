//! Stream framer
//!
//! Byte envelope around the atom sequence.
//!
//! ## Layout
//! ```text
//! ┌──────────┬──────────┬───────────────┬─────────────────────────────┐
//! │ Magic(4) │ HLen (4) │ StreamHeader  │  Atoms (maybe compressed)   │
//! └──────────┴──────────┴───────────────┴─────────────────────────────┘
//!
//! Atom:
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │   Payload (bincode record)  │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Integers in the envelope are little-endian. Payloads are bincode with
//! variable-width integers.

use std::io::{Read, Write};

use bincode::Options;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ArchiveError, Result};

use super::compression::read_error;
use super::records::StreamHeader;

/// "O3DB" as a little-endian u32
pub const MAGIC: u32 = 0x4244_334F;

/// Atom header size: 1 byte kind + 4 bytes length
pub const ATOM_HEADER_SIZE: usize = 5;

/// Upper bound for the stream header record
const MAX_STREAM_HEADER_SIZE: u32 = 1024;

/// bincode configuration shared by every record
pub(crate) fn record_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_varint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Kind tag of an atom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AtomKind {
    Object = 0,
    String = 1,
    Attachment = 2,
    EndOfArchive = 3,
}

impl AtomKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AtomKind::Object),
            1 => Some(AtomKind::String),
            2 => Some(AtomKind::Attachment),
            3 => Some(AtomKind::EndOfArchive),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AtomKind::Object => "OBJECT",
            AtomKind::String => "STRING",
            AtomKind::Attachment => "ATTACHMENT",
            AtomKind::EndOfArchive => "END_OF_ARCHIVE",
        }
    }
}

/// One framed record
#[derive(Debug, Clone)]
pub struct Atom {
    pub kind: AtomKind,
    pub payload: Bytes,
}

impl Atom {
    /// Decode the payload as record `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        record_options().deserialize(&self.payload).map_err(|e| {
            ArchiveError::MalformedAtom(format!("{} payload: {}", self.kind.name(), e))
        })
    }
}

// =============================================================================
// Stream header
// =============================================================================

/// Write magic and stream header. Must go to the raw (uncompressed) stream.
pub fn write_header<W: Write>(writer: &mut W, header: &StreamHeader) -> Result<()> {
    let payload = record_options().serialize(header)?;
    writer.write_all(&MAGIC.to_le_bytes())?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Validate magic and read the stream header from the raw stream
pub fn read_header<R: Read>(reader: &mut R) -> Result<StreamHeader> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| read_error(e, "magic"))?;
    if u32::from_le_bytes(magic) != MAGIC {
        return Err(ArchiveError::MagicMismatch { found: magic });
    }

    let mut len = [0u8; 4];
    reader
        .read_exact(&mut len)
        .map_err(|e| read_error(e, "stream header length"))?;
    let len = u32::from_le_bytes(len);
    if len > MAX_STREAM_HEADER_SIZE {
        return Err(ArchiveError::MalformedAtom(format!(
            "stream header too large: {} bytes",
            len
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| read_error(e, "stream header"))?;
    record_options()
        .deserialize(&payload)
        .map_err(|e| ArchiveError::MalformedAtom(format!("stream header: {}", e)))
}

// =============================================================================
// Atom writer
// =============================================================================

/// Appends atoms to a (possibly compressing) stream
pub struct AtomWriter<W: Write> {
    inner: W,
    atoms_written: u64,
    bytes_written: u64,
}

impl<W: Write> AtomWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            atoms_written: 0,
            bytes_written: 0,
        }
    }

    /// Frame raw payload bytes
    pub fn write_atom(&mut self, kind: AtomKind, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            ArchiveError::MalformedAtom(format!("{} payload exceeds 4 GiB", kind.name()))
        })?;

        let mut header = [0u8; ATOM_HEADER_SIZE];
        header[0] = kind as u8;
        header[1..].copy_from_slice(&len.to_le_bytes());
        self.inner.write_all(&header)?;
        self.inner.write_all(payload)?;

        self.atoms_written += 1;
        self.bytes_written += (ATOM_HEADER_SIZE + payload.len()) as u64;
        Ok(())
    }

    /// Serialize and frame a record
    pub fn write_record<T: Serialize>(&mut self, kind: AtomKind, record: &T) -> Result<()> {
        let payload = record_options().serialize(record)?;
        self.write_atom(kind, &payload)
    }

    pub fn atoms_written(&self) -> u64 {
        self.atoms_written
    }

    /// Uncompressed bytes written
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

// =============================================================================
// Atom reader
// =============================================================================

/// Reads atoms one at a time. There is no resynchronisation: any error
/// leaves the reader unusable.
pub struct AtomReader<R: Read> {
    inner: R,
    max_atom_size: u32,
    atoms_read: u64,
}

impl<R: Read> AtomReader<R> {
    pub fn new(inner: R, max_atom_size: u32) -> Self {
        Self {
            inner,
            max_atom_size,
            atoms_read: 0,
        }
    }

    pub fn read_atom(&mut self) -> Result<Atom> {
        let mut header = [0u8; ATOM_HEADER_SIZE];
        self.inner
            .read_exact(&mut header)
            .map_err(|e| read_error(e, &format!("atom #{} header", self.atoms_read)))?;

        let kind = AtomKind::from_u8(header[0]).ok_or_else(|| {
            ArchiveError::MalformedAtom(format!("unknown atom kind: 0x{:02x}", header[0]))
        })?;
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
        if len > self.max_atom_size {
            return Err(ArchiveError::MalformedAtom(format!(
                "{} payload too large: {} bytes (max {})",
                kind.name(),
                len,
                self.max_atom_size
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload).map_err(|e| {
            read_error(
                e,
                &format!("{} payload, expected {} bytes", kind.name(), len),
            )
        })?;

        self.atoms_read += 1;
        Ok(Atom {
            kind,
            payload: Bytes::from(payload),
        })
    }

    pub fn atoms_read(&self) -> u64 {
        self.atoms_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
