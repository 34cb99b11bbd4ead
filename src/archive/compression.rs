//! Atom stream compression
//!
//! The magic and stream header are always written raw. Everything after
//! them goes through one of these transforms, chosen once per archive.

use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::config::Config;
use crate::error::{ArchiveError, Result};

/// Compression mode recorded in the stream header (0=NONE, 1=GZIP, 2=LZMA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    Gzip,
    Lzma,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Lzma => "lzma",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Compression {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "lzma" | "xz" => Ok(Compression::Lzma),
            other => Err(ArchiveError::Compression(format!(
                "unknown compression mode '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Write side
// =============================================================================

/// Write half of the adapter.
///
/// `finish` flushes the trailer and hands back the raw stream. Dropping an
/// unfinished compressor still attempts to finalize the encoder.
pub enum Compressor<W: Write> {
    None(W),
    Gzip(GzEncoder<W>),
    Lzma(XzEncoder<W>),
}

impl<W: Write> Compressor<W> {
    pub fn new(inner: W, mode: Compression, config: &Config) -> Self {
        match mode {
            Compression::None => Compressor::None(inner),
            Compression::Gzip => Compressor::Gzip(GzEncoder::new(
                inner,
                flate2::Compression::new(config.gzip_level),
            )),
            Compression::Lzma => Compressor::Lzma(XzEncoder::new(inner, config.lzma_preset)),
        }
    }

    pub fn mode(&self) -> Compression {
        match self {
            Compressor::None(_) => Compression::None,
            Compressor::Gzip(_) => Compression::Gzip,
            Compressor::Lzma(_) => Compression::Lzma,
        }
    }

    /// Finalize the compressed stream and return the raw writer
    pub fn finish(self) -> Result<W> {
        let inner = match self {
            Compressor::None(mut w) => {
                w.flush()?;
                w
            }
            Compressor::Gzip(e) => e
                .finish()
                .map_err(|e| ArchiveError::Compression(format!("gzip finish failed: {}", e)))?,
            Compressor::Lzma(e) => e
                .finish()
                .map_err(|e| ArchiveError::Compression(format!("lzma finish failed: {}", e)))?,
        };
        Ok(inner)
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::None(w) => w.write(buf),
            Compressor::Gzip(e) => e.write(buf),
            Compressor::Lzma(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::None(w) => w.flush(),
            Compressor::Gzip(e) => e.flush(),
            Compressor::Lzma(e) => e.flush(),
        }
    }
}

// =============================================================================
// Read side
// =============================================================================

/// Marker carried inside `io::Error` for faults raised by a decoder
#[derive(Debug)]
pub(crate) struct DecoderFault(String);

impl fmt::Display for DecoderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecoderFault {}

/// Read half of the adapter
pub enum Decompressor<R: Read> {
    None(R),
    Gzip(GzDecoder<R>),
    Lzma(XzDecoder<R>),
}

impl<R: Read> Decompressor<R> {
    pub fn new(inner: R, mode: Compression) -> Self {
        match mode {
            Compression::None => Decompressor::None(inner),
            Compression::Gzip => Decompressor::Gzip(GzDecoder::new(inner)),
            Compression::Lzma => Decompressor::Lzma(XzDecoder::new(inner)),
        }
    }

    pub fn mode(&self) -> Compression {
        match self {
            Decompressor::None(_) => Compression::None,
            Decompressor::Gzip(_) => Compression::Gzip,
            Decompressor::Lzma(_) => Compression::Lzma,
        }
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (result, codec) = match self {
            Decompressor::None(r) => return r.read(buf),
            Decompressor::Gzip(d) => (d.read(buf), "gzip"),
            Decompressor::Lzma(d) => (d.read(buf), "lzma"),
        };
        result.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted => e,
            _ => io::Error::new(
                io::ErrorKind::InvalidData,
                DecoderFault(format!("{} stream corrupt: {}", codec, e)),
            ),
        })
    }
}

/// Classify a read error from the atom stream
pub(crate) fn read_error(e: io::Error, context: &str) -> ArchiveError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        return ArchiveError::TruncatedAtom(context.to_string());
    }
    let is_decoder_fault = e
        .get_ref()
        .map_or(false, |inner| inner.is::<DecoderFault>());
    if is_decoder_fault {
        ArchiveError::Compression(e.to_string())
    } else {
        ArchiveError::Io(e)
    }
}
