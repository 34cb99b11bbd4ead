//! Atom-level tools that never build a graph

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::config::Config;
use crate::error::Result;

use super::compression::{Compression, Compressor, Decompressor};
use super::framer::{
    read_header, write_header, AtomKind, AtomReader, AtomWriter, ATOM_HEADER_SIZE,
};
use super::records::{EndOfArchiveRecord, ObjectRecord, StreamHeader, StringRecord};
use super::strings::StringDecoder;

/// What an archive contains, read atom by atom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub compression: Compression,
    /// Atom count per kind name
    pub atoms: BTreeMap<&'static str, u64>,
    /// Interned strings in table order
    pub strings: Vec<String>,
    /// OBJECT atom count per class
    pub classes: BTreeMap<String, u64>,
    /// Archive id of the root transform
    pub root: u32,
    /// Uncompressed atom bytes, headers included
    pub atom_bytes: u64,
}

impl ArchiveSummary {
    pub fn atom_count(&self, kind: AtomKind) -> u64 {
        self.atoms.get(kind.name()).copied().unwrap_or(0)
    }

    pub fn total_atoms(&self) -> u64 {
        self.atoms.values().sum()
    }
}

/// Walk every atom up to END_OF_ARCHIVE
pub fn inspect<R: Read>(mut reader: R, config: &Config) -> Result<ArchiveSummary> {
    let header = read_header(&mut reader)?;
    let mut atoms = AtomReader::new(
        Decompressor::new(reader, header.compression),
        config.max_atom_size,
    );

    let mut counts = BTreeMap::new();
    let mut strings = StringDecoder::new();
    let mut classes = BTreeMap::new();
    let mut atom_bytes = 0u64;

    loop {
        let atom = atoms.read_atom()?;
        *counts.entry(atom.kind.name()).or_insert(0) += 1;
        atom_bytes += (ATOM_HEADER_SIZE + atom.payload.len()) as u64;

        match atom.kind {
            AtomKind::String => {
                strings.push(atom.decode::<StringRecord>()?);
            }
            AtomKind::Object => {
                let record: ObjectRecord = atom.decode()?;
                let class = strings.resolve(record.header.type_name)?.to_string();
                *classes.entry(class).or_insert(0) += 1;
            }
            AtomKind::Attachment => {}
            AtomKind::EndOfArchive => {
                let end: EndOfArchiveRecord = atom.decode()?;
                let strings = strings.iter().map(str::to_string).collect();
                return Ok(ArchiveSummary {
                    compression: header.compression,
                    atoms: counts,
                    strings,
                    classes,
                    root: end.root,
                    atom_bytes,
                });
            }
        }
    }
}

/// Copy every atom into a new archive under `compression`.
///
/// Payloads are copied byte for byte. Returns the number of atoms written.
pub fn recompress<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    compression: Compression,
    config: &Config,
) -> Result<u64> {
    let header = read_header(&mut input)?;
    let mut atoms = AtomReader::new(
        Decompressor::new(input, header.compression),
        config.max_atom_size,
    );

    write_header(&mut output, &StreamHeader { compression })?;
    let mut writer = AtomWriter::new(Compressor::new(output, compression, config));

    loop {
        let atom = atoms.read_atom()?;
        writer.write_atom(atom.kind, &atom.payload)?;
        if atom.kind == AtomKind::EndOfArchive {
            break;
        }
    }

    let written = writer.atoms_written();
    let mut output = writer.into_inner().finish()?;
    output.flush()?;
    tracing::debug!(
        "Recompressed {} atoms: {} -> {}",
        written,
        header.compression,
        compression
    );
    Ok(written)
}
