//! String table
//!
//! Strings are interned once per archive and referred to by index. The
//! index is never written next to the string: both sides derive it from
//! the order of STRING atoms. The table therefore only stays in lock-step if
//!
//! - `StringEncoder::intern` is the only producer of `StringIndex` values
//!   on the write side, and
//! - every string an atom refers to is interned before that atom is
//!   written.
//!
//! `StringIndex` has no public constructor so an index cannot be invented
//! anywhere else.

use std::collections::HashMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

use super::framer::{AtomKind, AtomWriter};
use super::records::StringRecord;

/// Position of a string in the archive's string table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringIndex(u32);

impl StringIndex {
    pub fn get(self) -> u32 {
        self.0
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Write-side table
#[derive(Debug, Default)]
pub struct StringEncoder {
    indices: HashMap<String, StringIndex>,
}

impl StringEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value`, emitting a STRING atom the first time it is seen.
    /// The empty string is sent as an absent value.
    pub fn intern<W: Write>(
        &mut self,
        atoms: &mut AtomWriter<W>,
        value: &str,
    ) -> Result<StringIndex> {
        if let Some(&index) = self.indices.get(value) {
            return Ok(index);
        }

        let index = StringIndex(self.indices.len() as u32);
        let record = StringRecord {
            value: (!value.is_empty()).then(|| value.to_string()),
        };
        atoms.write_record(AtomKind::String, &record)?;
        self.indices.insert(value.to_string(), index);
        tracing::trace!("Interned string #{}: {:?}", index.0, value);
        Ok(index)
    }

    /// Number of distinct strings emitted so far
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Read-side mirror
#[derive(Debug, Default)]
pub struct StringDecoder {
    table: Vec<String>,
}

impl StringDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the string carried by a STRING atom
    pub fn push(&mut self, record: StringRecord) -> StringIndex {
        let index = StringIndex(self.table.len() as u32);
        self.table.push(record.value.unwrap_or_default());
        index
    }

    pub fn resolve(&self, index: StringIndex) -> Result<&str> {
        self.table
            .get(index.0 as usize)
            .map(String::as_str)
            .ok_or(ArchiveError::UnresolvedReference {
                what: "string",
                id: index.0,
            })
    }

    /// Strings in table order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.table.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
