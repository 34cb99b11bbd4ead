//! Error types for o3db
//!
//! Provides a unified error type for archive and scene operations.
//! Every variant is terminal for the publish/load call that raised it.

use thiserror::Error;

use crate::scene::ObjectId;

/// Result type alias using ArchiveError
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Unified error type for o3db operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Framing Errors
    // -------------------------------------------------------------------------
    #[error("Bad magic: expected O3DB, got {found:02x?}")]
    MagicMismatch { found: [u8; 4] },

    #[error("Truncated atom: {0}")]
    TruncatedAtom(String),

    #[error("Malformed atom: {0}")]
    MalformedAtom(String),

    // -------------------------------------------------------------------------
    // Graph Errors
    // -------------------------------------------------------------------------
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unresolved {what} reference: {id}")]
    UnresolvedReference { what: &'static str, id: u32 },

    #[error("Unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    #[error("Size mismatch in {what}: expected {expected}, found {found}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Index value {value} does not fit a 16-bit index field")]
    IndexOverflow { value: u32 },

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Object #{id} ({class} '{name}'): {source}")]
    InObject {
        id: ObjectId,
        class: String,
        name: String,
        #[source]
        source: Box<ArchiveError>,
    },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Compression failure: {0}")]
    Compression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("Resource error: {0}")]
    Resource(String),
}

impl ArchiveError {
    /// Attach object context to an error. Already-contextualized errors are
    /// returned as-is so the innermost object is the one reported.
    pub fn in_object(self, id: ObjectId, class: &str, name: &str) -> Self {
        match self {
            e @ ArchiveError::InObject { .. } => e,
            e => ArchiveError::InObject {
                id,
                class: class.to_string(),
                name: name.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// Strip any object context and return the underlying error
    pub fn root_cause(&self) -> &ArchiveError {
        match self {
            ArchiveError::InObject { source, .. } => source.root_cause(),
            e => e,
        }
    }
}

impl From<bincode::Error> for ArchiveError {
    fn from(e: bincode::Error) -> Self {
        ArchiveError::Serialization(e.to_string())
    }
}
