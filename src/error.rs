//! Error types for the PDF engine.
//!
//! Every fallible operation returns [`Result`]. Errors are grouped into a small
//! taxonomy ([`ErrorKind`]) so callers can decide whether a failure is fatal
//! without matching on every variant.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An object, key or anchor keyword is absent
    NotFound,
    /// Unbalanced delimiters, missing endobj/endstream, bad compressed data
    MalformedInput,
    /// Object or page index outside bounds
    OutOfRange,
    /// Cross-reference streams, encrypted input
    Unsupported,
    /// Boundary I/O failure
    Io,
}

/// Error types that can occur while building, parsing or patching documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No `N G obj` marker for the requested object number
    #[error("Object not found: {0} 0 obj")]
    ObjectNotFound(u32),

    /// A structural keyword (`startxref`, `trailer`, `xref`, root) is absent
    #[error("Anchor not found: {0}")]
    AnchorNotFound(&'static str),

    /// An opening delimiter has no matching close
    #[error("Unbalanced '{delimiter}' starting at byte {offset}")]
    UnbalancedDelimiter {
        /// Byte offset of the opening delimiter
        offset: usize,
        /// The delimiter that was left open
        delimiter: &'static str,
    },

    /// A `stream` keyword has no matching `endstream`
    #[error("Stream in object {0} is not terminated by endstream")]
    StreamUnterminated(u32),

    /// An object body is not closed by `endobj`
    #[error("Object {0} is not terminated by endobj")]
    MissingEndobj(u32),

    /// Stream decompression failed
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Generic structural problem in the input bytes
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Index outside of the valid range
    #[error("Index {index} out of range (len {len})")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Number of available items
        len: usize,
    },

    /// Feature outside of what the engine handles
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ObjectNotFound(_) | Error::AnchorNotFound(_) => ErrorKind::NotFound,
            Error::UnbalancedDelimiter { .. }
            | Error::StreamUnterminated(_)
            | Error::MissingEndobj(_)
            | Error::Decode(_)
            | Error::InvalidPdf(_) => ErrorKind::MalformedInput,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}
