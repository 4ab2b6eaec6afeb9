//! The numeric error-code vocabulary this decoder surfaces to callers.
//!
//! Every public entry point returns `Result<T, GraphError>`. Internal helpers that
//! are not part of the public contract (text parsing minutiae, arithmetic on
//! intermediate values) use `anyhow::Result` and get folded into the appropriate
//! variant here at the boundary, the same way the reference implementation's
//! loader funnels `java_properties`/`anyhow` failures into a handful of outcomes.

use std::fmt;

/// A decoder-level failure, carrying the same numeric code the C reference
/// implementation's `bvgraph_error_string` table associates with each condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Allocation failure.
    OutOfMemory,
    /// File open/read/seek failure, or short read.
    IoError(String),
    /// Call or coding not implemented by this decoder.
    Unsupported(String),
    /// Base filename longer than 1023 characters.
    FilenameTooLong,
    /// Caller-provided external buffer was too small.
    BufferTooSmall,
    /// Malformed `.properties` file.
    PropertyFileError(String),
    /// `version` key was not 0, or `graphclass` did not match a known class name.
    UnsupportedVersion,
    /// Unknown token in `compressionflags`.
    PropertyCompressionFlagError(String),
    /// Random access with `x` outside `[0, n)`.
    VertexOutOfRange,
    /// Random access attempted on a graph loaded without an offsets index.
    RequiresOffsets,
    /// The code selected for some field is not one this decoder implements.
    UnsupportedCoding(String),
    /// An Elias-Fano `add_batch` call was given a non monotone-nondecreasing array.
    NotMonotone,
}

impl GraphError {
    /// The numeric code from the external interface's error table.
    pub fn code(&self) -> i32 {
        match self {
            GraphError::OutOfMemory => -1,
            GraphError::IoError(_) => -2,
            GraphError::Unsupported(_) => -3,
            GraphError::FilenameTooLong => 11,
            GraphError::BufferTooSmall => 12,
            GraphError::PropertyFileError(_) => 21,
            GraphError::UnsupportedVersion => 22,
            GraphError::PropertyCompressionFlagError(_) => 23,
            GraphError::VertexOutOfRange => 31,
            GraphError::RequiresOffsets => 32,
            GraphError::UnsupportedCoding(_) => 33,
            // Not part of the external error table; distinct from all of the above.
            GraphError::NotMonotone => -4,
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::OutOfMemory => write!(f, "out of memory"),
            GraphError::IoError(msg) => write!(f, "I/O error: {msg}"),
            GraphError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            GraphError::FilenameTooLong => write!(f, "filename longer than 1023 characters"),
            GraphError::BufferTooSmall => write!(f, "external buffer too small"),
            GraphError::PropertyFileError(msg) => write!(f, "malformed properties file: {msg}"),
            GraphError::UnsupportedVersion => write!(f, "unsupported version or graph class"),
            GraphError::PropertyCompressionFlagError(tok) => {
                write!(f, "unknown compression flag token: {tok}")
            }
            GraphError::VertexOutOfRange => write!(f, "vertex index out of range"),
            GraphError::RequiresOffsets => write!(f, "random access requires an offsets index"),
            GraphError::UnsupportedCoding(code) => write!(f, "unsupported coding: {code}"),
            GraphError::NotMonotone => write!(f, "sequence is not monotone nondecreasing"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        GraphError::IoError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
