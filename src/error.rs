//! Error types for the zlines container format.
//!
//! One top-level enum plays the role `sixcy::superblock::SuperblockError`
//! and `sixcy::codec::CodecError` play together for `.6cy`: zlines has a
//! single wire format (not a multi-codec, multi-block-type container), so
//! one error enum covers header, index, and codec failures alike. The six
//! kinds below are exactly the six of the specification's error-handling
//! section.

use std::io;
use thiserror::Error;

/// Failure of the underlying streaming compressor.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("short read from file while decompressing: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

/// All failure modes a `Store` can report.
///
/// `append_line`/`close`/`open_read` surface this directly. `get_line`,
/// `get_line_partial`, and `line_length` surface `OutOfRange` as a sentinel
/// (`None` / `-1`) per §7 rather than propagating it as an error — see
/// `Store::get_line`.
#[derive(Error, Debug)]
pub enum ZlineError {
    #[error("I/O error on {path}: {source}")]
    Io { path: String, #[source] source: io::Error },

    #[error("malformed zlines file {path}: {detail}")]
    Format { path: String, detail: String },

    #[error("line index {index} out of range (line_count = {line_count})")]
    OutOfRange { index: u64, line_count: u64 },

    #[error("{attempted} is not permitted on a store opened in {mode:?} mode")]
    Mode { attempted: &'static str, mode: StoreMode },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("resource limit exceeded: {detail}")]
    Resource { detail: String },
}

impl ZlineError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        ZlineError::Io { path: path.into(), source }
    }

    pub fn format(path: impl Into<String>, detail: impl Into<String>) -> Self {
        ZlineError::Format { path: path.into(), detail: detail.into() }
    }

    pub fn resource(detail: impl Into<String>) -> Self {
        ZlineError::Resource { detail: detail.into() }
    }
}

/// The mode a store was opened in — reported in [`ZlineError::Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Create,
    Read,
    Closed,
}

pub type Result<T> = std::result::Result<T, ZlineError>;
