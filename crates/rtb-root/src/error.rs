//! Error type for ROOT file I/O.

use thiserror::Error;

/// Errors raised while reading or writing ROOT files.
#[derive(Error, Debug)]
pub enum RootError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the `root` magic.
    #[error("not a ROOT file (bad magic)")]
    BadMagic,

    /// Attempted to read past the end of a buffer.
    #[error("buffer underflow at offset {offset}: need {need} bytes, have {have}")]
    BufferUnderflow {
        /// Read position.
        offset: usize,
        /// Requested byte count.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// No key with this name in the directory.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Stored class cannot be decoded as a histogram.
    #[error("unsupported class: {0}")]
    UnsupportedClass(String),

    /// Malformed object payload.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression block error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Object cannot be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Histogram filling error.
    #[error("histogram fill error: {0}")]
    HistogramFill(String),
}

/// Result alias for ROOT I/O.
pub type Result<T> = std::result::Result<T, RootError>;
