//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A chunk's bytes could not be decoded as PCM.
    #[error("Failed to decode chunk {chunk_index}: {reason}")]
    Decode { chunk_index: usize, reason: String },

    /// A chunk could not be fetched.
    #[error("Failed to fetch chunk {chunk_index}: {reason}")]
    Network { chunk_index: usize, reason: String },

    /// The load was aborted before it settled.
    #[error("Loading cancelled")]
    Cancelled,

    /// Decoded chunks do not fit together.
    #[error("Cannot merge chunks: {0}")]
    Merge(String),

    #[error("No chunks to load")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] halo_core::Error),
}

impl Error {
    /// Index of the chunk that failed, for per-chunk failures.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Error::Decode { chunk_index, .. } | Error::Network { chunk_index, .. } => {
                Some(*chunk_index)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
