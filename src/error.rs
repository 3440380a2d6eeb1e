//! Error types for the blocklist store.

use std::path::PathBuf;

use thiserror::Error;

/// Failures produced by [`crate::store::BlocklistStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The candidate entry could not be reduced to a blocklist entry.
    #[error("invalid url {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },

    /// The blocklist file exists but could not be read.
    #[error("failed to read blocklist {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocklist file could not be written.
    #[error("failed to write blocklist {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
