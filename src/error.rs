//! Error types for codec and stream operations.
//!
//! Errors are values, never panics: argument errors are detected at entry
//! before any buffer is touched, data errors abort the call at first
//! detection, and stream I/O errors are surfaced verbatim together with the
//! index of the offending stream.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the codecs and the stream adaptor.
#[derive(Debug, Error)]
pub enum Error {
    /// Data or parity shard count of zero was requested.
    #[error("cannot create codec with zero data or parity shards")]
    InvalidShardNum,

    /// The shard configuration does not fit the largest supported field.
    #[error("shard configuration exceeds the supported maximum")]
    MaxShardNum,

    /// Not enough shards present to carry out the operation.
    #[error("too few shards to reconstruct the data")]
    TooFewShards,

    /// Every shard (or stream) was empty.
    #[error("no shard data present")]
    ShardNoData,

    /// Shard sizes are inconsistent or not a multiple of the required alignment.
    #[error("shard sizes do not match or violate the size multiple")]
    ShardSize,

    /// An empty shard array was passed.
    #[error("empty shard array")]
    EmptyShards,

    /// A shard was absent in an operation that requires all shards present.
    #[error("invalid shard data")]
    InvalidShards,

    /// The input ran out before the requested size was covered.
    #[error("not enough data to fill the requested size")]
    ShortData,

    /// The same shard slot was passed as both an input and an output.
    #[error("a shard slot cannot be both an input and an output")]
    ReconstructMismatch,

    /// A required writer slot was not supplied.
    #[error("a required writer is missing")]
    NilWriter,

    /// An invalid size parameter (for example a zero output size) was given.
    #[error("invalid size parameter")]
    Size,

    /// An underlying reader failed.
    #[error("error reading stream {stream}: {source}")]
    StreamRead {
        stream: usize,
        #[source]
        source: std::io::Error,
    },

    /// An underlying writer failed.
    #[error("error writing stream {stream}: {source}")]
    StreamWrite {
        stream: usize,
        #[source]
        source: std::io::Error,
    },
}
