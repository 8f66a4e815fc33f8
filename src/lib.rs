//! FFT-driven systematic Reed-Solomon erasure coding.
//!
//! Given `k` data shards and `m` parity shards, the codec produces the `m`
//! parity shards, verifies full shard sets and rebuilds up to `m` erased
//! shards. Configurations with a small FFT footprint run over GF(2^8);
//! larger ones (up to 65536 shards) run over GF(2^16). Both backends drive
//! their encoder and decoder with radix-2/radix-4 decimation-in-time FFT
//! butterflies over SIMD-accelerated field kernels.
//!
//! ```
//! use rsfec::ReedSolomon;
//!
//! let codec = ReedSolomon::new(4, 2).unwrap();
//! let mut shards = codec.split(b"some data to protect".as_slice()).unwrap();
//! codec.encode(&mut shards).unwrap();
//! assert!(codec.verify(&shards).unwrap());
//!
//! // Lose any two shards and the data still comes back.
//! shards[0] = Vec::new();
//! shards[5] = Vec::new();
//! codec.reconstruct(&mut shards).unwrap();
//!
//! let mut restored = Vec::new();
//! codec.join(&mut restored, &shards, 20).unwrap();
//! assert_eq!(restored, b"some data to protect");
//! ```
//!
//! Shards are plain `Vec<u8>`; an empty vector marks an absent shard in
//! reconstruction calls. All shards of one call share a common size, which
//! must be a multiple of [`SHARD_SIZE_MULTIPLE`]. Stream variants of every
//! operation process readers and writers block by block.

mod codec16;
mod codec8;
pub mod error;
pub mod galois;
mod shards;
mod stream;

use codec16::Codec16;
use codec8::Codec8;
use std::io::Write;

pub use error::{Error, Result};
pub use shards::SHARD_SIZE_MULTIPLE;
pub use stream::DEFAULT_BLOCK_SIZE;

use shards::align_up;
use stream::StreamOptions;

enum Backend {
    Ff8(Codec8),
    Ff16(Codec16),
}

/// Unified erasure codec over `k + m` shards.
///
/// The backend field width is chosen at construction: GF(2^8) whenever the
/// whole decoder FFT fits its 256-element order, GF(2^16) otherwise.
pub struct ReedSolomon {
    backend: Backend,
    pub(crate) stream: StreamOptions,
}

impl ReedSolomon {
    /// Create a codec for `data_shards` data and `parity_shards` parity
    /// shards.
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(Error::InvalidShardNum);
        }
        let backend = if Codec8::fits(data_shards, parity_shards) {
            Backend::Ff8(Codec8::new(data_shards, parity_shards)?)
        } else {
            Backend::Ff16(Codec16::new(data_shards, parity_shards)?)
        };
        Ok(ReedSolomon {
            backend,
            stream: StreamOptions::default(),
        })
    }

    /// Set the worker target for parallel kernels and stream I/O. A value
    /// of zero is coerced to one; one disables parallelism.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        let workers = workers.max(1);
        match &mut self.backend {
            Backend::Ff8(codec) => codec.set_workers(workers),
            Backend::Ff16(codec) => codec.set_workers(workers),
        }
        self.stream.concurrent_io = workers > 1;
        self
    }

    /// Set the stream block size, clamped to a multiple of the shard size
    /// multiple.
    pub fn with_stream_block_size(mut self, bytes: usize) -> Self {
        self.stream.block_size = align_up(bytes.max(1), SHARD_SIZE_MULTIPLE);
        self
    }

    pub fn data_shards(&self) -> usize {
        match &self.backend {
            Backend::Ff8(codec) => codec.data_shards(),
            Backend::Ff16(codec) => codec.data_shards(),
        }
    }

    pub fn parity_shards(&self) -> usize {
        match &self.backend {
            Backend::Ff8(codec) => codec.parity_shards(),
            Backend::Ff16(codec) => codec.parity_shards(),
        }
    }

    pub fn total_shards(&self) -> usize {
        match &self.backend {
            Backend::Ff8(codec) => codec.total_shards(),
            Backend::Ff16(codec) => codec.total_shards(),
        }
    }

    /// Size every shard must be a multiple of.
    pub fn shard_size_multiple(&self) -> usize {
        SHARD_SIZE_MULTIPLE
    }

    /// Allocate the full shard set with `each` bytes per shard, rounded up
    /// to the shard size multiple.
    pub fn alloc_shards(&self, each: usize) -> Vec<Vec<u8>> {
        shards::alloc_shards(self.total_shards(), each)
    }

    /// Fill the parity shards from the data shards. All `total_shards()`
    /// buffers must be present with a common aligned size; indices
    /// `[0, data_shards())` are read, the rest are overwritten.
    pub fn encode(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        match &self.backend {
            Backend::Ff8(codec) => codec.encode(shards),
            Backend::Ff16(codec) => codec.encode(shards),
        }
    }

    /// Check that the parity shards match the data shards.
    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        match &self.backend {
            Backend::Ff8(codec) => codec.verify(shards),
            Backend::Ff16(codec) => codec.verify(shards),
        }
    }

    /// Rebuild every absent shard. Absent shards are empty vectors; at most
    /// `parity_shards()` may be absent. Complete shard sets return without
    /// doing any work.
    pub fn reconstruct(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        match &self.backend {
            Backend::Ff8(codec) => codec.reconstruct(shards),
            Backend::Ff16(codec) => codec.reconstruct(shards),
        }
    }

    /// Rebuild only the absent data shards; absent parity shards are left
    /// untouched.
    pub fn reconstruct_data(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        match &self.backend {
            Backend::Ff8(codec) => codec.reconstruct_data(shards),
            Backend::Ff16(codec) => codec.reconstruct_data(shards),
        }
    }

    /// Split `data` into the full shard set: the data shards carry the
    /// payload padded with zeros, the parity shards are allocated zeroed at
    /// the same size, ready for [`encode`](Self::encode).
    pub fn split(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        if data.is_empty() {
            return Err(Error::ShortData);
        }
        let k = self.data_shards();
        let per_shard = align_up(data.len().div_ceil(k), SHARD_SIZE_MULTIPLE);
        let mut out = Vec::with_capacity(self.total_shards());
        for i in 0..k {
            let start = (i * per_shard).min(data.len());
            let end = ((i + 1) * per_shard).min(data.len());
            let mut shard = vec![0u8; per_shard];
            shard[..end - start].copy_from_slice(&data[start..end]);
            out.push(shard);
        }
        out.resize_with(self.total_shards(), || vec![0u8; per_shard]);
        Ok(out)
    }

    /// Concatenate the data shards into `dst`, emitting exactly `out_size`
    /// bytes and trimming the split padding.
    pub fn join<W: Write>(&self, dst: &mut W, shards: &[Vec<u8>], out_size: usize) -> Result<()> {
        if shards.is_empty() {
            return Err(Error::EmptyShards);
        }
        if shards.len() < self.data_shards() {
            return Err(Error::TooFewShards);
        }
        let shards = &shards[..self.data_shards()];
        let available: usize = shards.iter().map(|s| s.len()).sum();
        if available < out_size {
            return Err(Error::ShortData);
        }

        let mut remaining = out_size;
        for shard in shards {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(shard.len());
            dst.write_all(&shard[..take])
                .map_err(|e| Error::StreamWrite { stream: 0, source: e })?;
            remaining -= take;
        }
        Ok(())
    }
}
