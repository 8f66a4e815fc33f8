//! Shard-array helpers shared by both codec widths.
//!
//! A shard is a plain `Vec<u8>`; an empty vector marks an absent shard in
//! reconstruction calls. All non-absent shards of one call share a common
//! size, which must be a multiple of [`SHARD_SIZE_MULTIPLE`].

use crate::error::{Error, Result};

/// Size every shard must be a multiple of. The two-byte alignment of the
/// 16-bit field is folded into the 64-byte SIMD lane width, so both codec
/// widths share one multiple.
pub const SHARD_SIZE_MULTIPLE: usize = 64;

/// The common size of a shard set: the first non-zero length, or 0 if all
/// shards are empty.
pub fn shard_size(shards: &[Vec<u8>]) -> usize {
    shards.iter().map(|s| s.len()).find(|&len| len != 0).unwrap_or(0)
}

/// Check that all shards share one size. Empty entries are tolerated only
/// when `allow_missing` is set; otherwise an absent shard is invalid.
pub fn check_shards(shards: &[Vec<u8>], allow_missing: bool) -> Result<()> {
    let size = shard_size(shards);
    if size == 0 {
        return Err(Error::ShardNoData);
    }
    for shard in shards {
        if shard.len() == size {
            continue;
        }
        if shard.is_empty() {
            if !allow_missing {
                return Err(Error::InvalidShards);
            }
        } else {
            return Err(Error::ShardSize);
        }
    }
    Ok(())
}

/// Round `n` up to the next multiple of `multiple`.
pub fn align_up(n: usize, multiple: usize) -> usize {
    n.div_ceil(multiple) * multiple
}

/// Allocate `count` zeroed shards, each of `each` bytes rounded up to the
/// shard size multiple.
pub fn alloc_shards(count: usize, each: usize) -> Vec<Vec<u8>> {
    let each = align_up(each, SHARD_SIZE_MULTIPLE);
    (0..count).map(|_| vec![0u8; each]).collect()
}

/// Smallest power of two not below `n`.
pub fn ceil_pow2(n: usize) -> usize {
    n.next_power_of_two()
}
