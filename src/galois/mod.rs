//! Finite-field tables and byte-slice kernels for the FFT codecs.
//!
//! Two independent fields are carried: GF(2^8) for codecs of up to 256
//! shards and GF(2^16) for larger configurations. Each field owns its
//! log/exp tables (laid out over a Cantor basis so the FFT skew recurrence
//! closes within the field), per-position skew twiddles, a log-Walsh table
//! for the decoder's error locator, and split multiply tables indexed by the
//! log of the constant. Tables are built once per process and immutable
//! thereafter.
//!
//! The scalar kernels in `gf8`/`gf16` are the semantic reference; the SIMD
//! kernels in `pshufb` (x86_64) and `neon` (aarch64) process the wide prefix
//! of a slice and must be byte-identical to the scalar versions.
//!
//! # Note
//! This module is public for benchmarks and tests but not part of the stable
//! API. Use the `ReedSolomon` facade instead.

pub mod gf16;
pub mod gf8;

#[cfg(target_arch = "aarch64")]
pub mod neon;
#[cfg(target_arch = "x86_64")]
pub mod pshufb;

use std::sync::OnceLock;

/// SIMD implementation bound for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    /// Scalar kernels only.
    None,
    /// x86_64 AVX2 + SSSE3 nibble-table kernels.
    Avx2,
    /// aarch64 NEON table-lookup kernels.
    Neon,
}

/// Detect the best SIMD level once; subsequent calls return the cached value.
pub fn detect_simd() -> SimdLevel {
    static LEVEL: OnceLock<SimdLevel> = OnceLock::new();
    *LEVEL.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("ssse3") {
                return SimdLevel::Avx2;
            }
            SimdLevel::None
        }
        #[cfg(target_arch = "aarch64")]
        {
            SimdLevel::Neon
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            SimdLevel::None
        }
    })
}

/// `dst ^= src`, bytewise over the common prefix.
pub fn xor_slice(dst: &mut [u8], src: &[u8]) {
    let len = dst.len().min(src.len());
    let mut dst_words = dst[..len].chunks_exact_mut(8);
    let mut src_words = src[..len].chunks_exact(8);
    for (d, s) in dst_words.by_ref().zip(src_words.by_ref()) {
        let word = u64::from_ne_bytes((&*d).try_into().unwrap())
            ^ u64::from_ne_bytes(s.try_into().unwrap());
        d.copy_from_slice(&word.to_ne_bytes());
    }
    for (d, s) in dst_words.into_remainder().iter_mut().zip(src_words.remainder()) {
        *d ^= *s;
    }
}
