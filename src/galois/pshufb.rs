//! PSHUFB-based kernels for x86_64 (AVX2 + SSSE3).
//!
//! PSHUFB performs 16-entry lookups, so each 256-entry table is split into
//! nibble tables: a byte product is assembled as
//! `lo_tbl[x & 0x0F] ^ hi_tbl[x >> 4]`, exploiting the linearity of the
//! field over the input nibbles. The 16-bit kernels run the same trick per
//! input byte lane and reassemble the low and high product bytes with a
//! shift. Index bytes outside the nibble range are zero, and entry 0 of
//! every table is zero, so the unused odd lanes of the 16-bit path
//! contribute nothing.
//!
//! Every kernel processes the 32-byte-multiple prefix of its input and
//! returns the number of bytes handled; callers finish the tail with the
//! scalar kernels. Loads and stores are unaligned.

use super::gf16::Mul16;
use super::gf8::Mul8;
use std::arch::x86_64::*;

/// Split a 256-entry byte table into low/high nibble tables.
fn nibble_tables8(table: &[u8; 256]) -> ([u8; 16], [u8; 16]) {
    let mut lo = [0u8; 16];
    let mut hi = [0u8; 16];
    for nib in 0..16 {
        lo[nib] = table[nib];
        hi[nib] = table[nib << 4];
    }
    (lo, hi)
}

/// Split a 256-entry u16 table into four nibble tables: low/high input
/// nibble, each producing the low and the high byte of the product.
fn nibble_tables16(table: &[u16; 256]) -> ([u8; 16], [u8; 16], [u8; 16], [u8; 16]) {
    let mut lo_nib_lo = [0u8; 16];
    let mut lo_nib_hi = [0u8; 16];
    let mut hi_nib_lo = [0u8; 16];
    let mut hi_nib_hi = [0u8; 16];
    for nib in 0..16 {
        let low = table[nib];
        lo_nib_lo[nib] = (low & 0xFF) as u8;
        lo_nib_hi[nib] = (low >> 8) as u8;
        let high = table[nib << 4];
        hi_nib_lo[nib] = (high & 0xFF) as u8;
        hi_nib_hi[nib] = (high >> 8) as u8;
    }
    (lo_nib_lo, lo_nib_hi, hi_nib_lo, hi_nib_hi)
}

#[target_feature(enable = "avx2")]
unsafe fn broadcast(table: &[u8; 16]) -> __m256i {
    _mm256_broadcastsi128_si256(_mm_loadu_si128(table.as_ptr() as *const __m128i))
}

/// GF(2^8) wide kernel: multiply 32 bytes per iteration through nibble
/// lookups; `accumulate` selects between `dst ^=` and `dst =`.
///
/// # Safety
/// Caller must ensure AVX2 and SSSE3 are available.
#[target_feature(enable = "avx2", enable = "ssse3")]
unsafe fn mul8_kernel(dst: &mut [u8], src: &[u8], lut: &Mul8, accumulate: bool) -> usize {
    let len = dst.len().min(src.len());
    let wide = len & !31;
    if wide == 0 {
        return 0;
    }

    let (lo_tbl, hi_tbl) = nibble_tables8(&lut.value);
    let lo_vec = broadcast(&lo_tbl);
    let hi_vec = broadcast(&hi_tbl);
    let mask = _mm256_set1_epi8(0x0F);

    let mut pos = 0;
    while pos < wide {
        let x = _mm256_loadu_si256(src.as_ptr().add(pos) as *const __m256i);
        let lo_nib = _mm256_and_si256(x, mask);
        let hi_nib = _mm256_and_si256(_mm256_srli_epi16(x, 4), mask);
        let mut prod = _mm256_xor_si256(
            _mm256_shuffle_epi8(lo_vec, lo_nib),
            _mm256_shuffle_epi8(hi_vec, hi_nib),
        );
        if accumulate {
            let d = _mm256_loadu_si256(dst.as_ptr().add(pos) as *const __m256i);
            prod = _mm256_xor_si256(prod, d);
        }
        _mm256_storeu_si256(dst.as_mut_ptr().add(pos) as *mut __m256i, prod);
        pos += 32;
    }
    wide
}

/// GF(2^16) wide kernel over 16 words (32 bytes) per iteration.
///
/// # Safety
/// Caller must ensure AVX2 and SSSE3 are available.
#[target_feature(enable = "avx2", enable = "ssse3")]
unsafe fn mul16_kernel(dst: &mut [u8], src: &[u8], lut: &Mul16, accumulate: bool) -> usize {
    let len = dst.len().min(src.len());
    let wide = len & !31;
    if wide == 0 {
        return 0;
    }

    let (low_ll, low_lh, low_hl, low_hh) = nibble_tables16(&lut.lo);
    let (high_ll, high_lh, high_hl, high_hh) = nibble_tables16(&lut.hi);
    let low_ll = broadcast(&low_ll);
    let low_lh = broadcast(&low_lh);
    let low_hl = broadcast(&low_hl);
    let low_hh = broadcast(&low_hh);
    let high_ll = broadcast(&high_ll);
    let high_lh = broadcast(&high_lh);
    let high_hl = broadcast(&high_hl);
    let high_hh = broadcast(&high_hh);
    let nib_mask = _mm256_set1_epi8(0x0F);

    let mut pos = 0;
    while pos < wide {
        let x = _mm256_loadu_si256(src.as_ptr().add(pos) as *const __m256i);

        // Per-lane input bytes: low bytes in the even positions, high bytes
        // shifted down into them.
        let low_bytes = _mm256_and_si256(x, _mm256_set1_epi16(0x00FF));
        let high_bytes = _mm256_srli_epi16(x, 8);

        let low_lo_nib = _mm256_and_si256(low_bytes, nib_mask);
        let low_hi_nib = _mm256_and_si256(_mm256_srli_epi16(low_bytes, 4), nib_mask);
        let high_lo_nib = _mm256_and_si256(high_bytes, nib_mask);
        let high_hi_nib = _mm256_and_si256(_mm256_srli_epi16(high_bytes, 4), nib_mask);

        // Product low byte from both input bytes.
        let prod_lo = _mm256_xor_si256(
            _mm256_xor_si256(
                _mm256_shuffle_epi8(low_ll, low_lo_nib),
                _mm256_shuffle_epi8(low_hl, low_hi_nib),
            ),
            _mm256_xor_si256(
                _mm256_shuffle_epi8(high_ll, high_lo_nib),
                _mm256_shuffle_epi8(high_hl, high_hi_nib),
            ),
        );
        // Product high byte.
        let prod_hi = _mm256_xor_si256(
            _mm256_xor_si256(
                _mm256_shuffle_epi8(low_lh, low_lo_nib),
                _mm256_shuffle_epi8(low_hh, low_hi_nib),
            ),
            _mm256_xor_si256(
                _mm256_shuffle_epi8(high_lh, high_lo_nib),
                _mm256_shuffle_epi8(high_hh, high_hi_nib),
            ),
        );

        let mut prod = _mm256_or_si256(prod_lo, _mm256_slli_epi16(prod_hi, 8));
        if accumulate {
            let d = _mm256_loadu_si256(dst.as_ptr().add(pos) as *const __m256i);
            prod = _mm256_xor_si256(prod, d);
        }
        _mm256_storeu_si256(dst.as_mut_ptr().add(pos) as *mut __m256i, prod);
        pos += 32;
    }
    wide
}

/// # Safety
/// Requires AVX2 and SSSE3; `dst` and `src` must not alias.
pub unsafe fn mul_add8_avx2(dst: &mut [u8], src: &[u8], lut: &Mul8) -> usize {
    mul8_kernel(dst, src, lut, true)
}

/// # Safety
/// Requires AVX2 and SSSE3; `dst` and `src` must not alias.
pub unsafe fn mul8_avx2(dst: &mut [u8], src: &[u8], lut: &Mul8) -> usize {
    mul8_kernel(dst, src, lut, false)
}

/// # Safety
/// Requires AVX2 and SSSE3; `dst` and `src` must not alias.
pub unsafe fn mul_add16_avx2(dst: &mut [u8], src: &[u8], lut: &Mul16) -> usize {
    mul16_kernel(dst, src, lut, true)
}

/// # Safety
/// Requires AVX2 and SSSE3; `dst` and `src` must not alias.
pub unsafe fn mul16_avx2(dst: &mut [u8], src: &[u8], lut: &Mul16) -> usize {
    mul16_kernel(dst, src, lut, false)
}
