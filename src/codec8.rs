//! GF(2^8) codec: systematic Reed-Solomon for up to 256 shards, driven by
//! decimation-in-time FFTs over the field.
//!
//! Encoding IFFTs the data shards in groups sized to the parity FFT, folds
//! the groups together and FFTs back out, truncated to the parity count.
//! Reconstruction evaluates an error locator polynomial for the missing
//! mask in the Walsh domain, scales the surviving shards by it, and runs an
//! IFFT, a formal derivative and an FFT to reveal the erased positions.

use crate::error::{Error, Result};
use crate::galois::gf8::{fwht8, mul8, mul_add8, tables8, Ffe8, Tables8, MODULUS8, ORDER8};
use crate::galois::{xor_slice, SimdLevel};
use crate::shards::{ceil_pow2, check_shards, shard_size, SHARD_SIZE_MULTIPLE};
use log::debug;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// Shard configurations with at most this many total shards memoize the
/// Walsh-domain error locator per missing mask.
const INVERSION_CACHE_MAX_SHARDS: usize = 64;

pub(crate) struct Codec8 {
    data_shards: usize,
    parity_shards: usize,
    total_shards: usize,
    workers: usize,
    simd: SimdLevel,
    work_pool: Mutex<Vec<Vec<Vec<u8>>>>,
    inversion: Option<Mutex<FxHashMap<u64, [Ffe8; ORDER8]>>>,
}

impl Codec8 {
    /// The decoder lays recovery and original positions side by side, so the
    /// combined FFT size must fit the field order.
    pub(crate) fn fits(data_shards: usize, parity_shards: usize) -> bool {
        ceil_pow2(ceil_pow2(parity_shards) + data_shards) <= ORDER8
    }

    pub(crate) fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(Error::InvalidShardNum);
        }
        if !Self::fits(data_shards, parity_shards) {
            return Err(Error::MaxShardNum);
        }
        // Tables are process-wide; build them at construction time.
        let _ = tables8();

        let total_shards = data_shards + parity_shards;
        let inversion = (total_shards <= INVERSION_CACHE_MAX_SHARDS)
            .then(|| Mutex::new(FxHashMap::default()));
        debug!("created GF(2^8) codec: {data_shards} data + {parity_shards} parity shards");
        Ok(Codec8 {
            data_shards,
            parity_shards,
            total_shards,
            workers: 1,
            simd: crate::galois::detect_simd(),
            work_pool: Mutex::new(Vec::new()),
            inversion,
        })
    }

    pub(crate) fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub(crate) fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub(crate) fn total_shards(&self) -> usize {
        self.total_shards
    }

    pub(crate) fn set_workers(&mut self, workers: usize) {
        self.workers = workers.max(1);
    }

    pub(crate) fn encode(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        check_shards(shards, false)?;
        let size = shard_size(shards);
        if size % SHARD_SIZE_MULTIPLE != 0 {
            return Err(Error::ShardSize);
        }
        let (data, parity) = shards.split_at_mut(self.data_shards);
        self.encode_inner(data, parity, size);
        Ok(())
    }

    pub(crate) fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        check_shards(shards, false)?;
        let size = shard_size(shards);
        if size % SHARD_SIZE_MULTIPLE != 0 {
            return Err(Error::ShardSize);
        }
        let mut scratch = vec![vec![0u8; size]; self.parity_shards];
        self.encode_inner(&shards[..self.data_shards], &mut scratch, size);
        Ok(scratch.iter().zip(&shards[self.data_shards..]).all(|(a, b)| a == b))
    }

    pub(crate) fn reconstruct(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        self.reconstruct_inner(shards, true)
    }

    pub(crate) fn reconstruct_data(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        self.reconstruct_inner(shards, false)
    }

    /// Produce the parity shards for `data`. Inputs are checked by the
    /// callers; `parity` holds `parity_shards` buffers of `size` bytes.
    fn encode_inner(&self, data: &[Vec<u8>], parity: &mut [Vec<u8>], size: usize) {
        let t = tables8();
        let m = ceil_pow2(self.parity_shards);
        let mut work = self.get_work(2 * m, size);
        let (front, back) = work.split_at_mut(m);

        // First group of up to m data shards lands directly in the front
        // buffers; later groups are transformed into the back buffers and
        // folded in. Group g sits at FFT offset m + g*m, which the skew base
        // accounts for.
        let mtrunc = m.min(self.data_shards);
        ifft_dit_encoder8(&data[..mtrunc], mtrunc, front, None, m, m, t, self.simd);
        let mut pos = m;
        while pos < self.data_shards {
            let count = m.min(self.data_shards - pos);
            ifft_dit_encoder8(
                &data[pos..pos + count],
                count,
                back,
                Some(&mut *front),
                m,
                m + pos,
                t,
                self.simd,
            );
            pos += m;
        }

        // FFT back out, truncated to the parity count.
        fft_dit8(front, self.parity_shards, m, t, self.simd, self.workers);
        for (dst, src) in parity.iter_mut().zip(front.iter()) {
            dst.copy_from_slice(&src[..size]);
        }
        self.put_work(work);
    }

    fn reconstruct_inner(&self, shards: &mut [Vec<u8>], recover_all: bool) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        check_shards(shards, true)?;

        let mut present = 0usize;
        let mut data_present = 0usize;
        for (i, shard) in shards.iter().enumerate() {
            if !shard.is_empty() {
                present += 1;
                if i < self.data_shards {
                    data_present += 1;
                }
            }
        }
        if present == self.total_shards || (!recover_all && data_present == self.data_shards) {
            // Nothing to recover.
            return Ok(());
        }
        if present < self.data_shards {
            return Err(Error::TooFewShards);
        }

        let size = shard_size(shards);
        if size % SHARD_SIZE_MULTIPLE != 0 {
            return Err(Error::ShardSize);
        }

        let t = tables8();
        let m = ceil_pow2(self.parity_shards);
        let n = ceil_pow2(m + self.data_shards);

        let err_locs = self.error_locations(shards, m, t);
        let mut work = self.get_work(n, size);

        // Layout: recovery positions [0, m), original positions [m, m + k),
        // zero padding out to n. Present shards are scaled by the locator.
        for i in 0..self.parity_shards {
            let shard = &shards[self.data_shards + i];
            if !shard.is_empty() {
                mul8(&mut work[i], shard, err_locs[i], self.simd);
            } else {
                work[i].fill(0);
            }
        }
        for buf in work[self.parity_shards..m].iter_mut() {
            buf.fill(0);
        }
        for i in 0..self.data_shards {
            let shard = &shards[i];
            if !shard.is_empty() {
                mul8(&mut work[m + i], shard, err_locs[m + i], self.simd);
            } else {
                work[m + i].fill(0);
            }
        }
        for buf in work[m + self.data_shards..n].iter_mut() {
            buf.fill(0);
        }

        ifft_dit_decoder8(m + self.data_shards, &mut work, n, t, self.simd, self.workers);
        formal_derivative(&mut work, n);
        fft_dit8(&mut work, m + self.data_shards, n, t, self.simd, self.workers);

        // Reveal erasures by descaling with the locator derivative.
        for i in 0..self.total_shards {
            if !shards[i].is_empty() {
                continue;
            }
            let pos = if i < self.data_shards {
                m + i
            } else {
                if !recover_all {
                    continue;
                }
                i - self.data_shards
            };
            shards[i] = vec![0u8; size];
            mul8(&mut shards[i], &work[pos], MODULUS8 - err_locs[pos], self.simd);
        }
        self.put_work(work);
        Ok(())
    }

    /// Walsh-domain error locator for the missing mask, memoized per mask
    /// for small shard counts.
    fn error_locations(&self, shards: &[Vec<u8>], m: usize, t: &Tables8) -> [Ffe8; ORDER8] {
        let cached_mask = self.inversion.as_ref().map(|cache| {
            let mut mask = 0u64;
            for (i, shard) in shards.iter().enumerate() {
                if shard.is_empty() {
                    mask |= 1 << i;
                }
            }
            (cache, mask)
        });
        if let Some((cache, mask)) = &cached_mask {
            if let Some(hit) = cache.lock().unwrap().get(mask) {
                return *hit;
            }
        }

        let mut err_locs = [0u8; ORDER8];
        for i in 0..self.parity_shards {
            if shards[self.data_shards + i].is_empty() {
                err_locs[i] = 1;
            }
        }
        for loc in err_locs[self.parity_shards..m].iter_mut() {
            *loc = 1;
        }
        for i in 0..self.data_shards {
            if shards[i].is_empty() {
                err_locs[m + i] = 1;
            }
        }

        fwht8(&mut err_locs, ORDER8, m + self.data_shards);
        for (loc, &walsh) in err_locs.iter_mut().zip(t.log_walsh.iter()) {
            *loc = ((*loc as u32 * walsh as u32) % MODULUS8 as u32) as u8;
        }
        fwht8(&mut err_locs, ORDER8, ORDER8);

        if let Some((cache, mask)) = cached_mask {
            cache.lock().unwrap().insert(mask, err_locs);
        }
        err_locs
    }

    fn get_work(&self, count: usize, size: usize) -> Vec<Vec<u8>> {
        let mut work = self.work_pool.lock().unwrap().pop().unwrap_or_default();
        work.resize_with(count, Vec::new);
        for buf in work.iter_mut() {
            buf.clear();
            buf.resize(size, 0);
        }
        work
    }

    fn put_work(&self, work: Vec<Vec<u8>>) {
        self.work_pool.lock().unwrap().push(work);
    }
}

/// Forward radix-2 butterfly: `x ^= y * c`, then `y ^= x`.
fn fft_dit2_8(x: &mut [u8], y: &mut [u8], log_m: Ffe8, simd: SimdLevel) {
    mul_add8(x, y, log_m, simd);
    xor_slice(y, x);
}

/// Inverse radix-2 butterfly: `y ^= x`, then `x ^= y * c`.
fn ifft_dit2_8(x: &mut [u8], y: &mut [u8], log_m: Ffe8, simd: SimdLevel) {
    xor_slice(y, x);
    mul_add8(x, y, log_m, simd);
}

fn pair_mut(work: &mut [Vec<u8>], i: usize, j: usize) -> (&mut [u8], &mut [u8]) {
    let (a, b) = work.split_at_mut(j);
    (a[i].as_mut_slice(), b[0].as_mut_slice())
}

/// Fused two-level forward butterfly on positions
/// `{pos, pos+dist, pos+2*dist, pos+3*dist}`. A sentinel twiddle demotes its
/// multiply to a plain XOR; skipping that check would multiply by one
/// instead of zero and corrupt the transform.
fn fft_dit4_8(
    work: &mut [Vec<u8>],
    pos: usize,
    dist: usize,
    log_m01: Ffe8,
    log_m23: Ffe8,
    log_m02: Ffe8,
    simd: SimdLevel,
) {
    // First layer, distance 2*dist.
    let (lo, hi) = work.split_at_mut(pos + dist * 2);
    if log_m02 == MODULUS8 {
        xor_slice(&mut hi[0], &lo[pos]);
        xor_slice(&mut hi[dist], &lo[pos + dist]);
    } else {
        fft_dit2_8(&mut lo[pos], &mut hi[0], log_m02, simd);
        fft_dit2_8(&mut lo[pos + dist], &mut hi[dist], log_m02, simd);
    }
    // Second layer, distance dist.
    let (x, y) = pair_mut(lo, pos, pos + dist);
    if log_m01 == MODULUS8 {
        xor_slice(y, x);
    } else {
        fft_dit2_8(x, y, log_m01, simd);
    }
    let (x, y) = pair_mut(hi, 0, dist);
    if log_m23 == MODULUS8 {
        xor_slice(y, x);
    } else {
        fft_dit2_8(x, y, log_m23, simd);
    }
}

/// Fused two-level inverse butterfly; layers run in the opposite order.
fn ifft_dit4_8(
    work: &mut [Vec<u8>],
    pos: usize,
    dist: usize,
    log_m01: Ffe8,
    log_m23: Ffe8,
    log_m02: Ffe8,
    simd: SimdLevel,
) {
    // First layer, distance dist.
    {
        let (lo, hi) = work.split_at_mut(pos + dist * 2);
        let (x, y) = pair_mut(lo, pos, pos + dist);
        if log_m01 == MODULUS8 {
            xor_slice(y, x);
        } else {
            ifft_dit2_8(x, y, log_m01, simd);
        }
        let (x, y) = pair_mut(hi, 0, dist);
        if log_m23 == MODULUS8 {
            xor_slice(y, x);
        } else {
            ifft_dit2_8(x, y, log_m23, simd);
        }
    }
    // Second layer, distance 2*dist.
    let (lo, hi) = work.split_at_mut(pos + dist * 2);
    if log_m02 == MODULUS8 {
        xor_slice(&mut hi[0], &lo[pos]);
        xor_slice(&mut hi[dist], &lo[pos + dist]);
    } else {
        ifft_dit2_8(&mut lo[pos], &mut hi[0], log_m02, simd);
        ifft_dit2_8(&mut lo[pos + dist], &mut hi[dist], log_m02, simd);
    }
}

/// One radix-4 group of the forward transform: positions
/// `[r, r + 4*dist)` within `chunk`, twiddles taken at the absolute offset.
fn fft_group8(chunk: &mut [Vec<u8>], r: usize, dist: usize, t: &Tables8, simd: SimdLevel) {
    let log_m01 = t.skew[r + dist - 1];
    let log_m02 = t.skew[r + dist * 2 - 1];
    let log_m23 = t.skew[r + dist * 3 - 1];
    for i in 0..dist {
        fft_dit4_8(chunk, i, dist, log_m01, log_m23, log_m02, simd);
    }
}

fn ifft_group8(chunk: &mut [Vec<u8>], r: usize, dist: usize, t: &Tables8, simd: SimdLevel) {
    let log_m01 = t.skew[r + dist - 1];
    let log_m02 = t.skew[r + dist * 2 - 1];
    let log_m23 = t.skew[r + dist * 3 - 1];
    for i in 0..dist {
        ifft_dit4_8(chunk, i, dist, log_m01, log_m23, log_m02, simd);
    }
}

/// In-place forward DIT FFT of size `m` over the work buffers, computing
/// only outputs covered by the first `mtrunc` positions. Groups within one
/// level are independent, so they fan out across workers; the level edge is
/// the synchronization barrier.
fn fft_dit8(work: &mut [Vec<u8>], mtrunc: usize, m: usize, t: &Tables8, simd: SimdLevel, workers: usize) {
    let mut dist4 = m;
    let mut dist = m >> 2;
    while dist != 0 {
        if workers > 1 && m / dist4 >= 2 {
            work[..m].par_chunks_mut(dist4).enumerate().for_each(|(g, chunk)| {
                let r = g * dist4;
                if r < mtrunc {
                    fft_group8(chunk, r, dist, t, simd);
                }
            });
        } else {
            let mut r = 0;
            while r < mtrunc {
                fft_group8(&mut work[r..r + dist4], r, dist, t, simd);
                r += dist4;
            }
        }
        dist4 = dist;
        dist >>= 2;
    }

    // One radix-2 layer remains when m is an odd power of two.
    if dist4 == 2 {
        let mut r = 0;
        while r < mtrunc {
            let log_m = t.skew[r];
            let (x, y) = pair_mut(work, r, r + 1);
            if log_m == MODULUS8 {
                xor_slice(y, x);
            } else {
                fft_dit2_8(x, y, log_m, simd);
            }
            r += 2;
        }
    }
}

/// In-place inverse DIT FFT used by the decoder: full size `n`, inputs
/// beyond `mtrunc` known to be zero.
fn ifft_dit_decoder8(mtrunc: usize, work: &mut [Vec<u8>], n: usize, t: &Tables8, simd: SimdLevel, workers: usize) {
    let mut dist = 1;
    let mut dist4 = 4;
    while dist4 <= n {
        if workers > 1 && n / dist4 >= 2 {
            work[..n].par_chunks_mut(dist4).enumerate().for_each(|(g, chunk)| {
                let r = g * dist4;
                if r < mtrunc {
                    ifft_group8(chunk, r, dist, t, simd);
                }
            });
        } else {
            let mut r = 0;
            while r < mtrunc {
                ifft_group8(&mut work[r..r + dist4], r, dist, t, simd);
                r += dist4;
            }
        }
        dist = dist4;
        dist4 <<= 2;
    }

    if dist < n {
        debug_assert_eq!(dist * 2, n);
        let log_m = t.skew[dist - 1];
        for i in 0..dist {
            let (x, y) = pair_mut(work, i, i + dist);
            if log_m == MODULUS8 {
                xor_slice(y, x);
            } else {
                ifft_dit2_8(x, y, log_m, simd);
            }
        }
    }
}

/// Inverse DIT FFT used by the encoder: loads `data` into the work buffers,
/// transforms them at FFT offset `skew_base`, and optionally folds the
/// result into `xor_out`.
#[allow(clippy::too_many_arguments)]
fn ifft_dit_encoder8(
    data: &[Vec<u8>],
    mtrunc: usize,
    work: &mut [Vec<u8>],
    xor_out: Option<&mut [Vec<u8>]>,
    m: usize,
    skew_base: usize,
    t: &Tables8,
    simd: SimdLevel,
) {
    for (buf, shard) in work[..mtrunc].iter_mut().zip(data) {
        buf.copy_from_slice(shard);
    }
    for buf in work[mtrunc..m].iter_mut() {
        buf.fill(0);
    }

    let mut dist = 1;
    let mut dist4 = 4;
    while dist4 <= m {
        let mut r = 0;
        while r < mtrunc {
            let i_end = r + dist;
            let log_m01 = t.skew[skew_base + i_end - 1];
            let log_m02 = t.skew[skew_base + i_end + dist - 1];
            let log_m23 = t.skew[skew_base + i_end + dist * 2 - 1];
            for i in r..i_end {
                ifft_dit4_8(work, i, dist, log_m01, log_m23, log_m02, simd);
            }
            r += dist4;
        }
        dist = dist4;
        dist4 <<= 2;
    }

    if dist < m {
        debug_assert_eq!(dist * 2, m);
        let log_m = t.skew[skew_base + dist - 1];
        for i in 0..dist {
            let (x, y) = pair_mut(work, i, i + dist);
            if log_m == MODULUS8 {
                xor_slice(y, x);
            } else {
                ifft_dit2_8(x, y, log_m, simd);
            }
        }
    }

    if let Some(out) = xor_out {
        for (o, w) in out[..m].iter_mut().zip(work[..m].iter()) {
            xor_slice(o, w);
        }
    }
}

/// In-place formal derivative over the work buffers.
fn formal_derivative(work: &mut [Vec<u8>], n: usize) {
    for i in 1..n {
        let width = ((i ^ (i - 1)) + 1) >> 1;
        let (lo, hi) = work.split_at_mut(i);
        for j in 0..width {
            xor_slice(&mut lo[i - width + j], &hi[j]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard_set(k: usize, m: usize, size: usize) -> Vec<Vec<u8>> {
        let mut shards: Vec<Vec<u8>> = (0..k)
            .map(|i| (0..size).map(|j| ((i * size + j) % 256) as u8).collect())
            .collect();
        shards.extend((0..m).map(|_| vec![0u8; size]));
        shards
    }

    #[test]
    fn single_parity_is_xor_of_data() {
        let codec = Codec8::new(2, 1).unwrap();
        let mut shards = shard_set(2, 1, 64);
        codec.encode(&mut shards).unwrap();
        let expected: Vec<u8> = shards[0].iter().zip(&shards[1]).map(|(a, b)| a ^ b).collect();
        assert_eq!(shards[2], expected);
    }

    #[test]
    fn encode_then_verify() {
        let codec = Codec8::new(5, 3).unwrap();
        let mut shards = shard_set(5, 3, 128);
        codec.encode(&mut shards).unwrap();
        assert!(codec.verify(&shards).unwrap());
        shards[1][0] ^= 1;
        assert!(!codec.verify(&shards).unwrap());
    }

    #[test]
    fn reconstruct_round_trip_with_chunked_encode() {
        // More data shards than the parity FFT size exercises the group fold.
        let codec = Codec8::new(23, 4).unwrap();
        let mut shards = shard_set(23, 4, 64);
        codec.encode(&mut shards).unwrap();
        let reference = shards.clone();

        shards[0] = Vec::new();
        shards[7] = Vec::new();
        shards[22] = Vec::new();
        shards[24] = Vec::new();
        codec.reconstruct(&mut shards).unwrap();
        assert_eq!(shards, reference);
    }

    #[test]
    fn inversion_cache_reuses_masks() {
        let codec = Codec8::new(4, 2).unwrap();
        let mut shards = shard_set(4, 2, 64);
        codec.encode(&mut shards).unwrap();
        let reference = shards.clone();
        for _ in 0..2 {
            let mut damaged = reference.clone();
            damaged[1] = Vec::new();
            damaged[4] = Vec::new();
            codec.reconstruct(&mut damaged).unwrap();
            assert_eq!(damaged, reference);
        }
        let cache = codec.inversion.as_ref().unwrap().lock().unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rejects_unaligned_shard_size() {
        let codec = Codec8::new(2, 2).unwrap();
        let mut shards = shard_set(2, 2, 63);
        assert!(matches!(codec.encode(&mut shards), Err(Error::ShardSize)));
    }

    #[test]
    fn fits_accounts_for_decoder_layout() {
        assert!(Codec8::fits(128, 128));
        assert!(Codec8::fits(192, 64));
        assert!(!Codec8::fits(129, 127));
        assert!(!Codec8::fits(250, 6));
    }
}
