//! GF(2^16) codec: systematic Reed-Solomon for shard counts beyond 256.
//!
//! Structure mirrors the 8-bit engine, but the two widths deliberately do
//! not share their hot loops: element size, table layout and butterfly
//! index arithmetic all differ, and the error locator works over the full
//! 65536-entry Walsh domain.

use crate::error::{Error, Result};
use crate::galois::gf16::{fwht16, mul16, mul_add16, tables16, Ffe16, Tables16, MODULUS16, ORDER16};
use crate::galois::{xor_slice, SimdLevel};
use crate::shards::{ceil_pow2, check_shards, shard_size, SHARD_SIZE_MULTIPLE};
use log::debug;
use rayon::prelude::*;
use std::sync::Mutex;

pub(crate) struct Codec16 {
    data_shards: usize,
    parity_shards: usize,
    total_shards: usize,
    workers: usize,
    simd: SimdLevel,
    work_pool: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl Codec16 {
    /// The decoder FFT spans the recovery block plus the original data, so
    /// the combined size must fit the field order.
    pub(crate) fn fits(data_shards: usize, parity_shards: usize) -> bool {
        data_shards + parity_shards <= ORDER16
            && ceil_pow2(ceil_pow2(parity_shards) + data_shards) <= ORDER16
    }

    pub(crate) fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(Error::InvalidShardNum);
        }
        if !Self::fits(data_shards, parity_shards) {
            return Err(Error::MaxShardNum);
        }
        let _ = tables16();

        debug!("created GF(2^16) codec: {data_shards} data + {parity_shards} parity shards");
        Ok(Codec16 {
            data_shards,
            parity_shards,
            total_shards: data_shards + parity_shards,
            workers: 1,
            simd: crate::galois::detect_simd(),
            work_pool: Mutex::new(Vec::new()),
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

    fn encode_inner(&self, data: &[Vec<u8>], parity: &mut [Vec<u8>], size: usize) {
        let t = tables16();
        let m = ceil_pow2(self.parity_shards);
        let mut work = self.get_work(2 * m, size);
        let (front, back) = work.split_at_mut(m);

        let mtrunc = m.min(self.data_shards);
        ifft_dit_encoder16(&data[..mtrunc], mtrunc, front, None, m, m, t, self.simd);
        let mut pos = m;
        while pos < self.data_shards {
            let count = m.min(self.data_shards - pos);
            ifft_dit_encoder16(
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

        fft_dit16(front, self.parity_shards, m, t, self.simd, self.workers);
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
            return Ok(());
        }
        if present < self.data_shards {
            return Err(Error::TooFewShards);
        }

        let size = shard_size(shards);
        if size % SHARD_SIZE_MULTIPLE != 0 {
            return Err(Error::ShardSize);
        }

        let t = tables16();
        let m = ceil_pow2(self.parity_shards);
        let n = ceil_pow2(m + self.data_shards);

        let err_locs = self.error_locations(shards, m, t);
        let mut work = self.get_work(n, size);

        for i in 0..self.parity_shards {
            let shard = &shards[self.data_shards + i];
            if !shard.is_empty() {
                mul16(&mut work[i], shard, err_locs[i], self.simd);
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
                mul16(&mut work[m + i], shard, err_locs[m + i], self.simd);
            } else {
                work[m + i].fill(0);
            }
        }
        for buf in work[m + self.data_shards..n].iter_mut() {
            buf.fill(0);
        }

        ifft_dit_decoder16(m + self.data_shards, &mut work, n, t, self.simd, self.workers);
        formal_derivative(&mut work, n);
        fft_dit16(&mut work, m + self.data_shards, n, t, self.simd, self.workers);

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
            mul16(&mut shards[i], &work[pos], MODULUS16 - err_locs[pos], self.simd);
        }
        self.put_work(work);
        Ok(())
    }

    fn error_locations(&self, shards: &[Vec<u8>], m: usize, t: &Tables16) -> Box<[Ffe16; ORDER16]> {
        let mut err_locs: Box<[Ffe16; ORDER16]> =
            vec![0u16; ORDER16].into_boxed_slice().try_into().unwrap();
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

        fwht16(&mut err_locs, ORDER16, m + self.data_shards);
        for (loc, &walsh) in err_locs.iter_mut().zip(t.log_walsh.iter()) {
            *loc = ((*loc as u32 * walsh as u32) % MODULUS16 as u32) as u16;
        }
        fwht16(&mut err_locs, ORDER16, ORDER16);
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

fn fft_dit2_16(x: &mut [u8], y: &mut [u8], log_m: Ffe16, simd: SimdLevel) {
    mul_add16(x, y, log_m, simd);
    xor_slice(y, x);
}

fn ifft_dit2_16(x: &mut [u8], y: &mut [u8], log_m: Ffe16, simd: SimdLevel) {
    xor_slice(y, x);
    mul_add16(x, y, log_m, simd);
}

fn pair_mut(work: &mut [Vec<u8>], i: usize, j: usize) -> (&mut [u8], &mut [u8]) {
    let (a, b) = work.split_at_mut(j);
    (a[i].as_mut_slice(), b[0].as_mut_slice())
}

fn fft_dit4_16(
    work: &mut [Vec<u8>],
    pos: usize,
    dist: usize,
    log_m01: Ffe16,
    log_m23: Ffe16,
    log_m02: Ffe16,
    simd: SimdLevel,
) {
    let (lo, hi) = work.split_at_mut(pos + dist * 2);
    if log_m02 == MODULUS16 {
        xor_slice(&mut hi[0], &lo[pos]);
        xor_slice(&mut hi[dist], &lo[pos + dist]);
    } else {
        fft_dit2_16(&mut lo[pos], &mut hi[0], log_m02, simd);
        fft_dit2_16(&mut lo[pos + dist], &mut hi[dist], log_m02, simd);
    }
    let (x, y) = pair_mut(lo, pos, pos + dist);
    if log_m01 == MODULUS16 {
        xor_slice(y, x);
    } else {
        fft_dit2_16(x, y, log_m01, simd);
    }
    let (x, y) = pair_mut(hi, 0, dist);
    if log_m23 == MODULUS16 {
        xor_slice(y, x);
    } else {
        fft_dit2_16(x, y, log_m23, simd);
    }
}

fn ifft_dit4_16(
    work: &mut [Vec<u8>],
    pos: usize,
    dist: usize,
    log_m01: Ffe16,
    log_m23: Ffe16,
    log_m02: Ffe16,
    simd: SimdLevel,
) {
    {
        let (lo, hi) = work.split_at_mut(pos + dist * 2);
        let (x, y) = pair_mut(lo, pos, pos + dist);
        if log_m01 == MODULUS16 {
            xor_slice(y, x);
        } else {
            ifft_dit2_16(x, y, log_m01, simd);
        }
        let (x, y) = pair_mut(hi, 0, dist);
        if log_m23 == MODULUS16 {
            xor_slice(y, x);
        } else {
            ifft_dit2_16(x, y, log_m23, simd);
        }
    }
    let (lo, hi) = work.split_at_mut(pos + dist * 2);
    if log_m02 == MODULUS16 {
        xor_slice(&mut hi[0], &lo[pos]);
        xor_slice(&mut hi[dist], &lo[pos + dist]);
    } else {
        ifft_dit2_16(&mut lo[pos], &mut hi[0], log_m02, simd);
        ifft_dit2_16(&mut lo[pos + dist], &mut hi[dist], log_m02, simd);
    }
}

fn fft_group16(chunk: &mut [Vec<u8>], r: usize, dist: usize, t: &Tables16, simd: SimdLevel) {
    let log_m01 = t.skew[r + dist - 1];
    let log_m02 = t.skew[r + dist * 2 - 1];
    let log_m23 = t.skew[r + dist * 3 - 1];
    for i in 0..dist {
        fft_dit4_16(chunk, i, dist, log_m01, log_m23, log_m02, simd);
    }
}

fn ifft_group16(chunk: &mut [Vec<u8>], r: usize, dist: usize, t: &Tables16, simd: SimdLevel) {
    let log_m01 = t.skew[r + dist - 1];
    let log_m02 = t.skew[r + dist * 2 - 1];
    let log_m23 = t.skew[r + dist * 3 - 1];
    for i in 0..dist {
        ifft_dit4_16(chunk, i, dist, log_m01, log_m23, log_m02, simd);
    }
}

fn fft_dit16(work: &mut [Vec<u8>], mtrunc: usize, m: usize, t: &Tables16, simd: SimdLevel, workers: usize) {
    let mut dist4 = m;
    let mut dist = m >> 2;
    while dist != 0 {
        if workers > 1 && m / dist4 >= 2 {
            work[..m].par_chunks_mut(dist4).enumerate().for_each(|(g, chunk)| {
                let r = g * dist4;
                if r < mtrunc {
                    fft_group16(chunk, r, dist, t, simd);
                }
            });
        } else {
            let mut r = 0;
            while r < mtrunc {
                fft_group16(&mut work[r..r + dist4], r, dist, t, simd);
                r += dist4;
            }
        }
        dist4 = dist;
        dist >>= 2;
    }

    if dist4 == 2 {
        let mut r = 0;
        while r < mtrunc {
            let log_m = t.skew[r];
            let (x, y) = pair_mut(work, r, r + 1);
            if log_m == MODULUS16 {
                xor_slice(y, x);
            } else {
                fft_dit2_16(x, y, log_m, simd);
            }
            r += 2;
        }
    }
}

fn ifft_dit_decoder16(mtrunc: usize, work: &mut [Vec<u8>], n: usize, t: &Tables16, simd: SimdLevel, workers: usize) {
    let mut dist = 1;
    let mut dist4 = 4;
    while dist4 <= n {
        if workers > 1 && n / dist4 >= 2 {
            work[..n].par_chunks_mut(dist4).enumerate().for_each(|(g, chunk)| {
                let r = g * dist4;
                if r < mtrunc {
                    ifft_group16(chunk, r, dist, t, simd);
                }
            });
        } else {
            let mut r = 0;
            while r < mtrunc {
                ifft_group16(&mut work[r..r + dist4], r, dist, t, simd);
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
            if log_m == MODULUS16 {
                xor_slice(y, x);
            } else {
                ifft_dit2_16(x, y, log_m, simd);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn ifft_dit_encoder16(
    data: &[Vec<u8>],
    mtrunc: usize,
    work: &mut [Vec<u8>],
    xor_out: Option<&mut [Vec<u8>]>,
    m: usize,
    skew_base: usize,
    t: &Tables16,
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
                ifft_dit4_16(work, i, dist, log_m01, log_m23, log_m02, simd);
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
            if log_m == MODULUS16 {
                xor_slice(y, x);
            } else {
                ifft_dit2_16(x, y, log_m, simd);
            }
        }
    }

    if let Some(out) = xor_out {
        for (o, w) in out[..m].iter_mut().zip(work[..m].iter()) {
            xor_slice(o, w);
        }
    }
}

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
            .map(|i| (0..size).map(|j| ((i * 31 + j * 7 + 5) % 256) as u8).collect())
            .collect();
        shards.extend((0..m).map(|_| vec![0u8; size]));
        shards
    }

    #[test]
    fn encode_verify_reconstruct_round_trip() {
        let codec = Codec16::new(300, 20).unwrap();
        let mut shards = shard_set(300, 20, 64);
        codec.encode(&mut shards).unwrap();
        assert!(codec.verify(&shards).unwrap());
        let reference = shards.clone();

        for i in [0usize, 5, 150, 299, 300, 319] {
            shards[i] = Vec::new();
        }
        codec.reconstruct(&mut shards).unwrap();
        assert_eq!(shards, reference);
    }

    #[test]
    fn reconstruct_data_leaves_parity_absent() {
        let codec = Codec16::new(260, 4).unwrap();
        let mut shards = shard_set(260, 4, 64);
        codec.encode(&mut shards).unwrap();
        let reference = shards.clone();

        shards[3] = Vec::new();
        shards[261] = Vec::new();
        codec.reconstruct_data(&mut shards).unwrap();
        assert_eq!(shards[3], reference[3]);
        assert!(shards[261].is_empty());
    }

    #[test]
    fn fits_bounds() {
        assert!(Codec16::fits(700, 300));
        assert!(Codec16::fits(32768, 32768));
        assert!(!Codec16::fits(65000, 1000));
        assert!(!Codec16::fits(65000, 536));
    }
}
