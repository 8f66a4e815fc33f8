//! GF(2^16) tables and slice kernels.
//!
//! Same construction as the 8-bit field, with split multiply tables: a
//! 16-bit product is assembled from two 256-entry lookups,
//! `lo[x & 0xFF] ^ hi[x >> 8]`, exploiting the linearity of the field over
//! its low and high input bytes. Shard bytes are interpreted as
//! native-endian 16-bit words; every kernel in the process shares that
//! grouping, which is all the algebra requires.

use super::SimdLevel;
use std::sync::OnceLock;

/// Field element in log or value form.
pub type Ffe16 = u16;

pub const BITS16: usize = 16;
pub const ORDER16: usize = 1 << BITS16;
/// Log-space sentinel: `2^16 - 1`, the log of zero.
pub const MODULUS16: Ffe16 = (ORDER16 - 1) as Ffe16;

/// Primitive polynomial x^16 + x^5 + x^3 + x^2 + 1.
const POLYNOMIAL16: u32 = 0x1002D;

/// Basis the logarithm table is remapped onto; the first element is 1 so
/// that `exp[0]` is the multiplicative identity.
const CANTOR_BASIS16: [Ffe16; BITS16] = [
    0x0001, 0xACCA, 0x3C0E, 0x163E, 0x059B, 0xE3A7, 0x992D, 0x5B31,
    0x60DC, 0x93EF, 0x2306, 0xFE2B, 0x58AF, 0x88C0, 0x7EB8, 0xAAD0,
];

/// Split multiply table for one log-form constant:
/// `lo[x & 0xFF] ^ hi[x >> 8] = x * exp(log_m)`.
pub struct Mul16 {
    pub lo: [u16; 256],
    pub hi: [u16; 256],
}

/// Immutable table set for GF(2^16).
pub struct Tables16 {
    pub log: Box<[Ffe16; ORDER16]>,
    pub exp: Box<[Ffe16; ORDER16]>,
    /// `skew[j - 1]` drives FFT position `j`.
    pub skew: Box<[Ffe16; ORDER16 - 1]>,
    pub log_walsh: Box<[Ffe16; ORDER16]>,
    /// Indexed by the log of the constant; one kilobyte per entry.
    pub mul: Box<[Mul16]>,
}

/// `a + b` over the ring of logarithms (mod 2^16 - 1), partially reduced.
#[inline]
pub fn add_mod16(a: Ffe16, b: Ffe16) -> Ffe16 {
    let sum = a as u32 + b as u32;
    (sum + (sum >> BITS16)) as u16
}

/// `a - b` over the ring of logarithms (mod 2^16 - 1), partially reduced.
#[inline]
pub fn sub_mod16(a: Ffe16, b: Ffe16) -> Ffe16 {
    let dif = (a as usize).wrapping_sub(b as usize);
    dif.wrapping_add(dif >> BITS16) as u16
}

fn mul_log16(log: &[Ffe16; ORDER16], exp: &[Ffe16; ORDER16], a: Ffe16, log_b: Ffe16) -> Ffe16 {
    if a == 0 {
        0
    } else {
        exp[add_mod16(log[a as usize], log_b) as usize]
    }
}

/// In-place Walsh-Hadamard transform over the log ring; see `fwht8`.
pub fn fwht16(data: &mut [Ffe16; ORDER16], m: usize, m_trunc: usize) {
    let mut dist = 1usize;
    let mut dist4 = 4usize;
    while dist4 <= m {
        let mut r = 0;
        while r < m_trunc {
            for i in r..r + dist {
                let t0 = data[i];
                let t1 = data[i + dist];
                let t2 = data[i + dist * 2];
                let t3 = data[i + dist * 3];
                let (t0, t1) = (add_mod16(t0, t1), sub_mod16(t0, t1));
                let (t2, t3) = (add_mod16(t2, t3), sub_mod16(t2, t3));
                let (t0, t2) = (add_mod16(t0, t2), sub_mod16(t0, t2));
                let (t1, t3) = (add_mod16(t1, t3), sub_mod16(t1, t3));
                data[i] = t0;
                data[i + dist] = t1;
                data[i + dist * 2] = t2;
                data[i + dist * 3] = t3;
            }
            r += dist4;
        }
        dist = dist4;
        dist4 <<= 2;
    }
    if dist < m {
        for i in 0..dist {
            let t0 = data[i];
            let t1 = data[i + dist];
            data[i] = add_mod16(t0, t1);
            data[i + dist] = sub_mod16(t0, t1);
        }
    }
}

fn boxed<const N: usize>() -> Box<[Ffe16; N]> {
    vec![0u16; N].into_boxed_slice().try_into().unwrap()
}

impl Tables16 {
    fn build() -> Self {
        let mut exp: Box<[Ffe16; ORDER16]> = boxed();
        let mut log: Box<[Ffe16; ORDER16]> = boxed();

        // LFSR pass: exp temporarily holds the polynomial-basis discrete log.
        let mut state: u32 = 1;
        for i in 0..MODULUS16 as u32 {
            exp[state as usize] = i as u16;
            state <<= 1;
            if state >= ORDER16 as u32 {
                state ^= POLYNOMIAL16;
            }
        }
        exp[0] = MODULUS16;

        // Remap the logarithms onto the Cantor basis.
        log[0] = 0;
        for (i, &basis) in CANTOR_BASIS16.iter().enumerate() {
            let width = 1usize << i;
            for j in 0..width {
                log[j + width] = log[j] ^ basis;
            }
        }
        for l in log.iter_mut() {
            *l = exp[*l as usize];
        }
        for i in 0..ORDER16 {
            exp[log[i] as usize] = i as u16;
        }
        exp[MODULUS16 as usize] = exp[0];

        // FFT skews via the subspace polynomial recurrence.
        let mut temp = [0u16; BITS16 - 1];
        for (i, t) in temp.iter_mut().enumerate() {
            *t = 1 << (i + 1);
        }
        let mut skew: Box<[Ffe16; ORDER16 - 1]> = boxed();
        for m in 0..BITS16 - 1 {
            let step = 1usize << (m + 1);
            skew[(1usize << m) - 1] = 0;
            for i in m..BITS16 - 1 {
                let s = 1usize << (i + 1);
                let mut j = (1usize << m) - 1;
                while j < s {
                    skew[j + s] = skew[j] ^ temp[i];
                    j += step;
                }
            }
            temp[m] = MODULUS16 - log[mul_log16(&log, &exp, temp[m], log[(temp[m] ^ 1) as usize]) as usize];
            for i in m + 1..BITS16 - 1 {
                let sum = add_mod16(log[(temp[i] ^ 1) as usize], temp[m]);
                temp[i] = mul_log16(&log, &exp, temp[i], sum);
            }
        }
        for s in skew.iter_mut() {
            *s = log[*s as usize];
        }

        let mut log_walsh: Box<[Ffe16; ORDER16]> = boxed();
        log_walsh.copy_from_slice(&log[..]);
        log_walsh[0] = 0;
        fwht16(&mut log_walsh, ORDER16, ORDER16);

        // One split multiply table per log constant. This is the large table
        // of the 16-bit codec (64 MiB), paid once per process on first use.
        let mut mul = Vec::with_capacity(ORDER16);
        for log_m in 0..ORDER16 as u32 {
            let mut lo = [0u16; 256];
            let mut hi = [0u16; 256];
            for x in 1..256usize {
                lo[x] = exp[add_mod16(log[x], log_m as u16) as usize];
                hi[x] = exp[add_mod16(log[x << 8], log_m as u16) as usize];
            }
            mul.push(Mul16 { lo, hi });
        }

        Tables16 {
            log,
            exp,
            skew,
            log_walsh,
            mul: mul.into_boxed_slice(),
        }
    }
}

/// Process-wide GF(2^16) tables, built on first use of the 16-bit codec.
pub fn tables16() -> &'static Tables16 {
    static TABLES: OnceLock<Tables16> = OnceLock::new();
    TABLES.get_or_init(Tables16::build)
}

/// `dst ^= src * exp(log_m)` over the common prefix of the slices.
pub fn mul_add16(dst: &mut [u8], src: &[u8], log_m: Ffe16, simd: SimdLevel) {
    let len = dst.len().min(src.len());
    let lut = &tables16().mul[log_m as usize];
    let done = mul_add16_wide(&mut dst[..len], &src[..len], lut, simd);
    mul_add16_scalar(&mut dst[done..len], &src[done..len], lut);
}

/// `dst = src * exp(log_m)` over the common prefix of the slices.
pub fn mul16(dst: &mut [u8], src: &[u8], log_m: Ffe16, simd: SimdLevel) {
    let len = dst.len().min(src.len());
    let lut = &tables16().mul[log_m as usize];
    let done = mul16_wide(&mut dst[..len], &src[..len], lut, simd);
    mul16_scalar(&mut dst[done..len], &src[done..len], lut);
}

/// Scalar reference multiply-add over 16-bit words. The byte slices are
/// reinterpreted as native-endian u16 words via raw parts, which x86-64 and
/// ARM64 support at any alignment; an odd trailing byte is handled
/// separately.
fn mul_add16_scalar(dst: &mut [u8], src: &[u8], lut: &Mul16) {
    let len = dst.len().min(src.len());
    let words = len / 2;
    if words > 0 {
        unsafe {
            let d = std::slice::from_raw_parts_mut(dst.as_mut_ptr() as *mut u16, words);
            let s = std::slice::from_raw_parts(src.as_ptr() as *const u16, words);
            for i in 0..words {
                let w = s[i];
                d[i] ^= lut.lo[(w & 0xFF) as usize] ^ lut.hi[(w >> 8) as usize];
            }
        }
    }
    if len % 2 == 1 {
        dst[len - 1] ^= lut.lo[src[len - 1] as usize] as u8;
    }
}

/// Scalar reference direct multiply over 16-bit words.
fn mul16_scalar(dst: &mut [u8], src: &[u8], lut: &Mul16) {
    let len = dst.len().min(src.len());
    let words = len / 2;
    if words > 0 {
        unsafe {
            let d = std::slice::from_raw_parts_mut(dst.as_mut_ptr() as *mut u16, words);
            let s = std::slice::from_raw_parts(src.as_ptr() as *const u16, words);
            for i in 0..words {
                let w = s[i];
                d[i] = lut.lo[(w & 0xFF) as usize] ^ lut.hi[(w >> 8) as usize];
            }
        }
    }
    if len % 2 == 1 {
        dst[len - 1] = lut.lo[src[len - 1] as usize] as u8;
    }
}

fn mul_add16_wide(dst: &mut [u8], src: &[u8], lut: &Mul16, simd: SimdLevel) -> usize {
    #[cfg(target_arch = "x86_64")]
    if simd == SimdLevel::Avx2 && dst.len() >= 32 {
        return unsafe { super::pshufb::mul_add16_avx2(dst, src, lut) };
    }
    #[cfg(target_arch = "aarch64")]
    if simd == SimdLevel::Neon && dst.len() >= 16 {
        return unsafe { super::neon::mul_add16_neon(dst, src, lut) };
    }
    let _ = (dst, src, lut, simd);
    0
}

fn mul16_wide(dst: &mut [u8], src: &[u8], lut: &Mul16, simd: SimdLevel) -> usize {
    #[cfg(target_arch = "x86_64")]
    if simd == SimdLevel::Avx2 && dst.len() >= 32 {
        return unsafe { super::pshufb::mul16_avx2(dst, src, lut) };
    }
    #[cfg(target_arch = "aarch64")]
    if simd == SimdLevel::Neon && dst.len() >= 16 {
        return unsafe { super::neon::mul16_neon(dst, src, lut) };
    }
    let _ = (dst, src, lut, simd);
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mul_ref(a: u16, b: u16) -> u16 {
        let t = tables16();
        if a == 0 || b == 0 {
            return 0;
        }
        let sum = (t.log[a as usize] as u32 + t.log[b as usize] as u32) % MODULUS16 as u32;
        t.exp[sum as usize]
    }

    #[test]
    fn log_exp_roundtrip() {
        let t = tables16();
        for x in [1usize, 2, 255, 256, 0x1234, 0xFFFE, 0xFFFF] {
            assert_eq!(t.exp[t.log[x] as usize] as usize, x);
        }
        assert_eq!(t.log[0], MODULUS16);
        assert_eq!(t.exp[0], 1);
        assert_eq!(t.exp[MODULUS16 as usize], 1);
    }

    #[test]
    fn split_tables_assemble_products() {
        let t = tables16();
        for &log_m in &[0u16, 1, 513, 0x7FFF, MODULUS16 - 1, MODULUS16] {
            let lut = &t.mul[log_m as usize];
            for &x in &[0u16, 1, 2, 0x00FF, 0x0100, 0x1234, 0xFFFF] {
                let assembled = lut.lo[(x & 0xFF) as usize] ^ lut.hi[(x >> 8) as usize];
                let expected = mul_log16(&t.log, &t.exp, x, log_m);
                assert_eq!(assembled, expected, "log_m={log_m} x={x:#x}");
            }
        }
    }

    #[test]
    fn mul_table_identity_and_sentinel() {
        let t = tables16();
        for &x in &[0u16, 1, 0xABCD, 0xFFFF] {
            let lo = x as usize & 0xFF;
            let hi = x as usize >> 8;
            assert_eq!(t.mul[0].lo[lo] ^ t.mul[0].hi[hi], x);
            assert_eq!(
                t.mul[MODULUS16 as usize].lo[lo] ^ t.mul[MODULUS16 as usize].hi[hi],
                x
            );
        }
    }

    #[test]
    fn multiplication_distributes_over_xor() {
        for a in [1u16, 0x1234, 0xFFFF] {
            for b in [1u16, 0x00FF, 0xCAFE] {
                for c in [0u16, 2, 0x8000] {
                    assert_eq!(mul_ref(a, b ^ c), mul_ref(a, b) ^ mul_ref(a, c));
                }
            }
        }
    }

    #[test]
    fn mul_add16_matches_scalar_reference() {
        let src: Vec<u8> = (0..128u8).map(|b| b.wrapping_mul(37)).collect();
        let mut dst = vec![0x11u8; 128];
        let before = dst.clone();
        mul_add16(&mut dst, &src, 777, SimdLevel::None);
        // Applying the same multiply-add twice cancels out.
        mul_add16(&mut dst, &src, 777, SimdLevel::None);
        assert_eq!(dst, before);
    }

    #[test]
    fn mul16_identity_copies() {
        let src: Vec<u8> = (0..64u8).collect();
        let mut dst = vec![0u8; 64];
        mul16(&mut dst, &src, 0, SimdLevel::None);
        assert_eq!(dst, src);
    }
}
