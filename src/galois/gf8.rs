//! GF(2^8) tables and slice kernels.
//!
//! Logarithms are laid out over a Cantor basis: a first LFSR pass produces
//! the classic discrete log for the polynomial basis, then the log table is
//! remapped so that the FFT skew recurrence closes within the field. The
//! sentinel value [`MODULUS8`] is the log of zero; a skew twiddle equal to
//! the sentinel demotes a butterfly to a plain XOR.

use super::SimdLevel;
use std::sync::OnceLock;

/// Field element in log or value form.
pub type Ffe8 = u8;

pub const BITS8: usize = 8;
pub const ORDER8: usize = 1 << BITS8;
/// Log-space sentinel: `2^8 - 1`, the log of zero.
pub const MODULUS8: Ffe8 = (ORDER8 - 1) as Ffe8;

/// Primitive polynomial x^8 + x^4 + x^3 + x^2 + 1.
const POLYNOMIAL8: u32 = 0x11D;

/// Basis the logarithm table is remapped onto. The first element must be 1
/// so that `exp[0]` is the multiplicative identity.
const CANTOR_BASIS8: [Ffe8; BITS8] = [1, 214, 152, 146, 86, 200, 88, 230];

/// Multiply table for one log-form constant: `value[x] = x * exp(log_m)`.
pub struct Mul8 {
    pub value: [u8; 256],
}

/// Immutable table set for GF(2^8).
pub struct Tables8 {
    /// `log[x]` for `x != 0`; `log[0]` holds the sentinel.
    pub log: [Ffe8; ORDER8],
    /// `exp[l]` for `l in [0, MODULUS8]`. `exp[MODULUS8]` aliases `exp[0]`
    /// so the partially reduced log sums used by the kernels resolve to the
    /// identity.
    pub exp: [Ffe8; ORDER8],
    /// Per-position FFT twiddles in log form; `skew[j - 1]` drives position `j`.
    pub skew: [Ffe8; ORDER8 - 1],
    /// Walsh transform of the log table, used by the error locator.
    pub log_walsh: [Ffe8; ORDER8],
    /// `mul[log_m]` multiplies a slice by `exp(log_m)`.
    pub mul: Vec<Mul8>,
}

/// `a + b` over the ring of logarithms (mod 2^8 - 1). Partially reduced: the
/// modulus itself may be returned in place of zero, which the `exp` table
/// resolves.
#[inline]
pub fn add_mod8(a: Ffe8, b: Ffe8) -> Ffe8 {
    let sum = a as u32 + b as u32;
    (sum + (sum >> BITS8)) as u8
}

/// `a - b` over the ring of logarithms (mod 2^8 - 1), partially reduced.
#[inline]
pub fn sub_mod8(a: Ffe8, b: Ffe8) -> Ffe8 {
    let dif = (a as usize).wrapping_sub(b as usize);
    dif.wrapping_add(dif >> BITS8) as u8
}

fn mul_log8(log: &[Ffe8; ORDER8], exp: &[Ffe8; ORDER8], a: Ffe8, log_b: Ffe8) -> Ffe8 {
    if a == 0 {
        0
    } else {
        exp[add_mod8(log[a as usize], log_b) as usize]
    }
}

/// In-place Walsh-Hadamard transform over the log ring, decimated in time
/// with two layers fused per pass. Only the first `m_trunc` inputs are
/// non-zero.
pub fn fwht8(data: &mut [Ffe8; ORDER8], m: usize, m_trunc: usize) {
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
                let (t0, t1) = (add_mod8(t0, t1), sub_mod8(t0, t1));
                let (t2, t3) = (add_mod8(t2, t3), sub_mod8(t2, t3));
                let (t0, t2) = (add_mod8(t0, t2), sub_mod8(t0, t2));
                let (t1, t3) = (add_mod8(t1, t3), sub_mod8(t1, t3));
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
            data[i] = add_mod8(t0, t1);
            data[i + dist] = sub_mod8(t0, t1);
        }
    }
}

impl Tables8 {
    fn build() -> Self {
        let mut exp = [0u8; ORDER8];
        let mut log = [0u8; ORDER8];

        // LFSR pass: exp temporarily holds the polynomial-basis discrete log.
        let mut state: u32 = 1;
        for i in 0..MODULUS8 as u32 {
            exp[state as usize] = i as u8;
            state <<= 1;
            if state >= ORDER8 as u32 {
                state ^= POLYNOMIAL8;
            }
        }
        exp[0] = MODULUS8;

        // Remap the logarithms onto the Cantor basis.
        log[0] = 0;
        for (i, &basis) in CANTOR_BASIS8.iter().enumerate() {
            let width = 1usize << i;
            for j in 0..width {
                log[j + width] = log[j] ^ basis;
            }
        }
        for l in log.iter_mut() {
            *l = exp[*l as usize];
        }
        for (i, &l) in log.iter().enumerate() {
            exp[l as usize] = i as u8;
        }
        exp[MODULUS8 as usize] = exp[0];

        // FFT skews via the subspace polynomial recurrence.
        let mut temp = [0u8; BITS8 - 1];
        for (i, t) in temp.iter_mut().enumerate() {
            *t = 1 << (i + 1);
        }
        let mut skew = [0u8; ORDER8 - 1];
        for m in 0..BITS8 - 1 {
            let step = 1usize << (m + 1);
            skew[(1usize << m) - 1] = 0;
            for i in m..BITS8 - 1 {
                let s = 1usize << (i + 1);
                let mut j = (1usize << m) - 1;
                while j < s {
                    skew[j + s] = skew[j] ^ temp[i];
                    j += step;
                }
            }
            temp[m] = MODULUS8 - log[mul_log8(&log, &exp, temp[m], log[(temp[m] ^ 1) as usize]) as usize];
            for i in m + 1..BITS8 - 1 {
                let sum = add_mod8(log[(temp[i] ^ 1) as usize], temp[m]);
                temp[i] = mul_log8(&log, &exp, temp[i], sum);
            }
        }
        for s in skew.iter_mut() {
            *s = log[*s as usize];
        }

        let mut log_walsh = log;
        log_walsh[0] = 0;
        fwht8(&mut log_walsh, ORDER8, ORDER8);

        // One split multiply table per log constant. The sentinel index maps
        // to the identity via the exp wraparound.
        let mut mul = Vec::with_capacity(ORDER8);
        for log_m in 0..ORDER8 {
            let mut value = [0u8; 256];
            for (x, v) in value.iter_mut().enumerate().skip(1) {
                *v = exp[add_mod8(log[x], log_m as u8) as usize];
            }
            mul.push(Mul8 { value });
        }

        Tables8 { log, exp, skew, log_walsh, mul }
    }
}

/// Process-wide GF(2^8) tables, built on first use.
pub fn tables8() -> &'static Tables8 {
    static TABLES: OnceLock<Tables8> = OnceLock::new();
    TABLES.get_or_init(Tables8::build)
}

/// `dst ^= src * exp(log_m)` over the common prefix of the slices.
pub fn mul_add8(dst: &mut [u8], src: &[u8], log_m: Ffe8, simd: SimdLevel) {
    let len = dst.len().min(src.len());
    let lut = &tables8().mul[log_m as usize];
    let done = mul_add8_wide(&mut dst[..len], &src[..len], lut, simd);
    for (d, s) in dst[done..len].iter_mut().zip(&src[done..len]) {
        *d ^= lut.value[*s as usize];
    }
}

/// `dst = src * exp(log_m)` over the common prefix of the slices.
pub fn mul8(dst: &mut [u8], src: &[u8], log_m: Ffe8, simd: SimdLevel) {
    let len = dst.len().min(src.len());
    let lut = &tables8().mul[log_m as usize];
    let done = mul8_wide(&mut dst[..len], &src[..len], lut, simd);
    for (d, s) in dst[done..len].iter_mut().zip(&src[done..len]) {
        *d = lut.value[*s as usize];
    }
}

/// Wide prefix of the multiply-add; returns the number of bytes handled.
fn mul_add8_wide(dst: &mut [u8], src: &[u8], lut: &Mul8, simd: SimdLevel) -> usize {
    #[cfg(target_arch = "x86_64")]
    if simd == SimdLevel::Avx2 && dst.len() >= 32 {
        return unsafe { super::pshufb::mul_add8_avx2(dst, src, lut) };
    }
    #[cfg(target_arch = "aarch64")]
    if simd == SimdLevel::Neon && dst.len() >= 16 {
        return unsafe { super::neon::mul_add8_neon(dst, src, lut) };
    }
    let _ = (dst, src, lut, simd);
    0
}

/// Wide prefix of the direct multiply; returns the number of bytes handled.
fn mul8_wide(dst: &mut [u8], src: &[u8], lut: &Mul8, simd: SimdLevel) -> usize {
    #[cfg(target_arch = "x86_64")]
    if simd == SimdLevel::Avx2 && dst.len() >= 32 {
        return unsafe { super::pshufb::mul8_avx2(dst, src, lut) };
    }
    #[cfg(target_arch = "aarch64")]
    if simd == SimdLevel::Neon && dst.len() >= 16 {
        return unsafe { super::neon::mul8_neon(dst, src, lut) };
    }
    let _ = (dst, src, lut, simd);
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference multiply through the log/exp tables, full reduction.
    fn mul_ref(a: u8, b: u8) -> u8 {
        let t = tables8();
        if a == 0 || b == 0 {
            return 0;
        }
        let sum = (t.log[a as usize] as u32 + t.log[b as usize] as u32) % MODULUS8 as u32;
        t.exp[sum as usize]
    }

    #[test]
    fn log_exp_roundtrip() {
        let t = tables8();
        for x in 1..ORDER8 {
            assert_eq!(t.exp[t.log[x] as usize] as usize, x);
        }
        assert_eq!(t.log[0], MODULUS8);
        assert_eq!(t.exp[MODULUS8 as usize], t.exp[0]);
    }

    #[test]
    fn identity_has_log_zero() {
        // The first Cantor basis element is 1, so 1 maps to log 0.
        assert_eq!(tables8().log[1], 0);
        assert_eq!(tables8().exp[0], 1);
    }

    #[test]
    fn mul_tables_match_log_exp() {
        let t = tables8();
        for &log_m in &[0u8, 1, 7, 100, 254, MODULUS8] {
            let lut = &t.mul[log_m as usize];
            for x in 0..256usize {
                let expected = if x == 0 { 0 } else { t.exp[add_mod8(t.log[x], log_m) as usize] };
                assert_eq!(lut.value[x], expected, "log_m={log_m} x={x}");
            }
        }
    }

    #[test]
    fn mul_table_identity_and_sentinel() {
        let t = tables8();
        for x in 0..256usize {
            // log 0 is multiplication by one, and so is the sentinel thanks
            // to the exp wraparound.
            assert_eq!(t.mul[0].value[x] as usize, x);
            assert_eq!(t.mul[MODULUS8 as usize].value[x] as usize, x);
        }
    }

    #[test]
    fn multiplication_is_commutative_and_distributive() {
        for a in [1u8, 2, 3, 0x53, 0xCA, 0xFF] {
            for b in [1u8, 2, 5, 0x8E, 0xFF] {
                assert_eq!(mul_ref(a, b), mul_ref(b, a));
                for c in [0u8, 1, 0x77] {
                    assert_eq!(mul_ref(a, b ^ c), mul_ref(a, b) ^ mul_ref(a, c));
                }
            }
        }
    }

    #[test]
    fn add_sub_mod_are_inverse() {
        for a in [0u8, 1, 100, 254, 255] {
            for b in [0u8, 1, 99, 255] {
                let s = add_mod8(a, b);
                // Compare as residues mod 255: the representation may differ
                // by the modulus itself.
                assert_eq!(sub_mod8(s, b) as u32 % MODULUS8 as u32, a as u32 % MODULUS8 as u32);
            }
        }
    }

    #[test]
    fn skew_position_one_is_sentinel() {
        // The first butterfly pair always degrades to a plain XOR.
        assert_eq!(tables8().skew[0], MODULUS8);
    }

    #[test]
    fn mul_add8_matches_reference() {
        let src: Vec<u8> = (0..=255u8).collect();
        for log_m in [0u8, 3, 97, MODULUS8] {
            let mut dst = vec![0x5Au8; 256];
            mul_add8(&mut dst, &src, log_m, SimdLevel::None);
            let t = tables8();
            for (i, &s) in src.iter().enumerate() {
                assert_eq!(dst[i], 0x5A ^ t.mul[log_m as usize].value[s as usize]);
            }
        }
    }

    #[test]
    fn mul8_overwrites_destination() {
        let src = vec![7u8; 64];
        let mut dst = vec![0xEEu8; 64];
        mul8(&mut dst, &src, 0, SimdLevel::None);
        assert!(dst.iter().all(|&b| b == 7));
    }
}
