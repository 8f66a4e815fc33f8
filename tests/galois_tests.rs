//! Field table invariants and scalar/SIMD kernel equivalence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rsfec::galois::{detect_simd, gf16, gf8, xor_slice, SimdLevel};

/// Lengths around every vector width boundary, including odd tails.
const LENGTHS: &[usize] = &[1, 2, 3, 15, 16, 17, 31, 32, 33, 63, 64, 65, 100, 127, 128, 256, 1000];

#[test]
fn gf8_tables_define_a_field() {
    let t = gf8::tables8();
    // log/exp are inverse bijections away from zero.
    for x in 1..gf8::ORDER8 {
        assert_eq!(t.exp[t.log[x] as usize] as usize, x);
    }
    // Every nonzero element has a multiplicative inverse.
    for x in 1u32..256 {
        let log_x = t.log[x as usize];
        let inv_log = (gf8::MODULUS8 - log_x) % gf8::MODULUS8;
        let product = t.mul[inv_log as usize].value[x as usize];
        assert_eq!(product, 1, "x={x}");
    }
}

#[test]
fn gf16_tables_define_a_field() {
    let t = gf16::tables16();
    for x in [1usize, 2, 255, 256, 4097, 0x8000, 0xFFFF] {
        assert_eq!(t.exp[t.log[x] as usize] as usize, x);
        let log_x = t.log[x];
        let inv_log = (gf16::MODULUS16 - log_x) % gf16::MODULUS16;
        let lut = &t.mul[inv_log as usize];
        let product = lut.lo[x & 0xFF] ^ lut.hi[x >> 8];
        assert_eq!(product, 1, "x={x}");
    }
}

#[test]
fn skew_tables_are_level_consistent() {
    // Position 1 is always a plain-XOR butterfly; the remaining skews are
    // valid logarithms.
    assert_eq!(gf8::tables8().skew[0], gf8::MODULUS8);
    assert_eq!(gf16::tables16().skew[0], gf16::MODULUS16);
}

#[test]
fn wide_mul_add8_equals_scalar_for_all_tails() {
    let simd = detect_simd();
    let mut rng = StdRng::seed_from_u64(0xABCD);
    for &len in LENGTHS {
        let mut src = vec![0u8; len];
        rng.fill(src.as_mut_slice());
        let mut base = vec![0u8; len];
        rng.fill(base.as_mut_slice());

        for log_m in [0u8, 1, 29, 254, 255] {
            let mut wide = base.clone();
            let mut scalar = base.clone();
            gf8::mul_add8(&mut wide, &src, log_m, simd);
            gf8::mul_add8(&mut scalar, &src, log_m, SimdLevel::None);
            assert_eq!(wide, scalar, "len={len} log_m={log_m}");
        }
    }
}

#[test]
fn wide_mul8_equals_scalar_for_all_tails() {
    let simd = detect_simd();
    let mut rng = StdRng::seed_from_u64(0x1234);
    for &len in LENGTHS {
        let mut src = vec![0u8; len];
        rng.fill(src.as_mut_slice());

        for log_m in [0u8, 77, 255] {
            let mut wide = vec![0xEEu8; len];
            let mut scalar = vec![0x11u8; len];
            gf8::mul8(&mut wide, &src, log_m, simd);
            gf8::mul8(&mut scalar, &src, log_m, SimdLevel::None);
            assert_eq!(wide, scalar, "len={len} log_m={log_m}");
        }
    }
}

#[test]
fn wide_mul_add16_equals_scalar_for_all_tails() {
    let simd = detect_simd();
    let mut rng = StdRng::seed_from_u64(0xFEED);
    for &len in LENGTHS {
        let mut src = vec![0u8; len];
        rng.fill(src.as_mut_slice());
        let mut base = vec![0u8; len];
        rng.fill(base.as_mut_slice());

        for log_m in [0u16, 1, 4242, 0xFFFE, 0xFFFF] {
            let mut wide = base.clone();
            let mut scalar = base.clone();
            gf16::mul_add16(&mut wide, &src, log_m, simd);
            gf16::mul_add16(&mut scalar, &src, log_m, SimdLevel::None);
            assert_eq!(wide, scalar, "len={len} log_m={log_m}");
        }
    }
}

#[test]
fn wide_mul16_equals_scalar_for_all_tails() {
    let simd = detect_simd();
    let mut rng = StdRng::seed_from_u64(0xBEEF);
    for &len in LENGTHS {
        let mut src = vec![0u8; len];
        rng.fill(src.as_mut_slice());

        for log_m in [0u16, 999, 0xFFFF] {
            let mut wide = vec![0u8; len];
            let mut scalar = vec![0u8; len];
            gf16::mul16(&mut wide, &src, log_m, simd);
            gf16::mul16(&mut scalar, &src, log_m, SimdLevel::None);
            assert_eq!(wide, scalar, "len={len} log_m={log_m}");
        }
    }
}

#[test]
fn mul_add_identity_is_xor() {
    // log 0 means multiply by one: the accumulate collapses to a plain XOR.
    let src: Vec<u8> = (0..100u8).collect();
    let mut dst = vec![0x42u8; 100];
    let mut xored = dst.clone();
    gf8::mul_add8(&mut dst, &src, 0, SimdLevel::None);
    xor_slice(&mut xored, &src);
    assert_eq!(dst, xored);
}

#[test]
fn mul_add_cancels_itself() {
    let simd = detect_simd();
    let src = vec![0xA7u8; 192];
    let mut dst = vec![0x31u8; 192];
    let before = dst.clone();
    gf16::mul_add16(&mut dst, &src, 12345, simd);
    assert_ne!(dst, before);
    gf16::mul_add16(&mut dst, &src, 12345, simd);
    assert_eq!(dst, before);
}
