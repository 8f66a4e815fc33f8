//! Property-based tests for the codec invariants.

use proptest::collection::vec;
use proptest::prelude::*;
use rsfec::ReedSolomon;

fn shard_set(k: usize, m: usize, size: usize, payload: &[u8]) -> Vec<Vec<u8>> {
    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(k + m);
    for i in 0..k {
        let mut shard = vec![0u8; size];
        for (j, byte) in shard.iter_mut().enumerate() {
            *byte = payload[(i * size + j) % payload.len()];
        }
        shards.push(shard);
    }
    shards.extend((0..m).map(|_| vec![0u8; size]));
    shards
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// encode followed by verify always holds.
    #[test]
    fn prop_encode_verifies(
        k in 1usize..10,
        m in 1usize..6,
        payload in vec(any::<u8>(), 1..512),
    ) {
        let codec = ReedSolomon::new(k, m).unwrap();
        let mut shards = shard_set(k, m, 64, &payload);
        codec.encode(&mut shards).unwrap();
        prop_assert!(codec.verify(&shards).unwrap());
    }

    /// Any erasure mask of weight at most m reconstructs the codeword
    /// byte for byte.
    #[test]
    fn prop_erasures_reconstruct(
        k in 1usize..10,
        m in 1usize..6,
        payload in vec(any::<u8>(), 1..512),
        mask_seed in any::<u64>(),
    ) {
        let codec = ReedSolomon::new(k, m).unwrap();
        let mut shards = shard_set(k, m, 64, &payload);
        codec.encode(&mut shards).unwrap();
        let reference = shards.clone();

        // Derive up to m distinct erasure positions from the seed.
        let n = k + m;
        let mut erased = 0usize;
        let mut state = mask_seed;
        while erased < m {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pos = (state >> 33) as usize % n;
            if !shards[pos].is_empty() {
                shards[pos] = Vec::new();
                erased += 1;
            }
        }

        codec.reconstruct(&mut shards).unwrap();
        prop_assert_eq!(shards, reference);
    }

    /// reconstruct_data restores the data portion identically.
    #[test]
    fn prop_reconstruct_data_restores_data(
        k in 2usize..8,
        m in 2usize..5,
        payload in vec(any::<u8>(), 1..256),
        victim in any::<prop::sample::Index>(),
    ) {
        let codec = ReedSolomon::new(k, m).unwrap();
        let mut shards = shard_set(k, m, 64, &payload);
        codec.encode(&mut shards).unwrap();
        let reference = shards.clone();

        let pos = victim.index(k);
        shards[pos] = Vec::new();
        codec.reconstruct_data(&mut shards).unwrap();
        prop_assert_eq!(&shards[..k], &reference[..k]);
    }

    /// split then join is the identity on the payload.
    #[test]
    fn prop_split_join_identity(
        k in 1usize..12,
        payload in vec(any::<u8>(), 1..2048),
    ) {
        let codec = ReedSolomon::new(k, 2).unwrap();
        let shards = codec.split(&payload).unwrap();
        let mut joined = Vec::new();
        codec.join(&mut joined, &shards, payload.len()).unwrap();
        prop_assert_eq!(joined, payload);
    }

    /// Flipping a single bit anywhere in the codeword breaks verification.
    #[test]
    fn prop_corruption_fails_verify(
        k in 1usize..8,
        m in 1usize..5,
        payload in vec(any::<u8>(), 1..256),
        shard in any::<prop::sample::Index>(),
        byte in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let codec = ReedSolomon::new(k, m).unwrap();
        let mut shards = shard_set(k, m, 64, &payload);
        codec.encode(&mut shards).unwrap();

        let shard = shard.index(k + m);
        let byte = byte.index(64);
        shards[shard][byte] ^= 1 << bit;
        prop_assert!(!codec.verify(&shards).unwrap());
    }
}
