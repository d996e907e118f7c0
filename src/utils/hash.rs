const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;
const R1: u32 = 15;
const R2: u32 = 13;
const M: u32 = 5;
const N: u32 = 0xe6546b64;

/// Bucket hash seed. Part of the file format: changing it reshuffles every chain.
pub const BUCKET_SEED: u32 = 0x5f3759df;

#[inline]
fn mix(mut k: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(R1);
    k.wrapping_mul(C2)
}

/// MurmurHash3 (x86, 32-bit).
#[inline(always)]
pub fn murmur3_32(key: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut chunks = key.chunks_exact(4);

    for chunk in chunks.by_ref() {
        h ^= mix(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        h = h.rotate_left(R2);
        h = h.wrapping_mul(M).wrapping_add(N);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let k = remainder
            .iter()
            .enumerate()
            .fold(0u32, |k, (i, &byte)| k | (byte as u32) << (i * 8));
        h ^= mix(k);
    }

    h ^= key.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Chain index of `key` in an array of `bnum` buckets.
///
/// The hash is stable across platforms and builds, unlike hardware-accelerated
/// hashes, since chain membership is persisted.
#[inline]
pub fn bucket_index(key: &[u8], bnum: u64) -> usize {
    (murmur3_32(key, BUCKET_SEED) as u64 % bnum) as usize
}
