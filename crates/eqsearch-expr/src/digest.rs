//! Stable byte digests.
//!
//! FNV-1a 64-bit: simple, deterministic, non-cryptographic. It is the feature
//! hash of the linear scorer, so it must stay stable across releases
//! (snapshots depend on it).

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// FNV-1a 64-bit over arbitrary bytes.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
