//! Derivation of independent random streams from the global seed.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use relsynth_core::{RelationDescriptor, TypeTag};

/// Fold `key` into `seed` (FNV-1a over the key bytes).
pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Stream for `key`; unseeded runs draw from OS entropy.
pub fn stream_rng(seed: Option<u64>, key: &str) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(hash_seed(seed, key)),
        None => ChaCha8Rng::from_os_rng(),
    }
}

pub fn relation_rng(seed: Option<u64>, relation: &RelationDescriptor) -> ChaCha8Rng {
    stream_rng(seed, &relation.stream_key())
}

pub fn synthesis_rng(seed: Option<u64>, tag: &TypeTag) -> ChaCha8Rng {
    stream_rng(seed, &format!("{}#synthesize", tag.type_name()))
}

pub fn key_rng(seed: Option<u64>, tag: &TypeTag) -> ChaCha8Rng {
    stream_rng(seed, &format!("{}#keys", tag.type_name()))
}
