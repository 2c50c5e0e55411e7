//! Deterministic stand-in descriptors for when no face can be encoded.

use crate::descriptor::{Descriptor, DESCRIPTOR_DIM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Generate a descriptor with values uniform in `[0, 1)`, seeded from the
/// SHA-256 of `seed`. The same seed always yields the same descriptor.
pub fn fallback_descriptor(seed: &[u8]) -> Descriptor {
    let digest: [u8; 32] = Sha256::digest(seed).into();
    let mut rng = StdRng::from_seed(digest);
    let mut values = [0f32; DESCRIPTOR_DIM];
    for v in values.iter_mut() {
        *v = rng.gen();
    }
    tracing::debug!(seed_len = seed.len(), "generated fallback descriptor");
    Descriptor::from_array(values)
}
