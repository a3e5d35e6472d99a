//! Deterministic, seedable byte mutation.
//!
//! The teacher's `Mutator` (`mutator.rs`) wraps a `ThreadRng` and flips a
//! handful of random bytes. `spec.md` section 4.7 needs the same shape but
//! reproducible, so this swaps the RNG for `rand_xoshiro`'s seeded
//! `Xoshiro256StarStar` and widens the single flip strategy into the four
//! the spec names.

use crate::config::{FUZZ_INPUT_SIZE, MUTATION_RATE_MAX, MUTATION_RATE_MIN};
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

#[derive(Debug, Clone, Copy)]
enum Strategy {
    BitFlip,
    Xor,
    Overwrite,
    Zero,
}

impl Strategy {
    fn from_index(idx: u32) -> Self {
        match idx % 4 {
            0 => Strategy::BitFlip,
            1 => Strategy::Xor,
            2 => Strategy::Overwrite,
            _ => Strategy::Zero,
        }
    }

    fn apply(self, byte: u8, rng: &mut Xoshiro256StarStar) -> u8 {
        match self {
            Strategy::BitFlip => byte ^ (1 << (rng.next_u32() % 8)),
            Strategy::Xor => byte ^ (rng.next_u32() % 256) as u8,
            Strategy::Overwrite => (rng.next_u32() % 256) as u8,
            Strategy::Zero => 0,
        }
    }
}

/// A seeded mutator. Two `Mutator`s constructed with the same seed and fed
/// the same source bytes in the same order produce identical outputs, which
/// is what lets a crashing iteration be reproduced from its seed alone.
#[derive(Debug, Clone)]
pub struct Mutator {
    rng: Xoshiro256StarStar,
}

impl Mutator {
    pub fn new(seed: u64) -> Self {
        Mutator { rng: Xoshiro256StarStar::seed_from_u64(seed) }
    }

    /// Copies `source` into `scratch` (zero-padding or truncating to
    /// `scratch`'s length) and mutates `k = ceil(r * len)` bytes of it in
    /// place, `r` drawn uniformly from `[MUTATION_RATE_MIN, MUTATION_RATE_MAX]`.
    pub fn mutate_into(&mut self, source: &[u8], scratch: &mut [u8]) {
        for byte in scratch.iter_mut() {
            *byte = 0;
        }
        let n = source.len().min(scratch.len());
        scratch[..n].copy_from_slice(&source[..n]);

        let len = scratch.len();
        if len == 0 {
            return;
        }

        let span = MUTATION_RATE_MAX - MUTATION_RATE_MIN;
        let r = MUTATION_RATE_MIN + span * (self.rng.next_u32() as f64 / u32::MAX as f64);
        let k = (r * len as f64).ceil() as usize;

        for _ in 0..k.max(1) {
            let offset = (self.rng.next_u32() as usize) % len;
            let strategy = Strategy::from_index(self.rng.next_u32());
            scratch[offset] = strategy.apply(scratch[offset], &mut self.rng);
        }
    }

    /// Convenience wrapper sized to the guest fuzz-input buffer
    /// (`config::FUZZ_INPUT_SIZE`).
    pub fn mutate(&mut self, source: &[u8]) -> [u8; FUZZ_INPUT_SIZE] {
        let mut scratch = [0u8; FUZZ_INPUT_SIZE];
        self.mutate_into(source, &mut scratch);
        scratch
    }
}
